// @zen-component: AUTH-AccessControl
//
//! Rule-based access control.
//!
//! Rules are loaded once from JSON:
//!
//! ```json
//! {
//!   "rules": [
//!     { "methods": ["GET"], "path": "/modules/*", "roles": ["rdf"] },
//!     { "path": "/about", "roles": ["anonymous", "user"] }
//!   ],
//!   "modules": { "gex": ["rdf"] }
//! }
//! ```
//!
//! Paths match segment by segment; `:name` matches any one segment and a
//! trailing `*` matches any remainder. Rules are tried in order and the
//! first one matching method and path decides. No match denies.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::auth::roles;

/// Role under which unauthenticated callers are evaluated.
pub const ANONYMOUS_ROLE: &str = "anonymous";
/// Rule role matching every principal.
pub const ANY_ROLE: &str = "*";

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Cannot read access rules: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid access rules: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid access rule for '{path}': {reason}")]
    InvalidRule { path: String, reason: String },

    #[error("Unknown module '{0}'")]
    UnknownModule(String),
}

/// Who is asking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    User { id: String, roles: Vec<String> },
}

impl Principal {
    pub fn roles(&self) -> Vec<&str> {
        match self {
            Principal::Anonymous => vec![ANONYMOUS_ROLE],
            Principal::User { roles, .. } => roles.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

pub trait AccessEvaluator: Send + Sync {
    fn authorize(&self, principal: &Principal, method: &str, path: &str) -> Decision;

    /// Every role the evaluator knows about.
    fn roles(&self) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessRule {
    /// Empty means any method.
    #[serde(default)]
    pub methods: Vec<String>,
    pub path: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<AccessRule>,
    /// Module name → roles allowed to use it.
    #[serde(default)]
    pub modules: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
    Rest,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    methods: Vec<String>,
    segments: Vec<Segment>,
    roles: Vec<String>,
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

impl CompiledRule {
    fn compile(rule: AccessRule) -> Result<Self, AccessError> {
        let invalid = |reason: &str| AccessError::InvalidRule {
            path: rule.path.clone(),
            reason: reason.to_string(),
        };
        if !rule.path.starts_with('/') {
            return Err(invalid("path must start with '/'"));
        }
        if rule.roles.is_empty() {
            return Err(invalid("no roles"));
        }

        let parts: Vec<&str> = split(&rule.path).collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let segment = match *part {
                "*" if i + 1 == parts.len() => Segment::Rest,
                "*" => return Err(invalid("'*' is only allowed as the last segment")),
                p if p.starts_with(':') => Segment::Param,
                p => Segment::Literal(p.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            methods: rule.methods.iter().map(|m| m.to_ascii_uppercase()).collect(),
            segments,
            roles: rule.roles,
        })
    }

    fn matches(&self, method: &str, path: &str) -> bool {
        if !self.methods.is_empty() && !self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
        {
            return false;
        }

        let mut parts = split(path);
        for segment in &self.segments {
            match segment {
                Segment::Rest => return parts.next().is_some(),
                Segment::Param => {
                    if parts.next().is_none() {
                        return false;
                    }
                }
                Segment::Literal(literal) => {
                    if parts.next() != Some(literal.as_str()) {
                        return false;
                    }
                }
            }
        }
        parts.next().is_none()
    }

    fn admits(&self, principal_roles: &[&str]) -> bool {
        self.roles
            .iter()
            .any(|r| r == ANY_ROLE || principal_roles.contains(&r.as_str()))
    }
}

/// Ordered rule list plus the module role map.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rules: Vec<CompiledRule>,
    modules: HashMap<String, Vec<String>>,
}

impl RuleEngine {
    pub fn new(rule_set: RuleSet) -> Result<Self, AccessError> {
        let rules = rule_set
            .rules
            .into_iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            rules,
            modules: rule_set.modules,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, AccessError> {
        Self::new(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, AccessError> {
        let engine = Self::from_json(&std::fs::read_to_string(path)?)?;
        debug!(path = %path.display(), rules = engine.rules.len(), "loaded access rules");
        Ok(engine)
    }

    /// Roles allowed to use `module`.
    pub fn module_roles(&self, module: &str) -> Result<&[String], AccessError> {
        self.modules
            .get(module)
            .map(Vec::as_slice)
            .ok_or_else(|| AccessError::UnknownModule(module.to_string()))
    }

    pub fn can_use_module(&self, principal: &Principal, module: &str) -> bool {
        let held = principal.roles();
        if roles::is_admin(held.as_slice()) {
            return true;
        }
        self.module_roles(module)
            .is_ok_and(|allowed| allowed.iter().any(|r| held.contains(&r.as_str())))
    }
}

impl AccessEvaluator for RuleEngine {
    fn authorize(&self, principal: &Principal, method: &str, path: &str) -> Decision {
        let held = principal.roles();
        if roles::is_admin(held.as_slice()) {
            return Decision::Allow;
        }
        match self.rules.iter().find(|rule| rule.matches(method, path)) {
            Some(rule) if rule.admits(&held) => Decision::Allow,
            Some(_) => {
                debug!(method, path, roles = ?held, "denied by access rule");
                Decision::Deny
            }
            None => {
                debug!(method, path, "no access rule matches");
                Decision::Deny
            }
        }
    }

    fn roles(&self) -> Vec<String> {
        let mut all: BTreeSet<String> = [roles::ADMIN, roles::SUPERUSER, roles::LOGIN, roles::USER]
            .into_iter()
            .map(str::to_string)
            .collect();
        for rule in &self.rules {
            all.extend(rule.roles.iter().filter(|r| *r != ANY_ROLE).cloned());
        }
        for module_roles in self.modules.values() {
            all.extend(module_roles.iter().cloned());
        }
        all.into_iter().collect()
    }
}
