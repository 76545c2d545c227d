//! Outbound mail models handed to the mail queue.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which template the mail worker should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MailKind {
    Verify,
    Verified,
    Passwordless,
    PasswordReset,
    PasswordUpdated,
    EmailReset,
    EmailUpdated,
    AccountUpdated,
    AccountCreated,
    Otp,
}

/// One queued email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailItem {
    pub name: String,
    pub to: String,
    pub kind: MailKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Human readable lifetime of `token`, e.g. "10 minutes".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_url: Option<String>,
}

impl MailItem {
    pub fn new(kind: MailKind, name: &str, to: &str) -> Self {
        Self {
            name: name.to_string(),
            to: to.to_string(),
            kind,
            token: None,
            ttl: None,
            link_url: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(format_ttl(ttl));
        self
    }

    pub fn with_link(mut self, link_url: Option<&str>) -> Self {
        self.link_url = link_url.map(str::to_string);
        self
    }
}

/// Formats a lifetime the way it reads in an email: "10 minutes", "1 hour".
pub fn format_ttl(ttl: Duration) -> String {
    let secs = ttl.as_secs();
    let (n, unit) = if secs >= 86_400 && secs % 86_400 == 0 {
        (secs / 86_400, "day")
    } else if secs >= 3_600 && secs % 3_600 == 0 {
        (secs / 3_600, "hour")
    } else if secs >= 60 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}
