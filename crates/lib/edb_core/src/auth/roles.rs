//! Well-known role names.

/// Passes every access rule.
pub const ADMIN: &str = "admin";
/// Passes every access rule.
pub const SUPERUSER: &str = "superuser";
/// Required to sign in through any flow.
pub const LOGIN: &str = "login";
pub const USER: &str = "user";

/// Roles given to accounts created by sign-up, OTP or an identity provider.
pub const DEFAULT_ROLES: [&str; 2] = [USER, LOGIN];

pub fn is_admin<S: AsRef<str>>(roles: &[S]) -> bool {
    roles
        .iter()
        .any(|r| matches!(r.as_ref(), ADMIN | SUPERUSER))
}

pub fn can_sign_in<S: AsRef<str>>(roles: &[S]) -> bool {
    is_admin(roles) || roles.iter().any(|r| r.as_ref() == LOGIN)
}

pub fn default_roles() -> Vec<String> {
    DEFAULT_ROLES.iter().map(|r| r.to_string()).collect()
}
