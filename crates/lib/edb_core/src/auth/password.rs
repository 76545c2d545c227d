//! Password hashing via bcrypt, and the password policy.

use super::AuthError;

/// bcrypt cost factor.
const BCRYPT_COST: u32 = 10;

pub const MIN_PASSWORD_LENGTH: usize = 8;
/// bcrypt only reads the first 72 bytes.
pub const MAX_PASSWORD_LENGTH: usize = 72;

/// Hash a password with bcrypt (cost 10).
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    bcrypt::hash(password, BCRYPT_COST)
        .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
}

/// Verify a password against a bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    bcrypt::verify(password, hash).map_err(|e| AuthError::Internal(format!("bcrypt verify: {e}")))
}

/// A password to be stored must be 8 to 72 bytes.
///
/// Callers that allow passwordless accounts check for the empty string
/// before calling this.
pub fn check_password(password: &str) -> Result<(), AuthError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::InvalidPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AuthError::InvalidPassword(format!(
            "password must be at most {MAX_PASSWORD_LENGTH} bytes"
        )));
    }
    Ok(())
}

/// Checks `password` against the account's stored hash.
///
/// Passwordless accounts (no hash) never match.
pub fn check_user_password(password: &str, hash: Option<&str>) -> Result<(), AuthError> {
    match hash {
        Some(hash) if !password.is_empty() && verify_password(password, hash)? => Ok(()),
        _ => Err(AuthError::CredentialError),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn policy_rejects_short_and_long_passwords() {
        assert!(check_password("1234567").is_err());
        assert!(check_password("12345678").is_ok());
        assert!(check_password(&"x".repeat(73)).is_err());
    }

    #[test]
    fn passwordless_accounts_never_match() {
        assert!(matches!(
            check_user_password("anything", None),
            Err(AuthError::CredentialError)
        ));
        let hash = hash_password("secret-pass").unwrap();
        assert!(matches!(
            check_user_password("", Some(&hash)),
            Err(AuthError::CredentialError)
        ));
        assert!(check_user_password("secret-pass", Some(&hash)).is_ok());
    }
}
