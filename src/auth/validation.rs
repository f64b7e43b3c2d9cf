//! Input checks for registration, profile updates and password changes.

use regex::Regex;

use super::AuthError;

pub const MIN_PASSWORD_LEN: usize = 8;
const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 50;
const MIN_DISPLAY_NAME_LEN: usize = 3;

/// At least eight characters with upper-case, lower-case and digit classes.
///
/// # Errors
///
/// Returns `ValidationFailed` naming the first unmet requirement.
pub fn password_strength(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::ValidationFailed(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if !password.chars().any(char::is_uppercase) {
        return Err(AuthError::ValidationFailed(
            "password must contain an upper-case letter".into(),
        ));
    }
    if !password.chars().any(char::is_lowercase) {
        return Err(AuthError::ValidationFailed(
            "password must contain a lower-case letter".into(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AuthError::ValidationFailed(
            "password must contain a digit".into(),
        ));
    }
    Ok(())
}

/// Usernames become part of document ids, so `@`, `:` and whitespace are refused.
///
/// # Errors
///
/// Returns `ValidationFailed` for a malformed username.
pub fn username(username: &str) -> Result<(), AuthError> {
    let len = username.chars().count();
    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len) {
        return Err(AuthError::ValidationFailed(format!(
            "username must be {MIN_USERNAME_LEN} to {MAX_USERNAME_LEN} characters"
        )));
    }
    if username
        .chars()
        .any(|c| c.is_whitespace() || c == '@' || c == ':')
    {
        return Err(AuthError::ValidationFailed(
            "username may not contain whitespace, '@' or ':'".into(),
        ));
    }
    Ok(())
}

/// # Errors
///
/// Returns `ValidationFailed` for a malformed address.
pub fn email(email: &str) -> Result<(), AuthError> {
    let valid = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email));
    if valid {
        Ok(())
    } else {
        Err(AuthError::ValidationFailed("invalid email address".into()))
    }
}

/// # Errors
///
/// Returns `ValidationFailed` when the name is too short.
pub fn display_name(name: &str) -> Result<(), AuthError> {
    if name.trim().chars().count() < MIN_DISPLAY_NAME_LEN {
        return Err(AuthError::ValidationFailed(format!(
            "display name must be at least {MIN_DISPLAY_NAME_LEN} characters"
        )));
    }
    Ok(())
}

/// Trim and lower-case an email before it is stored.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
