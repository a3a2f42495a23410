use std::sync::LazyLock;

use regex::Regex;

use crate::app::{CoursewareError, Result};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9+._%\-]{1,256}@[a-zA-Z0-9][a-zA-Z0-9\-]{0,64}(\.[a-zA-Z0-9][a-zA-Z0-9\-]{0,25})+$",
    )
    .expect("valid regex")
});

pub fn is_email_valid(email: &str) -> bool {
    EMAIL.is_match(email.trim())
}

/// A login is either an email address or a plain username.
pub fn is_login_valid(login: &str) -> bool {
    if login.contains('@') {
        is_email_valid(login)
    } else {
        !login.trim().is_empty()
    }
}

pub fn is_password_valid(password: &str) -> bool {
    !password.trim().is_empty()
}

/// Check sign-in input before any request is made.
pub fn validate_credentials(login: &str, password: &str) -> Result<()> {
    if !is_login_valid(login) {
        return Err(CoursewareError::Validation(
            "Enter a valid email address or username".to_string(),
        ));
    }
    if !is_password_valid(password) {
        return Err(CoursewareError::Validation(
            "Password must not be empty".to_string(),
        ));
    }
    Ok(())
}
