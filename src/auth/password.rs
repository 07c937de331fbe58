use bcrypt::{hash, verify};
use crate::errors::{AppError, Result};

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_USERNAME_LENGTH: usize = 64;

pub struct PasswordService;

impl PasswordService {
    pub fn hash_password_with_cost(password: &str, cost: u32) -> Result<String> {
        hash(password, cost)
            .map_err(|e| AppError::Auth(format!("Failed to hash password: {}", e)))
    }

    pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
        verify(password, hash)
            .map_err(|e| AppError::Auth(format!("Failed to verify password: {}", e)))
    }

    pub fn validate_password_strength(password: &str) -> Result<()> {
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AppError::Validation(format!(
                "Password must be at least {} characters long",
                MIN_PASSWORD_LENGTH
            )));
        }

        if password.trim().is_empty() {
            return Err(AppError::Validation("Password cannot be blank".to_string()));
        }

        Ok(())
    }

    /// Usernames are shown back to users, so keep them printable and short.
    pub fn validate_username(username: &str) -> Result<()> {
        if username.is_empty() || username.chars().count() > MAX_USERNAME_LENGTH {
            return Err(AppError::Validation(format!(
                "Username must be between 1 and {} characters",
                MAX_USERNAME_LENGTH
            )));
        }

        if !username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '@'))
        {
            return Err(AppError::Validation(
                "Username may only contain letters, digits, '_', '-', '.' and '@'".to_string(),
            ));
        }

        Ok(())
    }
}
