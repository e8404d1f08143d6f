//! In-memory account store with Argon2 password hashes.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sheetsync_core::messages::{SignupRequest, UserProfile};
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone)]
struct UserRecord {
    profile: UserProfile,
    password_hash: String,
}

/// Registered users, unique by case-insensitive e-mail.
#[derive(Debug, Default)]
pub struct UserStore {
    /// Lower-cased e-mail to record.
    by_email: DashMap<String, UserRecord>,
    /// User id to lower-cased e-mail.
    ids: DashMap<String, String>,
}

impl UserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_email.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_email.is_empty()
    }

    /// Registers a new account.
    ///
    /// # Errors
    ///
    /// - [`ApiError::Validation`] for a blank name, an e-mail without `@` or
    ///   a password shorter than six characters
    /// - [`ApiError::Conflict`] if the e-mail is already registered
    pub fn signup(&self, req: &SignupRequest) -> Result<UserProfile, ApiError> {
        let name = req.name.trim();
        let email = req.email.trim();
        if name.is_empty() {
            return Err(ApiError::Validation("name must not be blank".to_string()));
        }
        if !email.contains('@') {
            return Err(ApiError::Validation("email is not valid".to_string()));
        }
        if req.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ApiError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let key = email.to_lowercase();
        if self.by_email.contains_key(&key) {
            return Err(ApiError::Conflict("email is already registered".to_string()));
        }
        let password_hash = hash_password(&req.password)?;

        match self.by_email.entry(key.clone()) {
            Entry::Occupied(_) => Err(ApiError::Conflict("email is already registered".to_string())),
            Entry::Vacant(slot) => {
                let profile = UserProfile {
                    id: Uuid::new_v4().to_string(),
                    email: email.to_string(),
                    name: name.to_string(),
                };
                self.ids.insert(profile.id.clone(), key);
                slot.insert(UserRecord {
                    profile: profile.clone(),
                    password_hash,
                });
                info!(user_id = %profile.id, "user signed up");
                Ok(profile)
            }
        }
    }

    /// Checks credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unauthorized`] for an unknown e-mail or a wrong
    /// password, without saying which.
    pub fn login(&self, email: &str, password: &str) -> Result<UserProfile, ApiError> {
        let record = self
            .by_email
            .get(&email.trim().to_lowercase())
            .map(|r| r.value().clone())
            .ok_or_else(login_failed)?;
        if verify_password(password, &record.password_hash)? {
            Ok(record.profile)
        } else {
            Err(login_failed())
        }
    }

    /// Looks up a user by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<UserProfile> {
        let email = self.ids.get(id)?.value().clone();
        self.by_email.get(&email).map(|r| r.profile.clone())
    }
}

fn login_failed() -> ApiError {
    ApiError::Unauthorized("Login failed".to_string())
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {e}")))
}

fn verify_password(password: &str, hash: &str) -> Result<bool, ApiError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored hash is invalid: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str, name: &str, password: &str) -> SignupRequest {
        SignupRequest {
            email: email.to_string(),
            name: name.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn signup_then_login() {
        let users = UserStore::new();
        let profile = users.signup(&request("Alice@X.com", "Alice", "secret1")).unwrap();
        assert_eq!(profile.email, "Alice@X.com");

        let logged_in = users.login("alice@x.com", "secret1").unwrap();
        assert_eq!(logged_in.id, profile.id);
        assert_eq!(users.get(&profile.id).unwrap().name, "Alice");
        assert_eq!(users.len(), 1);
    }

    #[test]
    fn wrong_password_and_unknown_email_look_the_same() {
        let users = UserStore::new();
        users.signup(&request("a@x.com", "A", "secret1")).unwrap();

        let wrong = users.login("a@x.com", "nope").unwrap_err();
        let unknown = users.login("b@x.com", "secret1").unwrap_err();
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert!(matches!(wrong, ApiError::Unauthorized(_)));
    }

    #[test]
    fn duplicate_email_conflicts_case_insensitively() {
        let users = UserStore::new();
        users.signup(&request("a@x.com", "A", "secret1")).unwrap();
        let err = users.signup(&request("A@X.COM", "B", "secret2")).unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn signup_validation() {
        let users = UserStore::new();
        for bad in [
            request("a@x.com", " ", "secret1"),
            request("not-an-email", "A", "secret1"),
            request("a@x.com", "A", "short"),
        ] {
            assert!(matches!(users.signup(&bad), Err(ApiError::Validation(_))));
        }
        assert!(users.is_empty());
    }
}
