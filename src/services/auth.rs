//! Account validation, password hashing and the session table.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::{Algorithm, Params, Pbkdf2};
use rand::RngCore;
use regex::Regex;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::User;

const HASH_ROUNDS: u32 = 100_000;
const HASH_OUTPUT_LEN: usize = 32;
const SALT_LEN: usize = 16;
const MIN_PASSWORD_LEN: usize = 8;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
});

/// Submitted registration fields
#[derive(Debug, Clone)]
pub struct Registration<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub confirm_password: &'a str,
}

impl Registration<'_> {
    /// Checks the fields in the order users see the messages.
    /// Username availability is checked against the database separately.
    pub fn validate(&self) -> Result<(), &'static str> {
        if [self.username, self.email, self.password, self.confirm_password]
            .iter()
            .any(|field| field.is_empty())
        {
            return Err("All fields are required");
        }
        if !is_valid_email(self.email) {
            return Err("Please enter a valid email address");
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err("Password must be at least 8 characters long");
        }
        if self.password != self.confirm_password {
            return Err("Passwords do not match");
        }
        Ok(())
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// Hashes a password with a fresh random salt.
///
/// Produces a PHC string: `$pbkdf2-sha256$i=<rounds>,l=32$<salt>$<hash>`
pub fn hash_password(password: &str) -> Result<String, pbkdf2::password_hash::Error> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = SaltString::encode_b64(&salt)?;

    let params = Params {
        rounds: HASH_ROUNDS,
        output_length: HASH_OUTPUT_LEN,
    };
    let hash = Pbkdf2.hash_password_customized(
        password.as_bytes(),
        Some(Algorithm::Pbkdf2Sha256.ident()),
        None,
        params,
        &salt,
    )?;

    Ok(hash.to_string())
}

/// Verifies a password against a stored hash; malformed hashes never match
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Pbkdf2.verify_password(password.as_bytes(), &parsed).is_ok()
}

/// A logged-in user as seen by handlers
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user_id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl Session {
    fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.created_at >= ttl
    }
}

/// Server-side session table keyed by the cookie value.
///
/// Sessions expire `ttl` after login; expired entries are dropped on lookup
/// and whenever a new session is opened.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::default(),
            ttl,
        }
    }

    /// Opens a session for the user and returns its ID
    pub async fn create(&self, user: &User) -> Uuid {
        let id = Uuid::new_v4();
        let session = Session {
            user_id: user.id,
            username: user.username.clone(),
            created_at: Utc::now(),
        };
        let now = session.created_at;

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(self.ttl, now));
        let pruned = before - sessions.len();
        sessions.insert(id, session);

        tracing::debug!(user_id = user.id, pruned, active = sessions.len(), "Session created");
        id
    }

    /// Live session for the ID; an expired one is removed and reported absent
    pub async fn get(&self, id: &Uuid) -> Option<Session> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(id) {
                None => return None,
                Some(session) if !session.is_expired(self.ttl, now) => {
                    return Some(session.clone())
                }
                Some(_) => {}
            }
        }

        let mut sessions = self.sessions.write().await;
        if sessions
            .get(id)
            .is_some_and(|session| session.is_expired(self.ttl, now))
        {
            if let Some(expired) = sessions.remove(id) {
                tracing::debug!(user_id = expired.user_id, "Session expired");
            }
        }
        None
    }

    /// Ends a session, returning it if it existed
    pub async fn remove(&self, id: &Uuid) -> Option<Session> {
        self.sessions.write().await.remove(id)
    }

    /// Number of sessions currently held, expired or not
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration<'a>(password: &'a str, confirm: &'a str, email: &'a str) -> Registration<'a> {
        Registration {
            username: "asha",
            email,
            password,
            confirm_password: confirm,
        }
    }

    #[test]
    fn test_registration_validation_order() {
        let empty = registration("", "", "");
        assert_eq!(empty.validate(), Err("All fields are required"));

        let bad_email = registration("short", "other", "not-an-email");
        assert_eq!(bad_email.validate(), Err("Please enter a valid email address"));

        let short = registration("short", "other", "asha@example.com");
        assert_eq!(
            short.validate(),
            Err("Password must be at least 8 characters long")
        );

        let mismatch = registration("long enough", "different", "asha@example.com");
        assert_eq!(mismatch.validate(), Err("Passwords do not match"));

        let ok = registration("long enough", "long enough", "asha@example.com");
        assert_eq!(ok.validate(), Ok(()));
    }

    #[test]
    fn test_email_pattern() {
        assert!(is_valid_email("first.last+tag@mail.example.org"));
        assert!(!is_valid_email("missing-at.example.com"));
        assert!(!is_valid_email("user@domain.c"));
    }

    #[test]
    fn test_hash_and_verify() {
        let stored = hash_password("correct horse").unwrap();
        assert!(stored.starts_with("$pbkdf2-sha256$"));
        assert!(stored.contains("i=100000"));
        assert!(verify_password("correct horse", &stored));
        assert!(!verify_password("wrong horse", &stored));
    }

    #[test]
    fn test_hashes_are_salted() {
        assert_ne!(
            hash_password("same password").unwrap(),
            hash_password("same password").unwrap()
        );
    }

    #[test]
    fn test_malformed_hash_never_matches() {
        assert!(!verify_password("pw", ""));
        assert!(!verify_password("pw", "sha256$10000$00$00"));
        assert!(!verify_password("pw", "$pbkdf2-sha256$"));
        assert!(!verify_password("pw", "$pbkdf2-sha256$i=x,l=32$c2FsdA$aGFzaA"));
        assert!(!verify_password("pw", "$md5$c2FsdHNhbHQ$aGFzaGhhc2g"));
    }

    #[test]
    fn test_stored_rounds_are_honoured() {
        let salt = SaltString::encode_b64(b"fixed salt bytes").unwrap();
        let params = Params {
            rounds: 1_000,
            output_length: 32,
        };
        let stored = Pbkdf2
            .hash_password_customized(
                b"pw",
                Some(Algorithm::Pbkdf2Sha256.ident()),
                None,
                params,
                &salt,
            )
            .unwrap()
            .to_string();

        assert!(stored.contains("i=1000"));
        assert!(verify_password("pw", &stored));
    }

    fn user() -> User {
        User {
            id: 7,
            username: "asha".to_string(),
            email: "asha@example.com".to_string(),
            password_hash: String::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let store = SessionStore::new(Duration::hours(1));

        let id = store.create(&user()).await;
        assert_eq!(store.get(&id).await.unwrap().username, "asha");

        assert!(store.remove(&id).await.is_some());
        assert!(store.get(&id).await.is_none());
        assert!(store.remove(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_dropped_on_lookup() {
        let store = SessionStore::new(Duration::zero());

        let id = store.create(&user()).await;
        assert_eq!(store.active_count().await, 1);

        assert!(store.get(&id).await.is_none());
        assert_eq!(store.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_login_prunes_expired_sessions() {
        let store = SessionStore::new(Duration::zero());

        for _ in 0..3 {
            store.create(&user()).await;
        }
        // each login clears the ones before it
        assert_eq!(store.active_count().await, 1);
    }
}
