//! Bearer-token table.

use std::collections::HashMap;
use std::sync::Mutex;

use rand::distr::{Alphanumeric, SampleString};

/// Process-local token-to-user table. Tokens live for the process lifetime.
#[derive(Default)]
pub struct AuthState {
    tokens: Mutex<HashMap<String, i32>>,
}

impl AuthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a fresh 32-character alphanumeric token for the user.
    pub fn issue_token(&self, user_id: i32) -> String {
        let token = Alphanumeric.sample_string(&mut rand::rng(), 32);
        self.tokens
            .lock()
            .expect("auth lock")
            .insert(token.clone(), user_id);
        token
    }

    pub fn token_to_user(&self, token: &str) -> Option<i32> {
        self.tokens.lock().expect("auth lock").get(token).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_resolve_back_to_the_user() {
        let auth = AuthState::new();
        let token = auth.issue_token(42);

        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(auth.token_to_user(&token), Some(42));
        assert_eq!(auth.token_to_user("bogus"), None);
    }

    #[test]
    fn tokens_are_distinct_per_issue() {
        let auth = AuthState::new();
        let a = auth.issue_token(1);
        let b = auth.issue_token(1);
        assert_ne!(a, b);
    }
}
