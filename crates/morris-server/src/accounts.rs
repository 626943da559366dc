//! Account lookup behind a trait so a real account service can be plugged in.
//!
//! [`MemoryAccountStore`] keeps plain credentials in memory and forgets them
//! on restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use morris_net::messages::AuthResponse;
use morris_net::{MessageTag, User};

pub trait AccountStore: Send + Sync {
    /// Check credentials. A successful response carries the [`User`].
    fn login(&self, username: &str, password: &str) -> AuthResponse;

    /// Create an account. Does not log the caller in.
    fn register(&self, username: &str, password: &str) -> AuthResponse;
}

struct Account {
    user: User,
    password: String,
}

#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<HashMap<String, Account>>,
    next_id: AtomicU64,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn response(method: MessageTag, success: bool, message: &str, user: Option<User>) -> AuthResponse {
    AuthResponse {
        method,
        success,
        message: message.to_string(),
        user,
    }
}

impl AccountStore for MemoryAccountStore {
    fn login(&self, username: &str, password: &str) -> AuthResponse {
        let accounts = self.accounts.read().unwrap_or_else(PoisonError::into_inner);
        match accounts.get(username.trim()) {
            Some(account) if account.password == password => response(
                MessageTag::Login,
                true,
                "Login successful.",
                Some(account.user.clone()),
            ),
            _ => response(
                MessageTag::Login,
                false,
                "Unknown username or wrong password.",
                None,
            ),
        }
    }

    fn register(&self, username: &str, password: &str) -> AuthResponse {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return response(
                MessageTag::Register,
                false,
                "Username and password must not be empty.",
                None,
            );
        }

        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        if accounts.contains_key(username) {
            return response(
                MessageTag::Register,
                false,
                "This username is already taken.",
                None,
            );
        }

        let user = User {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            username: username.to_string(),
        };
        accounts.insert(
            username.to_string(),
            Account {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        tracing::info!(username, id = user.id, "registered account");
        response(
            MessageTag::Register,
            true,
            "Registration successful.",
            Some(user),
        )
    }
}
