use std::collections::HashMap;
use thiserror::Error;
use time::{Date, OffsetDateTime};

#[derive(Debug, Error, PartialEq)]
pub enum AuthError {
    #[error("username and password are required")]
    MissingCredentials,
    #[error("unknown user")]
    UnknownUser,
    #[error("invalid password")]
    InvalidPassword,
    #[error("account expired {days_ago} days ago")]
    Expired { days_ago: i64 },
    #[error("not logged in")]
    NotLoggedIn,
}

/// Static credential table: admin and deployable user accounts with bcrypt
/// password hashes, plus per-user expiry dates. Admin accounts never expire;
/// a user without an expiry entry is treated as expired.
#[derive(Debug, Clone, Default)]
pub struct AccountTable {
    admins: HashMap<String, String>,
    users: HashMap<String, String>,
    expirations: HashMap<String, Date>,
}

impl AccountTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_admin(&mut self, username: &str, password_hash: &str) {
        self.admins.insert(username.to_string(), password_hash.to_string());
    }

    pub fn add_user(&mut self, username: &str, password_hash: &str, expires: Option<Date>) {
        self.users.insert(username.to_string(), password_hash.to_string());
        if let Some(date) = expires {
            self.expirations.insert(username.to_string(), date);
        }
    }

    pub fn is_admin(&self, username: &str) -> bool {
        self.admins.contains_key(username)
    }

    pub fn expiration(&self, username: &str) -> Option<Date> {
        self.expirations.get(username).copied()
    }

    /// Days until expiry, negative when already expired. `None` for admin
    /// accounts (unlimited) and for users without an expiry entry.
    pub fn remaining_days(&self, username: &str, today: Date) -> Option<i64> {
        if self.is_admin(username) {
            return None;
        }
        self.expirations
            .get(username)
            .map(|expiry| (*expiry - today).whole_days())
    }

    pub fn is_expired(&self, username: &str, today: Date) -> bool {
        if self.is_admin(username) {
            return false;
        }
        match self.expirations.get(username) {
            Some(expiry) => today > *expiry,
            None => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub is_admin: bool,
    pub login_time: OffsetDateTime,
}

/// Login state machine over an injected account table.
pub struct AuthManager {
    accounts: AccountTable,
    session: Option<Session>,
}

impl AuthManager {
    pub fn new(accounts: AccountTable) -> Self {
        Self {
            accounts,
            session: None,
        }
    }

    pub fn accounts(&self) -> &AccountTable {
        &self.accounts
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    pub fn authenticate(&mut self, username: &str, password: &str) -> Result<&Session, AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let admin_check = self
            .accounts
            .admins
            .get(username)
            .map(|hash| verify_password(password, hash));
        match admin_check {
            Some(true) => return Ok(self.open_session(username, true)),
            Some(false) => return Err(AuthError::InvalidPassword),
            None => {}
        }

        let Some(verified) = self
            .accounts
            .users
            .get(username)
            .map(|hash| verify_password(password, hash))
        else {
            return Err(AuthError::UnknownUser);
        };
        if !verified {
            return Err(AuthError::InvalidPassword);
        }

        let today = OffsetDateTime::now_utc().date();
        if self.accounts.is_expired(username, today) {
            let days_ago = self
                .accounts
                .remaining_days(username, today)
                .map(|d| -d)
                .unwrap_or(0);
            return Err(AuthError::Expired { days_ago });
        }
        Ok(self.open_session(username, false))
    }

    fn open_session(&mut self, username: &str, is_admin: bool) -> &Session {
        self.session = Some(Session {
            username: username.to_string(),
            is_admin,
            login_time: OffsetDateTime::now_utc(),
        });
        self.session.as_ref().expect("session just set")
    }

    pub fn logout(&mut self) {
        self.session = None;
    }

    /// Re-validate the current session; expired users are logged out.
    pub fn check_session(&mut self) -> Result<(), AuthError> {
        let Some(session) = &self.session else {
            return Err(AuthError::NotLoggedIn);
        };
        if session.is_admin {
            return Ok(());
        }
        let today = OffsetDateTime::now_utc().date();
        if self.accounts.is_expired(&session.username, today) {
            let days_ago = self
                .accounts
                .remaining_days(&session.username, today)
                .map(|d| -d)
                .unwrap_or(0);
            self.logout();
            return Err(AuthError::Expired { days_ago });
        }
        Ok(())
    }

    /// Days remaining for the current session's user; `None` for admins.
    pub fn remaining_days(&self) -> Option<i64> {
        let session = self.session.as_ref()?;
        self.accounts
            .remaining_days(&session.username, OffsetDateTime::now_utc().date())
    }
}

fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    // Low cost keeps the tests fast; production hashes use the default cost.
    fn hash(password: &str) -> String {
        bcrypt::hash(password, 4).expect("hash")
    }

    fn table() -> AccountTable {
        let mut t = AccountTable::new();
        t.add_admin("admin", &hash("admin-pass"));
        t.add_user("alice", &hash("alice-pass"), Some(date!(2099 - 12 - 31)));
        t.add_user("bob", &hash("bob-pass"), Some(date!(2020 - 01 - 01)));
        t.add_user("carol", &hash("carol-pass"), None);
        t
    }

    #[test]
    fn admin_login_succeeds() {
        let mut auth = AuthManager::new(table());
        let session = auth.authenticate("admin", "admin-pass").unwrap();
        assert!(session.is_admin);
        assert!(auth.is_logged_in());
    }

    #[test]
    fn wrong_password_rejected() {
        let mut auth = AuthManager::new(table());
        assert_eq!(
            auth.authenticate("alice", "nope").unwrap_err(),
            AuthError::InvalidPassword
        );
        assert!(!auth.is_logged_in());
    }

    #[test]
    fn unknown_user_rejected() {
        let mut auth = AuthManager::new(table());
        assert_eq!(
            auth.authenticate("mallory", "x").unwrap_err(),
            AuthError::UnknownUser
        );
    }

    #[test]
    fn expired_user_rejected_even_with_valid_password() {
        let mut auth = AuthManager::new(table());
        let err = auth.authenticate("bob", "bob-pass").unwrap_err();
        assert!(matches!(err, AuthError::Expired { days_ago } if days_ago > 0));
    }

    #[test]
    fn user_without_expiry_entry_is_expired() {
        let mut auth = AuthManager::new(table());
        assert!(matches!(
            auth.authenticate("carol", "carol-pass").unwrap_err(),
            AuthError::Expired { .. }
        ));
    }

    #[test]
    fn empty_credentials_rejected() {
        let mut auth = AuthManager::new(table());
        assert_eq!(
            auth.authenticate("", "").unwrap_err(),
            AuthError::MissingCredentials
        );
    }

    #[test]
    fn session_check_and_logout() {
        let mut auth = AuthManager::new(table());
        assert_eq!(auth.check_session().unwrap_err(), AuthError::NotLoggedIn);
        auth.authenticate("alice", "alice-pass").unwrap();
        assert!(auth.check_session().is_ok());
        assert!(auth.remaining_days().unwrap() > 0);
        auth.logout();
        assert!(!auth.is_logged_in());
    }
}
