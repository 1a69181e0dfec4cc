use crate::auth::AccountTable;
use serde::{Deserialize, Serialize};
use time::macros::date;

pub const APP_NAME: &str = "docfind";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Tunables for indexing and search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Largest plain-text file that will be read for indexing, in MB.
    pub max_file_size_mb: u64,
    /// Queries shorter than this are rejected by the caller layer; the index
    /// itself answers any length.
    pub min_query_len: usize,
    pub default_max_results: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_file_size_mb: 50,
            min_query_len: 2,
            default_max_results: 50,
        }
    }
}

/// Built-in deployment accounts. Passwords are stored as bcrypt hashes; the
/// admin manages user expiry dates here.
pub fn default_accounts() -> AccountTable {
    let mut table = AccountTable::new();
    table.add_admin(
        "admin",
        "$2b$12$8lNX5LCP/ho6tkrKCH0Tn.yxdV.aUyxMSrgc6tplrLRyDTez92C62",
    );
    table.add_user(
        "user1",
        "$2b$12$eS5h1H8sLmfDkOFe2uTfYuJ4vKNr26iaSl/a61AQyRlmX2bC8IyDS",
        Some(date!(2025 - 12 - 31)),
    );
    table.add_user(
        "user2",
        "$2b$12$L8W1e3.UCd7TollYLTdMJOOVnh9LoxavMKx/k7QS.mp1oHDGqKNwm",
        Some(date!(2025 - 11 - 30)),
    );
    table.add_user(
        "user3",
        "$2b$12$C/UN5Th4xci/YV5MWYseMe/qbPhCxpI8xO/cX4AHaYczjPfN6HIt2",
        Some(date!(2025 - 10 - 31)),
    );
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = SearchSettings::default();
        assert_eq!(settings.max_file_size_mb, 50);
        assert_eq!(settings.min_query_len, 2);
    }

    #[test]
    fn default_table_has_admin_and_users() {
        let table = default_accounts();
        assert!(table.is_admin("admin"));
        assert!(!table.is_admin("user1"));
        assert!(table.expiration("user1").is_some());
    }
}
