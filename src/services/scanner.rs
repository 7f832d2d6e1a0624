use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::core::config::ScannerConfig;
use crate::models::key::KeyRecord;
use crate::models::user::User;
use crate::stores::key_registry::KeyRegistry;
use crate::stores::user_registry::UserRegistry;

/// A badge resolved to its owner
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub user: Arc<User>,
    /// Keys currently issued to the user, by holder name
    pub held_keys: Vec<Arc<KeyRecord>>,
}

impl ScanResult {
    pub fn keys_issued(&self) -> usize {
        self.held_keys.len()
    }
}

/// Badge lookup behind the scanner screen
pub struct Scanner {
    users: Arc<UserRegistry>,
    keys: Arc<KeyRegistry>,
    delay: Duration,
    min_manual_length: usize,
}

impl Scanner {
    pub fn new(users: Arc<UserRegistry>, keys: Arc<KeyRegistry>, config: &ScannerConfig) -> Self {
        Self {
            users,
            keys,
            delay: Duration::from_millis(config.delay_ms),
            min_manual_length: config.min_manual_length,
        }
    }

    pub fn lookup(&self, code: &str) -> Option<ScanResult> {
        let code = code.trim();
        let user = self.users.find_by_barcode(code)?;
        let held_keys = self.keys.held_by(&user.name);

        info!(
            barcode = code,
            user_id = %user.id,
            keys_held = held_keys.len(),
            "Badge recognized"
        );
        Some(ScanResult { user, held_keys })
    }

    /// Lookup for typed input; waits until the code is long enough
    pub fn lookup_manual(&self, code: &str) -> Option<ScanResult> {
        if code.trim().chars().count() < self.min_manual_length {
            return None;
        }
        self.lookup(code)
    }

    /// Simulated hardware scan
    pub async fn scan(&self, code: &str) -> Option<ScanResult> {
        debug!(barcode = code, "Scanning");
        tokio::time::sleep(self.delay).await;
        self.lookup(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::{NewUser, Role};
    use crate::stores::kv::MemoryStore;

    fn fixture() -> Scanner {
        let store = Arc::new(MemoryStore::new());
        let users = Arc::new(UserRegistry::new(store.clone()));
        let keys = Arc::new(KeyRegistry::new(store, "KEY"));

        users
            .create(NewUser {
                name: "Ivanov I.I.".to_string(),
                email: "ivanov@company.ru".to_string(),
                department: "IT".to_string(),
                barcode: Some("EMP001".to_string()),
                role: Some(Role::Employee),
                ..Default::default()
            })
            .unwrap();

        let a = keys.add("301", "IT").unwrap();
        let b = keys.add("401", "IT").unwrap();
        keys.add("302", "IT").unwrap();
        keys.issue(a.id, "Ivanov I.I.").unwrap();
        keys.issue(b.id, "Ivanov I.I.").unwrap();

        Scanner::new(
            users,
            keys,
            &ScannerConfig {
                delay_ms: 1,
                min_manual_length: 6,
            },
        )
    }

    #[test]
    fn test_lookup_returns_user_and_held_keys() {
        let scanner = fixture();
        let result = scanner.lookup(" EMP001 ").unwrap();

        assert_eq!(result.user.name, "Ivanov I.I.");
        assert_eq!(result.keys_issued(), 2);
        let offices: Vec<&str> = result.held_keys.iter().map(|k| k.office.as_str()).collect();
        assert_eq!(offices, vec!["301", "401"]);
    }

    #[test]
    fn test_unknown_code() {
        let scanner = fixture();
        assert!(scanner.lookup("EMP999").is_none());
        assert!(scanner.lookup("").is_none());
    }

    #[test]
    fn test_manual_lookup_waits_for_full_code() {
        let scanner = fixture();
        assert!(scanner.lookup_manual("EMP00").is_none());
        assert!(scanner.lookup_manual("EMP001").is_some());
    }

    #[tokio::test]
    async fn test_scan_after_delay() {
        let scanner = fixture();
        assert!(scanner.scan("EMP001").await.is_some());
    }
}
