use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::key::{KeyStats, KeyStatus};
use crate::models::user::UserStatus;
use crate::stores::key_registry::KeyRegistry;
use crate::stores::user_registry::UserRegistry;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DepartmentStats {
    pub department: String,
    pub total: usize,
    pub issued: usize,
}

/// Figures shown on the dashboard cards
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub keys: KeyStats,
    pub issued_today: usize,
    pub active_users: usize,
    pub total_users: usize,
    pub departments: Vec<DepartmentStats>,
}

impl DashboardStats {
    /// `today` must use the same format as `issuedAt`
    pub fn collect(keys: &KeyRegistry, users: &UserRegistry, today: &str) -> Self {
        let mut departments: BTreeMap<String, DepartmentStats> = BTreeMap::new();
        let mut issued_today = 0;

        for key in keys.list() {
            let entry = departments
                .entry(key.department.clone())
                .or_insert_with(|| DepartmentStats {
                    department: key.department.clone(),
                    ..Default::default()
                });
            entry.total += 1;
            if key.status() == KeyStatus::Issued {
                entry.issued += 1;
            }
            if key.issued_at() == Some(today) {
                issued_today += 1;
            }
        }

        Self {
            keys: keys.stats(),
            issued_today,
            active_users: users.find_by_status(UserStatus::Active).len(),
            total_users: users.len(),
            departments: departments.into_values().collect(),
        }
    }
}
