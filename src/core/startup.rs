use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::config::{Config, SeedConfig, StoreBackend};
use crate::core::state::AppState;
use crate::models::user::{NewUser, Role, User};
use crate::stores::file_store::FileStore;
use crate::stores::kv::MemoryStore;

/// Open the configured store and build the state around it
pub fn build_state(config: Config) -> Result<AppState> {
    match config.store.backend {
        StoreBackend::Memory => {
            info!("Using in-memory store, nothing will be kept after exit");
            Ok(AppState::new(config, Arc::new(MemoryStore::new()), None))
        }
        StoreBackend::File => {
            let path = config.store.path.clone();
            let file_store = Arc::new(
                FileStore::open(path.clone())
                    .context(format!("Failed to open store at {}", path.display()))?,
            );

            if config.store.compact_on_start {
                file_store.compact().context("Failed to compact store")?;
            }

            Ok(AppState::new(config, file_store.clone(), Some(file_store)))
        }
    }
}

// this runs at boot time
pub fn load_state(state: &AppState) -> Result<()> {
    let users_stored = state.users.load().context("Failed to load users")?;
    state.keys.load().context("Failed to load keys")?;

    if !users_stored && state.config.seed.bootstrap_admin {
        let admin = seed_bootstrap_admin(state, &state.config.seed)?;
        info!(user_id = %admin.id, login = ?admin.login, "Bootstrap admin created");
    }

    if let Err(e) = state.session.restore() {
        warn!(error = %e, "Stored session is unreadable, starting signed out");
        state.session.logout();
    }

    info!(
        users_loaded = state.users.len(),
        keys_loaded = state.keys.len(),
        signed_in = state.session.is_authenticated(),
        "State loaded"
    );

    Ok(())
}

fn seed_bootstrap_admin(state: &AppState, seed: &SeedConfig) -> Result<Arc<User>> {
    let fields = NewUser {
        name: seed.admin_name.clone(),
        email: seed.admin_email.clone(),
        department: seed.admin_department.clone(),
        login: Some(seed.admin_login.clone()),
        password: Some(seed.admin_password.clone()),
        barcode: None,
        role: Some(Role::Admin),
        face_id: None,
    };

    state
        .users
        .create(fields)
        .context("Failed to create bootstrap admin")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::key::KeyStatus;
    use crate::services::session::LoginMode;
    use tempfile::TempDir;

    fn file_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.store.path = dir.path().join("bureau.db");
        config
    }

    #[test]
    fn test_fresh_store_gets_bootstrap_admin() {
        let state = AppState::in_memory(Config::default());
        load_state(&state).unwrap();

        let admins = state.users.find_by_role(Role::Admin);
        assert_eq!(admins.len(), 1);
        assert!(state.session.login("admin", "admin", LoginMode::Admin));
    }

    #[test]
    fn test_no_seed_when_disabled() {
        let mut config = Config::default();
        config.seed.bootstrap_admin = false;
        let state = AppState::in_memory(config);
        load_state(&state).unwrap();

        assert!(state.users.is_empty());
        assert!(!state.session.login("admin", "admin", LoginMode::Admin));
    }

    #[test]
    fn test_state_survives_restart() {
        let dir = TempDir::new().unwrap();

        let key_id = {
            let state = build_state(file_config(&dir)).unwrap();
            load_state(&state).unwrap();
            assert!(state.session.login("admin", "admin", LoginMode::Employee));
            let key = state.keys.add("301", "IT").unwrap();
            state.keys.issue(key.id, "Petrov").unwrap();
            key.id
        };

        let state = build_state(file_config(&dir)).unwrap();
        load_state(&state).unwrap();

        // Seeding happens once
        assert_eq!(state.users.len(), 1);
        assert_eq!(state.keys.get(key_id).unwrap().status(), KeyStatus::Issued);
        assert!(state.session.is_admin());
    }

    #[test]
    fn test_deleted_users_are_not_reseeded() {
        let dir = TempDir::new().unwrap();
        {
            let state = build_state(file_config(&dir)).unwrap();
            load_state(&state).unwrap();
            let admin = state.users.list()[0].clone();
            state.users.delete(admin.id);
        }

        let state = build_state(file_config(&dir)).unwrap();
        load_state(&state).unwrap();
        assert!(state.users.is_empty());
    }
}
