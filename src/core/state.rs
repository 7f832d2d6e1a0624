// Application state (AppState)

use crate::core::config::Config;
use crate::services::save::SaveTracker;
use crate::services::scanner::Scanner;
use crate::services::session::SessionService;
use crate::stores::file_store::FileStore;
use crate::stores::key_registry::KeyRegistry;
use crate::stores::kv::KeyValueStore;
use crate::stores::user_registry::UserRegistry;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state
///
/// Every service receives the same injected store. All fields are wrapped
/// in Arc so the state can be handed to spawned tasks.
#[derive(Clone)]
pub struct AppState {
    /// Backing key-value store
    pub store: Arc<dyn KeyValueStore>,

    /// Same store when it is file-backed, for compaction
    pub log_store: Option<Arc<FileStore>>,

    pub users: Arc<UserRegistry>,

    pub keys: Arc<KeyRegistry>,

    /// Login state and authorization checks
    pub session: Arc<SessionService>,

    pub scanner: Arc<Scanner>,

    /// Explicit save with its busy flag
    pub saver: Arc<SaveTracker>,

    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn KeyValueStore>, log_store: Option<Arc<FileStore>>) -> Self {
        let config = Arc::new(config);

        let users = Arc::new(UserRegistry::new(Arc::clone(&store)));
        let keys = Arc::new(KeyRegistry::new(
            Arc::clone(&store),
            config.keys.barcode_prefix.clone(),
        ));
        let session = Arc::new(SessionService::new(
            Arc::clone(&users),
            Arc::clone(&store),
            &config.auth,
        ));
        let scanner = Arc::new(Scanner::new(
            Arc::clone(&users),
            Arc::clone(&keys),
            &config.scanner,
        ));

        Self {
            store,
            log_store,
            users,
            keys,
            session,
            scanner,
            saver: Arc::new(SaveTracker::new(Duration::from_millis(config.save.delay_ms))),
            config,
        }
    }

    /// State over a fresh in-memory store
    pub fn in_memory(config: Config) -> Self {
        Self::new(config, Arc::new(crate::stores::kv::MemoryStore::new()), None)
    }
}
