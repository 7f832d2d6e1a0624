pub mod core {
    pub mod commands;
    pub mod config;
    pub mod error;
    pub mod startup;
    pub mod state;
    pub mod tracing_init;
}

pub mod models {
    pub mod id;
    pub mod key;
    pub mod user;
}

pub mod services {
    pub mod dashboard;
    pub mod save;
    pub mod scanner;
    pub mod session;
}

pub mod stores {
    pub mod file_store;
    pub mod key_registry;
    pub mod kv;
    pub mod user_registry;
}

pub mod utils {
    pub mod auth;
    pub mod barcode;
    pub mod time;
}

pub mod validation {
    pub mod fields;
}

pub mod wal {
    pub mod wal;
}
