// Centralized error types for the key bureau

use thiserror::Error;

use crate::models::id::RecordId;
use crate::models::key::KeyStatus;

/// Errors raised by a key-value store backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to encode record '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Record '{key}' is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid store key: {0}")]
    InvalidKey(String),

    #[error("Storage backend failure")]
    Backend(#[from] anyhow::Error),
}

/// A required form field was left blank
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Field '{0}' must not be blank")]
    BlankField(&'static str),
}

/// Every id after the highest one seen is taken
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("No record ids left after {last}")]
pub struct IdsExhausted {
    pub last: RecordId,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum KeyError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    IdsExhausted(#[from] IdsExhausted),

    #[error("Key not found: {0}")]
    NotFound(RecordId),

    #[error("Cannot {action} key {id} while it is {status}")]
    InvalidTransition {
        id: RecordId,
        status: KeyStatus,
        action: &'static str,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum UserError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    IdsExhausted(#[from] IdsExhausted),

    #[error("User not found: {0}")]
    NotFound(RecordId),
}

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("A save is already in progress")]
    InProgress,

    #[error("Failed to write data: {0}")]
    Store(#[from] StoreError),
}

/// Errors raised while parsing or running a console command
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(&'static str),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    User(#[from] UserError),

    #[error(transparent)]
    Save(#[from] SaveError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
