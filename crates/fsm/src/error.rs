use thiserror::Error;

/// Result type for state machine operations
pub type Result<T> = std::result::Result<T, FsmError>;

/// Errors from a datastore backend
#[derive(Error, Debug)]
pub enum DatastoreError {
    /// Backend specific failure
    #[error("datastore backend: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors from a state group
#[derive(Error, Debug)]
pub enum FsmError {
    /// `begin` was called for an id that already has a record
    #[error("already tracking {0}")]
    AlreadyTracking(String),

    /// No record exists for the id
    #[error("no state machine for {0}")]
    NotFound(String),

    /// The event is not enabled in the record's current state
    #[error("invalid transition: event {event} not allowed in state {state}")]
    InvalidTransition {
        /// Event kind
        event: String,
        /// Current state
        state: String,
    },

    /// The group has been stopped
    #[error("state group stopped")]
    Stopped,

    /// Reading or writing a record failed
    #[error(transparent)]
    Datastore(#[from] DatastoreError),

    /// A record could not be encoded or decoded
    #[error("record codec: {0}")]
    Codec(#[from] serde_json::Error),
}
