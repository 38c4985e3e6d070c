//! Durable, event-driven state machines
//!
//! This crate runs many instances of one state machine definition, each
//! keyed by an id and persisted after every transition:
//!
//! - **Definition**: a [`Machine`] with its [`Events`] transition table
//! - **Storage**: records live in a [`Datastore`] as `{ state, record }` JSON
//! - **Execution**: a [`StateGroup`] owns one actor task per id, serializing
//!   that id's events and running entry actions that may emit follow-ups
//!
//! Events for different ids never wait on each other.

pub mod config;
pub mod datastore;
pub mod error;
pub mod group;
pub mod machine;

pub use config::GroupConfig;
pub use datastore::{Datastore, MemoryDatastore};
pub use error::{DatastoreError, FsmError, Result};
pub use group::{MachineNotification, Notification, StateGroup, StateOf};
pub use machine::{Event, Events, Machine, Record, Source};
