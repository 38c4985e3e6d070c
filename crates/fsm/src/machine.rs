//! State machine definitions
//!
//! A machine is described by three pieces:
//!
//! - a [`Record`] type with a designated state attribute,
//! - an [`Events`] table naming, per event kind, the states it is enabled
//!   from and the state it leads to,
//! - the [`Machine`] behaviour: how an event mutates the record and what
//!   happens on entering a state.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A persisted record driven by a state machine.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The state attribute type.
    type State: Copy + Eq + Hash + fmt::Debug + fmt::Display + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Current state.
    fn state(&self) -> Self::State;

    /// Overwrite the state. Only the state group calls this.
    fn set_state(&mut self, state: Self::State);
}

/// An event that may be sent to a state machine.
pub trait Event: Clone + fmt::Debug + Send + Sync + 'static {
    /// Payload-free discriminant used to look up transitions.
    type Kind: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Kind of this event.
    fn kind(&self) -> Self::Kind;
}

/// Where a transition is enabled from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source<S> {
    /// Any state.
    Any,
    /// Only the listed states.
    States(Vec<S>),
}

impl<S: PartialEq> Source<S> {
    fn contains(&self, state: &S) -> bool {
        match self {
            Self::Any => true,
            Self::States(states) => states.contains(state),
        }
    }
}

#[derive(Debug, Clone)]
struct Transition<S> {
    from: Source<S>,
    /// `None` leaves the state unchanged.
    to: Option<S>,
}

/// Transition table keyed by event kind.
///
/// ```
/// use comb_fsm::Events;
///
/// let events = Events::new()
///     .transition("start", ["idle"], "running")
///     .transition_from_any("abort", "aborted")
///     .no_change("progress", ["running"]);
///
/// assert_eq!(events.resolve("start", "idle"), Some("running"));
/// assert_eq!(events.resolve("start", "running"), None);
/// assert_eq!(events.resolve("abort", "running"), Some("aborted"));
/// assert_eq!(events.resolve("progress", "running"), Some("running"));
/// ```
#[derive(Debug, Clone)]
pub struct Events<K, S> {
    table: HashMap<K, Vec<Transition<S>>>,
}

impl<K, S> Default for Events<K, S> {
    fn default() -> Self {
        Self {
            table: HashMap::new(),
        }
    }
}

impl<K: Copy + Eq + Hash, S: Copy + PartialEq> Events<K, S> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, kind: K, from: Source<S>, to: Option<S>) -> Self {
        self.table
            .entry(kind)
            .or_default()
            .push(Transition { from, to });
        self
    }

    /// Enable `kind` from each of `from`, leading to `to`.
    pub fn transition(self, kind: K, from: impl IntoIterator<Item = S>, to: S) -> Self {
        self.push(kind, Source::States(from.into_iter().collect()), Some(to))
    }

    /// Enable `kind` from every state, leading to `to`.
    pub fn transition_from_any(self, kind: K, to: S) -> Self {
        self.push(kind, Source::Any, Some(to))
    }

    /// Enable `kind` from each of `from` without changing state.
    pub fn no_change(self, kind: K, from: impl IntoIterator<Item = S>) -> Self {
        self.push(kind, Source::States(from.into_iter().collect()), None)
    }

    /// Destination of `kind` in state `current`, or `None` if not enabled.
    ///
    /// Transitions are tried in the order they were added.
    pub fn resolve(&self, kind: K, current: S) -> Option<S> {
        self.table
            .get(&kind)?
            .iter()
            .find(|t| t.from.contains(&current))
            .map(|t| t.to.unwrap_or(current))
    }

    /// Whether any transition is registered for `kind`.
    pub fn handles(&self, kind: K) -> bool {
        self.table.contains_key(&kind)
    }
}

/// Behaviour of a state machine over records of type [`Machine::Record`].
///
/// # Async Design
///
/// Entry actions are async so they can talk to the network or a chain node.
/// They run on the record's own actor task; a follow-up event they return is
/// queued behind nothing else on that task and applied next.
pub trait Machine: Send + Sync + 'static {
    /// Identifier of a record.
    type Key: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;
    /// The record type.
    type Record: Record;
    /// The event type.
    type Event: Event;

    /// The transition table.
    fn events(&self) -> &Events<<Self::Event as Event>::Kind, <Self::Record as Record>::State>;

    /// Mutate `record` for an event that passed the table check.
    ///
    /// Runs before the new state is set and before the record is persisted.
    fn apply(&self, record: &mut Self::Record, event: &Self::Event);

    /// Entry action for `state`, run after a transition into it is persisted.
    ///
    /// Returns an optional follow-up event.
    fn on_enter(
        &self,
        state: <Self::Record as Record>::State,
        record: &Self::Record,
    ) -> impl Future<Output = Option<Self::Event>> + Send;

    /// Whether `state` ends automatic progress.
    fn is_terminal(&self, state: <Self::Record as Record>::State) -> bool;
}
