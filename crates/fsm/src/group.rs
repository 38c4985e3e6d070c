//! Groups of durable state machines
//!
//! A [`StateGroup`] drives every record of one [`Machine`]. Each tracked id
//! gets its own actor task with a command queue:
//!
//! ```text
//! send(id, event) ─▶ [queue(id)] ─▶ table check ─▶ apply ─▶ persist ─▶ reply
//!                         ▲                                      │
//!                         └──────── follow-up event ◀── entry action
//! ```
//!
//! Events for one id are applied strictly in order; different ids progress in
//! parallel. A follow-up event returned by an entry action is applied before
//! the actor takes the next command from its queue. An actor retires once its
//! record sits in a terminal state with nothing left to do; a later event for
//! that id restores a fresh actor from the store.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::GroupConfig;
use crate::datastore::Datastore;
use crate::error::{FsmError, Result};
use crate::machine::{Event, Machine, Record};

/// State type of a machine's records.
pub type StateOf<M> = <<M as Machine>::Record as Record>::State;

/// Transition notification for a machine.
pub type MachineNotification<M> =
    Notification<<M as Machine>::Key, <M as Machine>::Event, StateOf<M>>;

/// Published after every persisted transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification<K, E, S> {
    /// Record id.
    pub id: K,
    /// The applied event.
    pub event: E,
    /// State before the event.
    pub from: S,
    /// State after the event.
    pub to: S,
}

/// Persisted form of a record.
#[derive(Serialize)]
struct EnvelopeRef<'a, S, R> {
    state: S,
    record: &'a R,
}

#[derive(Deserialize)]
struct Envelope<S, R> {
    state: S,
    record: R,
}

fn encode<R: Record>(record: &R) -> Result<Bytes> {
    let envelope = EnvelopeRef {
        state: record.state(),
        record,
    };
    Ok(Bytes::from(serde_json::to_vec(&envelope)?))
}

fn decode<R: Record>(bytes: &[u8]) -> Result<R> {
    let envelope: Envelope<R::State, R> = serde_json::from_slice(bytes)?;
    let mut record = envelope.record;
    record.set_state(envelope.state);
    Ok(record)
}

/// State shared between the group and its actors.
struct Shared<M: Machine> {
    machine: M,
    store: Arc<dyn Datastore>,
    prefix: String,
    notifications: broadcast::Sender<MachineNotification<M>>,
    actors: Mutex<HashMap<M::Key, Actor<M>>>,
    generation: AtomicU64,
}

impl<M: Machine> Shared<M> {
    fn key(&self, id: &M::Key) -> String {
        format!("{}{}", self.prefix, id)
    }

    fn load(&self, id: &M::Key) -> Result<Option<M::Record>> {
        self.store
            .get(&self.key(id))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn persist(&self, id: &M::Key, record: &M::Record) -> Result<()> {
        self.store.put(&self.key(id), encode(record)?)?;
        Ok(())
    }

    /// Drop the map entry of a terminal actor if its queue is drained.
    ///
    /// Senders are only handed out under the map lock, so an empty queue seen
    /// under that lock stays empty apart from senders cloned earlier. Those
    /// find the channel closed and go back through the map.
    fn retire(
        &self,
        id: &M::Key,
        generation: u64,
        commands: &mut mpsc::UnboundedReceiver<Command<M>>,
    ) -> bool {
        let mut actors = self.actors.lock();
        if !commands.is_empty() {
            return false;
        }
        if actors.get(id).is_some_and(|a| a.generation == generation) {
            actors.remove(id);
        }
        commands.close();
        true
    }

    /// Check, apply and persist one event. `record` is untouched on error.
    fn apply_event(
        &self,
        id: &M::Key,
        record: &mut M::Record,
        event: &M::Event,
    ) -> Result<(StateOf<M>, StateOf<M>)> {
        let from = record.state();
        let kind = event.kind();
        let to = self.machine.events().resolve(kind, from).ok_or_else(|| {
            FsmError::InvalidTransition {
                event: kind.to_string(),
                state: from.to_string(),
            }
        })?;

        let mut next = record.clone();
        self.machine.apply(&mut next, event);
        next.set_state(to);
        self.persist(id, &next)?;
        *record = next;

        debug!(%id, event = %kind, %from, %to, "applied transition");
        // no subscribers is fine
        let _ = self.notifications.send(Notification {
            id: id.clone(),
            event: event.clone(),
            from,
            to,
        });
        Ok((from, to))
    }
}

enum Command<M: Machine> {
    Event {
        event: M::Event,
        reply: Option<oneshot::Sender<Result<StateOf<M>>>>,
    },
    Resume,
}

struct Actor<M: Machine> {
    commands: mpsc::UnboundedSender<Command<M>>,
    task: JoinHandle<()>,
    generation: u64,
}

async fn run_actor<M: Machine>(
    shared: Arc<Shared<M>>,
    id: M::Key,
    generation: u64,
    mut record: M::Record,
    mut commands: mpsc::UnboundedReceiver<Command<M>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut pending = VecDeque::new();

    loop {
        if *shutdown.borrow() {
            break;
        }

        let command = match pending.pop_front() {
            Some(event) => Command::Event { event, reply: None },
            None => tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                command = commands.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            },
        };

        let entered = match command {
            Command::Event { event, reply } => {
                let result = shared.apply_event(&id, &mut record, &event);
                let entered = match &result {
                    Ok((from, to)) if from != to => Some(*to),
                    Ok(_) => None,
                    Err(err) => {
                        if reply.is_none() {
                            warn!(%id, ?event, error = %err, "follow-up event rejected");
                        }
                        None
                    }
                };
                if let Some(reply) = reply {
                    // the caller may have gone away
                    let _ = reply.send(result.map(|(_, to)| to));
                }
                entered
            }
            Command::Resume => {
                let state = record.state();
                (!shared.machine.is_terminal(state)).then_some(state)
            }
        };

        if let Some(state) = entered {
            let action = shared.machine.on_enter(state, &record);
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                next = action => pending.extend(next),
            }
        }

        if pending.is_empty()
            && shared.machine.is_terminal(record.state())
            && shared.retire(&id, generation, &mut commands)
        {
            debug!(%id, state = %record.state(), "state machine actor retired");
            return;
        }
    }

    debug!(%id, state = %record.state(), "state machine actor exited");
}

/// A group of durable state machines sharing one [`Machine`] definition.
///
/// The group is the only writer of its records. Records are persisted after
/// every transition and survive the group: a new group over the same
/// datastore picks up where the old one left off, restoring an actor the
/// first time an id is addressed.
///
/// Methods that start actors must be called within a Tokio runtime.
pub struct StateGroup<M: Machine> {
    shared: Arc<Shared<M>>,
    shutdown: watch::Sender<bool>,
    stopped: AtomicBool,
}

impl<M: Machine> fmt::Debug for StateGroup<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateGroup")
            .field("prefix", &self.shared.prefix)
            .field("actors", &self.shared.actors.lock().len())
            .field("stopped", &self.stopped.load(Ordering::Relaxed))
            .finish()
    }
}

impl<M: Machine> StateGroup<M> {
    /// Create a group persisting records in `store`.
    pub fn new(machine: M, store: Arc<dyn Datastore>, config: GroupConfig) -> Self {
        let (notifications, _) = broadcast::channel(config.notification_capacity.max(1));
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                machine,
                store,
                prefix: config.prefix(),
                notifications,
                actors: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
            shutdown,
            stopped: AtomicBool::new(false),
        }
    }

    /// The machine definition.
    pub fn machine(&self) -> &M {
        &self.shared.machine
    }

    fn ensure_running(&self) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            Err(FsmError::Stopped)
        } else {
            Ok(())
        }
    }

    fn spawn_actor(&self, id: M::Key, record: M::Record) -> Actor<M> {
        let (commands, receiver) = mpsc::unbounded_channel();
        let generation = self.shared.generation.fetch_add(1, Ordering::Relaxed);
        let task = tokio::spawn(run_actor(
            Arc::clone(&self.shared),
            id,
            generation,
            record,
            receiver,
            self.shutdown.subscribe(),
        ));
        Actor {
            commands,
            task,
            generation,
        }
    }

    /// Command queue of `id`, restoring its actor from the store if needed.
    ///
    /// With `skip_terminal`, a persisted record in a terminal state is not
    /// restored and `None` is returned.
    fn commands(
        &self,
        id: &M::Key,
        skip_terminal: bool,
    ) -> Result<Option<mpsc::UnboundedSender<Command<M>>>> {
        let mut actors = self.shared.actors.lock();
        self.ensure_running()?;
        if let Some(actor) = actors.get(id) {
            return Ok(Some(actor.commands.clone()));
        }

        let record = self
            .shared
            .load(id)?
            .ok_or_else(|| FsmError::NotFound(id.to_string()))?;
        if skip_terminal && self.shared.machine.is_terminal(record.state()) {
            return Ok(None);
        }
        debug!(%id, state = %record.state(), "restored state machine");
        let actor = self.spawn_actor(id.clone(), record);
        let commands = actor.commands.clone();
        actors.insert(id.clone(), actor);
        Ok(Some(commands))
    }

    /// Start tracking a new record.
    ///
    /// Fails with [`FsmError::AlreadyTracking`] if the id is tracked or
    /// persisted already; the existing record is left untouched. No entry
    /// action runs for the initial state.
    pub fn begin(&self, id: M::Key, record: M::Record) -> Result<()> {
        let mut actors = self.shared.actors.lock();
        self.ensure_running()?;
        if actors.contains_key(&id) || self.shared.store.has(&self.shared.key(&id))? {
            return Err(FsmError::AlreadyTracking(id.to_string()));
        }

        self.shared.persist(&id, &record)?;
        debug!(%id, state = %record.state(), "began tracking");
        if self.shared.machine.is_terminal(record.state()) {
            return Ok(());
        }
        let actor = self.spawn_actor(id.clone(), record);
        actors.insert(id, actor);
        Ok(())
    }

    /// Apply an event and return the resulting state.
    ///
    /// The record is persisted before this returns. The entry action of the
    /// new state, if any, runs afterwards on the record's actor. An event not
    /// enabled in the current state fails with
    /// [`FsmError::InvalidTransition`] and changes nothing.
    pub async fn send(&self, id: &M::Key, event: M::Event) -> Result<StateOf<M>> {
        loop {
            let Some(commands) = self.commands(id, false)? else {
                return Err(FsmError::NotFound(id.to_string()));
            };
            let (reply, response) = oneshot::channel();
            let command = Command::Event {
                event: event.clone(),
                reply: Some(reply),
            };
            // a closed queue or a dropped reply without shutdown means the
            // actor retired before taking the command
            if commands.send(command).is_ok() {
                if let Ok(result) = response.await {
                    return result;
                }
            }
            self.ensure_running()?;
        }
    }

    /// Re-run the entry action of a persisted, non-terminal record.
    ///
    /// Terminal records are left alone and no actor is started for them.
    pub fn resume(&self, id: &M::Key) -> Result<()> {
        match self.commands(id, true)? {
            // a retiring actor is terminal, so a lost resume is a no-op
            Some(commands) => {
                let _ = commands.send(Command::Resume);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// The persisted record of `id`.
    pub fn get(&self, id: &M::Key) -> Result<M::Record> {
        self.shared
            .load(id)?
            .ok_or_else(|| FsmError::NotFound(id.to_string()))
    }

    /// Whether a record exists for `id`.
    pub fn has(&self, id: &M::Key) -> Result<bool> {
        if self.shared.actors.lock().contains_key(id) {
            return Ok(true);
        }
        Ok(self.shared.store.has(&self.shared.key(id))?)
    }

    /// Every persisted record, ordered by storage key.
    pub fn list(&self) -> Result<Vec<M::Record>> {
        self.shared
            .store
            .query_prefix(&self.shared.prefix)?
            .iter()
            .map(|(_, bytes)| decode(bytes))
            .collect()
    }

    /// Receive a [`Notification`] for every transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<MachineNotification<M>> {
        self.shared.notifications.subscribe()
    }

    /// Number of records with a live actor.
    ///
    /// Records in a terminal state release their actor once their entry
    /// action has finished.
    pub fn active_count(&self) -> usize {
        self.shared.actors.lock().len()
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Stop every actor.
    ///
    /// New calls fail with [`FsmError::Stopped`]. Queued events are dropped
    /// and running entry actions are cancelled at their next await point.
    /// Persisted records are kept as they are.
    pub async fn stop(&self) {
        {
            let _actors = self.shared.actors.lock();
            if self.stopped.swap(true, Ordering::AcqRel) {
                return;
            }
        }
        self.shutdown.send_replace(true);

        let tasks: Vec<_> = self
            .shared
            .actors
            .lock()
            .drain()
            .map(|(_, actor)| actor.task)
            .collect();
        for task in tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "state machine actor failed");
            }
        }
    }
}

impl<M: Machine> Drop for StateGroup<M> {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}
