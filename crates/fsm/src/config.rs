//! State group configuration.

/// Default datastore namespace.
pub const DEFAULT_NAMESPACE: &str = "fsm";

/// Default capacity of the transition notification channel.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 256;

/// Configuration for a [`StateGroup`](crate::StateGroup).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    /// Datastore key prefix; records live under `/{namespace}/{id}`.
    pub namespace: String,
    /// Notifications buffered per subscriber before it starts lagging.
    pub notification_capacity: usize,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_owned(),
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        }
    }
}

impl GroupConfig {
    /// Configuration with the given namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Set the notification channel capacity.
    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity.max(1);
        self
    }

    /// Prefix shared by every record key.
    pub(crate) fn prefix(&self) -> String {
        format!("/{}/", self.namespace)
    }
}
