use warden_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("queue provider is closed")]
    Closed,

    #[error("no connections available")]
    NoConnections,

    #[error("connection {0} is closed")]
    ConnectionClosed(usize),

    #[error("no handler registered for event type: {0}")]
    NoHandler(String),

    #[error("event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("audit ledger error: {0}")]
    Audit(#[from] StorageError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("failed after {retries} retries: {source}")]
    RetriesExhausted {
        retries: u32,
        #[source]
        source: Box<EventError>,
    },
}

impl From<lapin::Error> for EventError {
    fn from(e: lapin::Error) -> Self {
        EventError::Transport(e.to_string())
    }
}

impl EventError {
    pub(crate) fn exhausted(retries: u32, source: EventError) -> Self {
        EventError::RetriesExhausted {
            retries,
            source: Box::new(source),
        }
    }
}
