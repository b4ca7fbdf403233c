/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("timed out after {0:?} waiting on the key-value store")]
    KvTimeout(std::time::Duration),
    #[error("key-value store error: {0}")]
    Kv(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("failed to decode {what} at key {key:?}: {source}")]
    Decode {
        what: &'static str,
        key: Vec<u8>,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
    #[error("key {0:?} is too short to be a valid accounthist key")]
    ShortKey(Vec<u8>),
    #[error("unrecognized key prefix {0:#x}")]
    UnknownPrefix(u8),
    #[error("block-filter error: {0}")]
    Filter(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("block-stream error: {0}")]
    Stream(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn kv(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Kv(Box::new(err))
    }

    pub fn decode(
        what: &'static str,
        key: impl Into<Vec<u8>>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Decode {
            what,
            key: key.into(),
            source: Box::new(source),
        }
    }
}
