// Copyright © 2024 Pathway

use std::any::Any;
use std::error;
use std::io;
use std::result;

use super::config::Error as ConfigError;
use super::graph::{Fid, Gid, Oid, Vertex};
use super::reduce::Reducer;
use super::value::{Type, Value};

#[allow(clippy::module_name_repetitions)]
pub type DynError = Box<dyn error::Error + Send + Sync>;
pub type DynResult<T> = result::Result<T, DynError>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("aggregator {0:?} is not registered")]
    UnregisteredAggregator(String),

    #[error("aggregator {name:?} holds {expected} values, got {actual}")]
    AggregatorTypeMismatch {
        name: String,
        expected: Type,
        actual: Type,
    },

    #[error("{reducer} aggregator can't reduce {element} values")]
    UnsupportedAggregator { reducer: Reducer, element: Type },

    #[error("{reducer} reducer can't combine {lhs:?} with {rhs:?}")]
    ReducerTypeMismatch {
        reducer: Reducer,
        lhs: Value,
        rhs: Value,
    },

    #[error("aggregator state received from another worker is corrupted: {0}")]
    AggregatorCorrupted(#[source] bincode::Error),

    #[error("type mismatch: expected {expected}, got {value:?}")]
    TypeMismatch {
        expected: &'static str,
        value: Value,
    },

    #[error("unknown destination vertex {0}")]
    UnknownVertex(Gid),

    #[error("vertex {0:?} is neither an inner nor an outer vertex of this fragment")]
    UnknownLocalVertex(Vertex),

    #[error("vertex {0:?} is not owned by this compute context")]
    NotOwned(Vertex),

    #[error("vertex {0:?} is not an outer vertex")]
    NotOuterVertex(Vertex),

    #[error("vertex {0} was added twice with different labels")]
    DuplicateVertex(Oid),

    #[error("invalid fragment id {0}")]
    InvalidFragment(Fid),

    #[error("combiner failed: {0}")]
    Combiner(#[source] DynError),

    #[error("combiner invoked without messages")]
    EmptyCombine,

    #[error("malformed message batch: {0}")]
    MalformedMessages(#[source] bincode::Error),

    #[error("serialization failed: {0}")]
    Serialization(#[source] bincode::Error),

    #[error("vertex program failed at superstep {superstep} on vertex {vertex}: {inner}")]
    VertexProgram {
        superstep: u64,
        vertex: Oid,
        #[source]
        inner: DynError,
    },

    #[error("program setup failed: {0}")]
    Setup(#[source] DynError),

    #[error("superstep limit of {0} exceeded")]
    SuperstepLimitExceeded(u64),

    #[error("transport out of sync: expected superstep {expected}, got {actual} from worker {from}")]
    SuperstepMismatch {
        expected: u64,
        actual: u64,
        from: Fid,
    },

    #[error("{0}")]
    InvalidPhase(&'static str),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("computation aborted because another worker failed")]
    Aborted,

    #[error("worker panic: {0}")]
    WorkerPanic(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("config key {key:?} has invalid value {value:?}: {inner}")]
    InvalidConfigValue {
        key: String,
        value: String,
        #[source]
        inner: DynError,
    },

    #[error("output failed: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Other(DynError),
}

impl Error {
    pub fn from_panic_payload(panic_payload: Box<dyn Any + Send + 'static>) -> Self {
        let message = match panic_payload.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(panic_payload) => match panic_payload.downcast::<String>() {
                Ok(message) => *message,
                Err(panic_payload) => format!("{panic_payload:?}"),
            },
        };
        Self::WorkerPanic(message)
    }

    /// Whether the error only reflects a failure that happened elsewhere.
    pub fn is_secondary(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

impl From<DynError> for Error {
    fn from(value: DynError) -> Self {
        match value.downcast::<Self>() {
            Ok(this) => *this,
            Err(other) => Self::Other(other),
        }
    }
}

pub type Result<T, E = Error> = result::Result<T, E>;
