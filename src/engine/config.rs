// Copyright © 2024 Pathway

use std::collections::BTreeMap;
use std::error;
use std::str::FromStr;

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::driver::Traversal;
use super::error::{DynError, Error as EngineError};
use super::graph::MAX_FRAGMENTS;
use crate::env::{parse_env_var, parse_env_var_or, Error as EnvError};

const MAX_THREADS: usize = 256;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("can't run with no threads")]
    NeedsThreads,

    #[error("can't run with no workers")]
    NeedsWorkers,

    #[error("can't run with {0} workers, at most {MAX_FRAGMENTS} are supported")]
    TooManyWorkers(usize),

    #[error("configured for {configured} workers but the graph has {fragments} fragments")]
    WorkerCountMismatch { configured: usize, fragments: usize },

    #[error("unknown traversal {0:?}, expected \"flat\" or \"by-label\"")]
    UnknownTraversal(String),

    #[error("job config entry {0:?} is not of the form key=value")]
    MalformedEntry(String),

    #[error("job config must be a JSON object of scalars: {0}")]
    MalformedJson(String),

    #[error(transparent)]
    EnvError(#[from] EnvError),
}

/// Deployment parameters of one computation.
#[derive(Clone, Debug)]
pub struct Config {
    workers: usize,
    threads: usize,
    traversal: Traversal,
    max_supersteps: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 1,
            threads: 1,
            traversal: Traversal::Flat,
            max_supersteps: None,
        }
    }
}

impl Config {
    pub fn new(workers: usize, threads: usize) -> Result<Self, Error> {
        if workers == 0 {
            return Err(Error::NeedsWorkers);
        }
        if workers > MAX_FRAGMENTS {
            return Err(Error::TooManyWorkers(workers));
        }
        if threads == 0 {
            return Err(Error::NeedsThreads);
        }
        Ok(Self {
            workers,
            threads: clamp_threads(threads),
            ..Self::default()
        })
    }

    #[must_use]
    pub fn with_traversal(mut self, traversal: Traversal) -> Self {
        self.traversal = traversal;
        self
    }

    #[must_use]
    pub fn with_max_supersteps(mut self, max_supersteps: Option<u64>) -> Self {
        self.max_supersteps = max_supersteps;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn traversal(&self) -> Traversal {
        self.traversal
    }

    pub fn max_supersteps(&self) -> Option<u64> {
        self.max_supersteps
    }

    pub fn from_env() -> Result<Self, Error> {
        let workers: usize = parse_env_var_or("PREGEL_WORKERS", 1)?;
        let threads: usize = parse_env_var_or("PREGEL_THREADS", 1)?;
        let traversal = match parse_env_var::<String>("PREGEL_TRAVERSAL")? {
            Some(name) => name.parse()?,
            None => Traversal::Flat,
        };
        let max_supersteps: Option<u64> = parse_env_var("PREGEL_MAX_SUPERSTEPS")?;
        Ok(Self::new(workers, threads)?
            .with_traversal(traversal)
            .with_max_supersteps(max_supersteps))
    }
}

fn clamp_threads(threads: usize) -> usize {
    if threads > MAX_THREADS {
        warn!("{threads} is greater than the maximum allowed number of threads ({MAX_THREADS}), reducing");
        MAX_THREADS
    } else {
        threads
    }
}

/// Flat string-keyed job parameters handed to vertex programs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig(BTreeMap<String, String>);

impl JobConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `key=value` arguments; later keys override earlier ones.
    pub fn from_args<I, S>(args: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = Self::new();
        for arg in args {
            let arg = arg.as_ref();
            let Some((key, value)) = arg.split_once('=') else {
                return Err(Error::MalformedEntry(arg.to_owned()));
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(Error::MalformedEntry(arg.to_owned()));
            }
            config.insert(key, value.trim());
        }
        Ok(config)
    }

    /// Parses a JSON object; scalar values are stored in their textual form.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let parsed: JsonValue =
            serde_json::from_str(json).map_err(|e| Error::MalformedJson(e.to_string()))?;
        let JsonValue::Object(entries) = parsed else {
            return Err(Error::MalformedJson("top-level value is not an object".into()));
        };
        let mut config = Self::new();
        for (key, value) in entries {
            let value = match value {
                JsonValue::String(s) => s,
                JsonValue::Number(n) => n.to_string(),
                JsonValue::Bool(b) => b.to_string(),
                other => {
                    return Err(Error::MalformedJson(format!(
                        "value of {key:?} is not a scalar: {other}"
                    )))
                }
            };
            config.0.insert(key, value);
        }
        Ok(config)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn get_as<T: FromStr>(&self, key: &str) -> Result<Option<T>, EngineError>
    where
        T::Err: error::Error + Send + Sync + 'static,
    {
        self.get(key)
            .map(|value| {
                value
                    .parse()
                    .map_err(|err| EngineError::InvalidConfigValue {
                        key: key.to_owned(),
                        value: value.to_owned(),
                        inner: DynError::from(err),
                    })
            })
            .transpose()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
