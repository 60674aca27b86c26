//! Byte-level communication between the workers of one computation.
//!
//! Every superstep performs exactly one [`MessageManager::exchange`]
//! followed by exactly one [`MessageManager::all_gather`]; both are
//! barriers over all workers.

pub mod channel;

pub use channel::{channel_mesh, AbortSignal, ChannelMessageManager};

use super::error::{Error, Result};
use super::graph::Fid;

pub trait MessageManager: Send {
    fn fid(&self) -> Fid;

    fn fnum(&self) -> usize;

    /// Sends `batches[fid]` to every peer `fid` and returns what each peer
    /// sent here, indexed by sender. The own slot is ignored on input and
    /// empty on output.
    fn exchange(&mut self, superstep: u64, batches: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>>;

    /// Returns the payloads of all workers, this one included, in fragment
    /// id order.
    fn all_gather(&mut self, superstep: u64, payload: Vec<u8>) -> Result<Vec<Vec<u8>>>;

    /// Makes every blocked or future call on any peer fail with
    /// [`Error::Aborted`].
    fn abort(&self);
}

/// Transport of a single-worker computation.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalMessageManager;

impl LocalMessageManager {
    pub fn new() -> Self {
        Self
    }
}

impl MessageManager for LocalMessageManager {
    fn fid(&self) -> Fid {
        0
    }

    fn fnum(&self) -> usize {
        1
    }

    fn exchange(&mut self, _superstep: u64, batches: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>> {
        if batches.len() != 1 {
            return Err(Error::Transport(format!(
                "expected a single batch, got {}",
                batches.len()
            )));
        }
        Ok(vec![Vec::new()])
    }

    fn all_gather(&mut self, _superstep: u64, payload: Vec<u8>) -> Result<Vec<Vec<u8>>> {
        Ok(vec![payload])
    }

    fn abort(&self) {}
}
