//! Routing of messages produced during one superstep.
//!
//! Messages for inner vertices never leave the worker; they land in the
//! next inbox directly. Everything addressed to a ghost vertex or to a gid
//! of another fragment is grouped per destination, combined, and encoded
//! into one batch per peer fragment.

use std::collections::BTreeMap;
use std::mem::take;

use bincode::{deserialize, serialize};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::combiner::Combiner;
use super::context::Target;
use super::error::{Error, Result};
use super::graph::{Fid, Fragment, Gid};

/// Outcome of a flush: encoded batches indexed by destination fragment,
/// with an empty slot for this fragment, and the number of messages queued
/// after combining.
#[derive(Debug)]
pub(crate) struct Flushed {
    pub(crate) batches: Vec<Vec<u8>>,
    pub(crate) sent: u64,
}

pub(crate) struct Mailbox<MD> {
    remote: BTreeMap<Gid, Vec<MD>>,
}

impl<MD> Mailbox<MD>
where
    MD: Serialize + DeserializeOwned,
{
    pub(crate) fn new() -> Self {
        Self {
            remote: BTreeMap::new(),
        }
    }

    /// Distributes `outbox` into `next_inbox` and per-peer batches.
    pub(crate) fn flush(
        &mut self,
        fragment: &dyn Fragment,
        combiner: Option<&dyn Combiner<MD>>,
        outbox: Vec<(Target, MD)>,
        next_inbox: &mut [Vec<MD>],
    ) -> Result<Flushed> {
        for (target, message) in outbox {
            match target {
                Target::Local(v) if fragment.is_inner_vertex(v) => {
                    next_inbox[v.index()].push(message);
                }
                Target::Local(v) => {
                    let gid = fragment.vertex_to_gid(v);
                    self.remote.entry(gid).or_default().push(message);
                }
                Target::Remote(gid) => {
                    self.remote.entry(gid).or_default().push(message);
                }
            }
        }

        let mut sent = 0;
        if let Some(combiner) = combiner {
            for messages in next_inbox.iter_mut() {
                if !messages.is_empty() {
                    let combined = combiner.combine(take(messages)).map_err(Error::Combiner)?;
                    messages.push(combined);
                }
            }
        }
        sent += next_inbox.iter().map(Vec::len).sum::<usize>() as u64;

        let mut outgoing: Vec<Vec<(Gid, MD)>> = (0..fragment.fnum()).map(|_| Vec::new()).collect();
        for (gid, messages) in take(&mut self.remote) {
            let batch = outgoing
                .get_mut(gid.fid())
                .ok_or(Error::UnknownVertex(gid))?;
            match combiner {
                Some(combiner) => {
                    batch.push((gid, combiner.combine(messages).map_err(Error::Combiner)?));
                }
                None => batch.extend(messages.into_iter().map(|message| (gid, message))),
            }
        }

        let own = fragment.fid();
        let batches = outgoing
            .into_iter()
            .enumerate()
            .map(|(fid, batch)| {
                sent += batch.len() as u64;
                if fid == own {
                    debug_assert!(batch.is_empty());
                    Ok(Vec::new())
                } else {
                    serialize(&batch).map_err(Error::Serialization)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Flushed { batches, sent })
    }
}

/// Decodes a batch received from `from` into the inbox of the addressed
/// inner vertices. Returns the number of delivered messages.
pub(crate) fn deliver<MD: DeserializeOwned>(
    fragment: &dyn Fragment,
    from: Fid,
    bytes: &[u8],
    next_inbox: &mut [Vec<MD>],
) -> Result<usize> {
    if bytes.is_empty() {
        return Ok(0);
    }
    let batch: Vec<(Gid, MD)> = deserialize(bytes).map_err(Error::MalformedMessages)?;
    let delivered = batch.len();
    for (gid, message) in batch {
        let v = fragment
            .gid_to_vertex(gid)
            .filter(|v| fragment.is_inner_vertex(*v))
            .ok_or(Error::UnknownVertex(gid))?;
        next_inbox[v.index()].push(message);
    }
    log::trace!(
        "fragment {} received {delivered} messages from {from}",
        fragment.fid()
    );
    Ok(delivered)
}
