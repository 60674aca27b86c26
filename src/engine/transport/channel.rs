// Copyright © 2024 Pathway

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::debug;

use super::MessageManager;
use crate::engine::error::{Error, Result};
use crate::engine::graph::{Fid, MAX_FRAGMENTS};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared flag raised when any worker of a computation fails.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct Packet {
    superstep: u64,
    from: Fid,
    payload: Vec<u8>,
}

/// In-process transport connecting worker threads with unbounded channels.
///
/// Message batches and gather payloads travel on separate channels so that
/// the two barriers of a superstep can't steal each other's packets.
#[derive(Debug)]
pub struct ChannelMessageManager {
    fid: Fid,
    message_senders: Vec<Sender<Packet>>,
    message_receiver: Receiver<Packet>,
    gather_senders: Vec<Sender<Packet>>,
    gather_receiver: Receiver<Packet>,
    abort: AbortSignal,
}

/// Builds a fully connected mesh of `fnum` transports, one per worker,
/// sharing one abort signal.
pub fn channel_mesh(fnum: usize) -> Result<(Vec<ChannelMessageManager>, AbortSignal)> {
    if fnum == 0 || fnum > MAX_FRAGMENTS {
        return Err(Error::InvalidFragment(fnum));
    }
    let abort = AbortSignal::new();
    let (message_senders, message_receivers): (Vec<_>, Vec<_>) =
        (0..fnum).map(|_| unbounded()).unzip();
    let (gather_senders, gather_receivers): (Vec<_>, Vec<_>) =
        (0..fnum).map(|_| unbounded()).unzip();
    let managers = message_receivers
        .into_iter()
        .zip(gather_receivers)
        .enumerate()
        .map(|(fid, (message_receiver, gather_receiver))| ChannelMessageManager {
            fid,
            message_senders: message_senders.clone(),
            message_receiver,
            gather_senders: gather_senders.clone(),
            gather_receiver,
            abort: abort.clone(),
        })
        .collect();
    Ok((managers, abort))
}

impl ChannelMessageManager {
    pub fn abort_signal(&self) -> &AbortSignal {
        &self.abort
    }

    fn send(&self, senders: &[Sender<Packet>], to: Fid, superstep: u64, payload: Vec<u8>) -> Result<()> {
        let packet = Packet {
            superstep,
            from: self.fid,
            payload,
        };
        senders[to].send(packet).map_err(|_| {
            if self.abort.is_raised() {
                Error::Aborted
            } else {
                Error::Transport(format!("worker {to} hung up"))
            }
        })
    }

    /// Collects one packet from every peer, filling `slots` by sender.
    fn receive(
        &self,
        receiver: &Receiver<Packet>,
        superstep: u64,
        slots: &mut [Option<Vec<u8>>],
    ) -> Result<()> {
        let mut pending = slots.iter().filter(|slot| slot.is_none()).count();
        while pending > 0 {
            if self.abort.is_raised() {
                return Err(Error::Aborted);
            }
            let packet = match receiver.recv_timeout(POLL_INTERVAL) {
                Ok(packet) => packet,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(if self.abort.is_raised() {
                        Error::Aborted
                    } else {
                        Error::Transport("all peers hung up".to_owned())
                    })
                }
            };
            if packet.superstep != superstep {
                return Err(Error::SuperstepMismatch {
                    expected: superstep,
                    actual: packet.superstep,
                    from: packet.from,
                });
            }
            let slot = slots
                .get_mut(packet.from)
                .ok_or(Error::InvalidFragment(packet.from))?;
            if slot.is_some() {
                return Err(Error::Transport(format!(
                    "worker {} sent twice in superstep {superstep}",
                    packet.from
                )));
            }
            *slot = Some(packet.payload);
            pending -= 1;
        }
        Ok(())
    }
}

impl MessageManager for ChannelMessageManager {
    fn fid(&self) -> Fid {
        self.fid
    }

    fn fnum(&self) -> usize {
        self.message_senders.len()
    }

    fn exchange(&mut self, superstep: u64, batches: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>> {
        if batches.len() != self.fnum() {
            return Err(Error::Transport(format!(
                "expected {} batches, got {}",
                self.fnum(),
                batches.len()
            )));
        }
        for (to, batch) in batches.into_iter().enumerate() {
            if to != self.fid {
                self.send(&self.message_senders, to, superstep, batch)?;
            }
        }
        let mut slots = vec![None; self.fnum()];
        slots[self.fid] = Some(Vec::new());
        self.receive(&self.message_receiver, superstep, &mut slots)?;
        debug!("worker {} finished exchange of superstep {superstep}", self.fid);
        Ok(slots.into_iter().map(Option::unwrap_or_default).collect())
    }

    fn all_gather(&mut self, superstep: u64, payload: Vec<u8>) -> Result<Vec<Vec<u8>>> {
        for to in 0..self.fnum() {
            if to != self.fid {
                self.send(&self.gather_senders, to, superstep, payload.clone())?;
            }
        }
        let mut slots = vec![None; self.fnum()];
        slots[self.fid] = Some(payload);
        self.receive(&self.gather_receiver, superstep, &mut slots)?;
        Ok(slots.into_iter().map(Option::unwrap_or_default).collect())
    }

    fn abort(&self) {
        self.abort.raise();
    }
}
