//! A process group made of OS threads that exchange owned buffers over channels.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use log::{debug, error, trace};

use crate::comm::{Communicator, Op, VarLayout, ROOT_RANK};
use crate::error::GroupError;

enum Message {
    Data(Envelope),
    Abort { by: usize, reason: String },
}

struct Envelope {
    seq: u64,
    from: usize,
    op: Op,
    payload: Vec<u8>,
}

/// One rank's view of the group: its own mailbox and a sender for every other rank's mailbox.
///
/// An endpoint that is dropped before its rank finished, for example while unwinding from a
/// panic, aborts the group.
pub struct Endpoint {
    rank: usize,
    size: usize,
    inbox: Receiver<Message>,
    peers: Vec<Option<Sender<Message>>>,
    // Collectives issued so far. Identical on all ranks as long as they follow the protocol.
    seq: Cell<u64>,
    // Messages that arrived ahead of the collective that consumes them.
    pending: RefCell<HashMap<(u64, usize), Envelope>>,
    aborted: RefCell<Option<(usize, String)>>,
    finished: Cell<bool>,
}

impl Endpoint {
    fn begin(&self, root: usize) -> Result<u64, GroupError> {
        if let Some((by, reason)) = &*self.aborted.borrow() {
            return Err(GroupError::Aborted {
                by: *by,
                reason: reason.clone(),
            });
        }

        if root >= self.size {
            return Err(GroupError::InvalidRoot {
                root,
                size: self.size,
            });
        }

        let seq = self.seq.get();
        self.seq.set(seq + 1);
        Ok(seq)
    }

    fn others(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.size).filter(move |&peer| peer != self.rank)
    }

    fn send(&self, peer: usize, seq: u64, op: Op, payload: Vec<u8>) -> Result<(), GroupError> {
        trace!(
            "rank {} -> {peer}: {op:?} #{seq} ({} bytes)",
            self.rank,
            payload.len()
        );

        let disconnected = GroupError::Disconnected {
            rank: self.rank,
            peer,
        };
        let Some(sender) = self.peers.get(peer).and_then(Option::as_ref) else {
            return Err(disconnected);
        };

        sender
            .send(Message::Data(Envelope {
                seq,
                from: self.rank,
                op,
                payload,
            }))
            .map_err(|_| disconnected)
    }

    fn recv(&self, peer: usize, seq: u64, op: Op) -> Result<Vec<u8>, GroupError> {
        if let Some(envelope) = self.pending.borrow_mut().remove(&(seq, peer)) {
            return self.accept(envelope, op);
        }

        loop {
            match self.inbox.recv() {
                Ok(Message::Data(envelope)) if envelope.seq == seq && envelope.from == peer => {
                    return self.accept(envelope, op);
                }
                Ok(Message::Data(envelope)) => {
                    self.pending
                        .borrow_mut()
                        .insert((envelope.seq, envelope.from), envelope);
                }
                Ok(Message::Abort { by, reason }) => {
                    *self.aborted.borrow_mut() = Some((by, reason.clone()));
                    return Err(GroupError::Aborted { by, reason });
                }
                Err(_) => {
                    return Err(GroupError::Disconnected {
                        rank: self.rank,
                        peer,
                    })
                }
            }
        }
    }

    fn accept(&self, envelope: Envelope, expected: Op) -> Result<Vec<u8>, GroupError> {
        if envelope.op != expected {
            return Err(GroupError::ProtocolViolation {
                rank: self.rank,
                peer: envelope.from,
                seq: envelope.seq,
                expected,
                found: envelope.op,
            });
        }

        trace!(
            "rank {} <- {}: {:?} #{} ({} bytes)",
            self.rank,
            envelope.from,
            envelope.op,
            envelope.seq,
            envelope.payload.len()
        );

        Ok(envelope.payload)
    }

    fn check_len(
        &self,
        op: Op,
        peer: usize,
        expected: usize,
        found: usize,
    ) -> Result<(), GroupError> {
        if expected != found {
            return Err(GroupError::LengthMismatch {
                op,
                rank: self.rank,
                peer,
                expected,
                found,
            });
        }

        Ok(())
    }
}

impl Communicator for Endpoint {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) -> Result<(), GroupError> {
        let seq = self.begin(ROOT_RANK)?;

        if self.rank == ROOT_RANK {
            for peer in self.others() {
                self.recv(peer, seq, Op::Barrier)?;
            }
            for peer in self.others() {
                self.send(peer, seq, Op::Release, Vec::new())?;
            }
        } else {
            self.send(ROOT_RANK, seq, Op::Barrier, Vec::new())?;
            self.recv(ROOT_RANK, seq, Op::Release)?;
        }

        Ok(())
    }

    fn broadcast(&self, root: usize, value: Option<Vec<u8>>) -> Result<Vec<u8>, GroupError> {
        let seq = self.begin(root)?;

        if self.rank != root {
            return self.recv(root, seq, Op::Broadcast);
        }

        let value = value.ok_or(GroupError::MissingRootBuffer(Op::Broadcast))?;
        for peer in self.others() {
            self.send(peer, seq, Op::Broadcast, value.clone())?;
        }

        Ok(value)
    }

    fn scatterv(
        &self,
        root: usize,
        send: Option<(&[u8], VarLayout<'_>)>,
        recv_count: usize,
    ) -> Result<Vec<u8>, GroupError> {
        let seq = self.begin(root)?;

        if self.rank != root {
            let data = self.recv(root, seq, Op::Scatter)?;
            self.check_len(Op::Scatter, root, recv_count, data.len())?;
            return Ok(data);
        }

        let (buf, layout) = send.ok_or(GroupError::MissingRootBuffer(Op::Scatter))?;
        layout.validate(Op::Scatter, self.size, buf.len())?;

        for peer in self.others() {
            self.send(peer, seq, Op::Scatter, buf[layout.range(peer)].to_vec())?;
        }

        let own = buf[layout.range(root)].to_vec();
        self.check_len(Op::Scatter, root, recv_count, own.len())?;

        Ok(own)
    }

    fn gather(&self, root: usize, send: &[u8]) -> Result<Option<Vec<u8>>, GroupError> {
        let seq = self.begin(root)?;

        if self.rank != root {
            self.send(root, seq, Op::Gather, send.to_vec())?;
            return Ok(None);
        }

        let mut out = Vec::with_capacity(send.len() * self.size);
        for peer in 0..self.size {
            if peer == root {
                out.extend_from_slice(send);
                continue;
            }

            let part = self.recv(peer, seq, Op::Gather)?;
            self.check_len(Op::Gather, peer, send.len(), part.len())?;
            out.extend_from_slice(&part);
        }

        Ok(Some(out))
    }

    fn gatherv(
        &self,
        root: usize,
        send: &[u8],
        recv: Option<(&mut [u8], VarLayout<'_>)>,
    ) -> Result<(), GroupError> {
        let seq = self.begin(root)?;

        if self.rank != root {
            return self.send(root, seq, Op::Gatherv, send.to_vec());
        }

        let (buf, layout) = recv.ok_or(GroupError::MissingRootBuffer(Op::Gatherv))?;
        layout.validate(Op::Gatherv, self.size, buf.len())?;

        for peer in 0..self.size {
            let range = layout.range(peer);

            if peer == root {
                self.check_len(Op::Gatherv, peer, range.len(), send.len())?;
                buf[range].copy_from_slice(send);
                continue;
            }

            let part = self.recv(peer, seq, Op::Gatherv)?;
            self.check_len(Op::Gatherv, peer, range.len(), part.len())?;
            buf[range].copy_from_slice(&part);
        }

        Ok(())
    }

    fn abort(&self, reason: &str) {
        if self.aborted.borrow().is_some() {
            // Either already torn down by us or by a peer whose abort reached everybody.
            return;
        }

        error!("rank {} aborts the group: {reason}", self.rank);
        *self.aborted.borrow_mut() = Some((self.rank, reason.to_owned()));

        for peer in self.others() {
            if let Some(sender) = &self.peers[peer] {
                // A peer that already hung up does not need to be told.
                let _ = sender.send(Message::Abort {
                    by: self.rank,
                    reason: reason.to_owned(),
                });
            }
        }
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        if !self.finished.get() {
            self.abort("rank terminated without finishing");
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .field("seq", &self.seq.get())
            .finish()
    }
}

/// A group of `size` ranks, each backed by its own thread once [`LocalGroup::run`] is called.
#[derive(Debug)]
pub struct LocalGroup {
    endpoints: Vec<Endpoint>,
}

impl LocalGroup {
    pub fn new(size: usize) -> Result<Self, GroupError> {
        if size == 0 {
            return Err(GroupError::InvalidSize(size));
        }

        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| mpsc::channel()).unzip();

        let endpoints = receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| Endpoint {
                rank,
                size,
                inbox,
                // Leaving out our own sender lets the mailbox observe when all peers are gone.
                peers: senders
                    .iter()
                    .enumerate()
                    .map(|(peer, sender)| (peer != rank).then(|| sender.clone()))
                    .collect(),
                seq: Cell::new(0),
                pending: RefCell::new(HashMap::new()),
                aborted: RefCell::new(None),
                finished: Cell::new(false),
            })
            .collect();

        Ok(Self { endpoints })
    }

    pub fn size(&self) -> usize {
        self.endpoints.len()
    }

    /// Runs `f` once per rank, each on its own thread, and returns the per-rank results in rank
    /// order. A rank that returns an error aborts the group before its thread exits.
    pub fn run<F, R, E>(self, f: F) -> Vec<Result<R, E>>
    where
        F: Fn(&Endpoint) -> Result<R, E> + Sync,
        R: Send,
        E: From<GroupError> + fmt::Display + Send,
    {
        let f = &f;
        debug!("starting group of {} ranks", self.endpoints.len());

        thread::scope(|scope| {
            let handles = self
                .endpoints
                .into_iter()
                .map(|endpoint| {
                    let rank = endpoint.rank;
                    let handle = thread::Builder::new()
                        .name(format!("rank-{rank}"))
                        .spawn_scoped(scope, move || {
                            let result = f(&endpoint);
                            if let Err(err) = &result {
                                endpoint.abort(&err.to_string());
                            }
                            endpoint.finished.set(true);
                            result
                        });
                    (rank, handle)
                })
                .collect::<Vec<_>>();

            handles
                .into_iter()
                .map(|(rank, handle)| match handle {
                    Ok(handle) => handle
                        .join()
                        .unwrap_or_else(|_| Err(GroupError::RankPanicked(rank).into())),
                    Err(err) => {
                        error!("failed to spawn rank {rank}: {err}");
                        Err(GroupError::RankPanicked(rank).into())
                    }
                })
                .collect()
        })
    }
}
