//! One replica: the server loop plus the client-facing quorum coordinator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout;
use tracing::debug;

use crate::cluster::mailbox::Mailbox;
use crate::cluster::quorum::broadcast;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::message::{Command, Envelope, Request, Response};
use crate::store::{LamportClock, Store, Value};
use crate::NodeId;

/// Handle to one replica.
///
/// Clones share the underlying replica, so the embedder can keep one
/// handle while registering others in peer directories. A node starts out
/// stopped; its store and write-timestamp counter live as long as any
/// handle does and survive stop/start cycles.
#[derive(Debug, Clone)]
pub struct Node {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    id: NodeId,
    config: Config,
    running: AtomicBool,
    clock: LamportClock,
    store: Store,
    /// This node's own address; peers reach the current queue through it.
    mailbox: Arc<Mailbox>,
    /// id -> mailbox of every other replica, installed by `start`.
    peers: RwLock<HashMap<NodeId, Arc<Mailbox>>>,
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        Self::with_config(id, Config::default())
    }

    pub fn with_config(id: NodeId, config: Config) -> Self {
        Node {
            inner: Arc::new(Inner {
                id,
                config,
                running: AtomicBool::new(false),
                clock: LamportClock::new(),
                store: Store::new(id),
                mailbox: Arc::new(Mailbox::default()),
                peers: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Brings the node online: records the peer directory, opens a fresh
    /// inbound queue and spawns the server loop. Entries under the node's
    /// own id are ignored; the directory should hold the *other* replicas.
    ///
    /// Errors with [`Error::AlreadyRunning`] if the node is already up.
    pub async fn start(&self, peers: &HashMap<NodeId, Node>) -> Result<()> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyRunning(self.inner.id));
        }

        let directory: HashMap<NodeId, Arc<Mailbox>> = peers
            .iter()
            .filter(|(id, _)| **id != self.inner.id)
            .map(|(id, node)| (*id, Arc::clone(&node.inner.mailbox)))
            .collect();
        *self.inner.peers.write().await = directory;

        let (tx, rx) = mpsc::channel(self.inner.config.queue_capacity);
        self.inner.mailbox.install(tx);
        tokio::spawn(serve(Arc::clone(&self.inner), rx));
        debug!(node = self.inner.id, "started");
        Ok(())
    }

    /// Takes the node offline. The inbound queue closes and the server
    /// loop exits within one poll interval; requests it already dequeued
    /// may still be answered. To everyone else this node is now down.
    ///
    /// Errors with [`Error::NotRunning`] if the node is already stopped.
    pub fn stop(&self) -> Result<()> {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return Err(Error::NotRunning(self.inner.id));
        }
        self.inner.mailbox.close();
        debug!(node = self.inner.id, "stopped");
        Ok(())
    }

    /// Writes `value` under `key`.
    ///
    /// Runs the two-phase protocol: a read quorum establishes the highest
    /// timestamp in circulation, the write is stamped strictly above it,
    /// applied locally and then pushed to a write quorum. Returns once the
    /// write quorum acknowledges, or after the bounded per-peer waits
    /// expire in a degraded cluster.
    pub async fn put(&self, key: &str, value: &str) {
        let inner = &self.inner;
        let peers = inner.peers.read().await.clone();

        let reads = broadcast(
            Envelope {
                origin: inner.id,
                key: key.to_owned(),
                command: Command::Read,
            },
            &peers,
            &inner.config,
        )
        .await;

        let observed = reads
            .iter()
            .filter_map(|response| response.value.as_ref())
            .map(|value| value.ts)
            .max()
            .unwrap_or(0);
        let value = Value::new(value, inner.clock.tick(observed));
        inner.store.apply(key, value.clone(), inner.id).await;

        broadcast(
            Envelope {
                origin: inner.id,
                key: key.to_owned(),
                command: Command::Write { value },
            },
            &peers,
            &inner.config,
        )
        .await;
    }

    /// Reads the value under `key`.
    ///
    /// Collects a read quorum, picks the freshest value among the replies
    /// and the local one under the `(ts, id)` order, repairs the local
    /// store, then writes the winner back to a write quorum (preserving
    /// its timestamp) so later readers see at least this value. Keys never
    /// written anywhere visible read back as the empty string.
    pub async fn get(&self, key: &str) -> String {
        let inner = &self.inner;
        let peers = inner.peers.read().await.clone();

        let reads = broadcast(
            Envelope {
                origin: inner.id,
                key: key.to_owned(),
                command: Command::Read,
            },
            &peers,
            &inner.config,
        )
        .await;

        let mut freshest = inner.store.get(key).await.unwrap_or_default();
        let mut holder = inner.id;
        for response in &reads {
            if let Some(value) = &response.value {
                if value.is_newer_than(response.node_id, &freshest, holder) {
                    freshest = value.clone();
                    holder = response.node_id;
                }
            }
        }
        inner.store.apply(key, freshest.clone(), holder).await;

        broadcast(
            Envelope {
                origin: inner.id,
                key: key.to_owned(),
                command: Command::Write {
                    value: freshest.clone(),
                },
            },
            &peers,
            &inner.config,
        )
        .await;

        freshest.data
    }

    /// The locally stored value, bypassing the quorum protocol. Useful for
    /// inspecting replica state; a key this replica has never heard of is
    /// `None`.
    pub async fn local_value(&self, key: &str) -> Option<Value> {
        self.inner.store.get(key).await
    }

    /// The node's current write timestamp.
    pub fn write_timestamp(&self) -> u64 {
        self.inner.clock.now()
    }
}

/// Drains the inbound queue until the node stops or the queue closes. The
/// bounded wait keeps the loop re-checking the running flag even when no
/// requests arrive, so a stopped node exits within one poll interval.
async fn serve(inner: Arc<Inner>, mut rx: mpsc::Receiver<Request>) {
    while inner.running.load(Ordering::SeqCst) {
        let request = match timeout(inner.config.rpc_timeout, rx.recv()).await {
            Ok(Some(request)) => request,
            // Queue closed: this lifecycle is over.
            Ok(None) => break,
            // Poll interval elapsed; re-check the running flag.
            Err(_) => continue,
        };

        let Request { envelope, reply } = request;
        debug!(
            node = inner.id,
            origin = envelope.origin,
            key = %envelope.key,
            "received request"
        );

        let response = match envelope.command {
            Command::Read => {
                let value = inner.store.get(&envelope.key).await.unwrap_or_default();
                Response {
                    node_id: inner.id,
                    value: Some(value),
                }
            }
            Command::Write { value } => {
                let applied = inner.store.apply(&envelope.key, value, envelope.origin).await;
                if !applied {
                    debug!(node = inner.id, key = %envelope.key, "dropped stale write");
                }
                Response {
                    node_id: inner.id,
                    value: None,
                }
            }
        };

        // The coordinator may already have its quorum and be gone.
        let _ = reply.send(response);
    }
    debug!(node = inner.id, "server loop exited");
}
