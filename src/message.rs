//! READ/WRITE RPCs exchanged between replicas.
//!
//! [`Envelope`] is the portion a networked transport would serialize. The
//! in-process transport pairs it with a one-shot reply handle; a wire
//! transport would carry a correlation id instead and route the
//! [`Response`] back itself.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::store::Value;
use crate::NodeId;

/// What the sender wants done with the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    /// Report the locally stored value.
    Read,
    /// Apply the value if it is newer than the locally stored one.
    Write { value: Value },
}

/// One request as it travels between replicas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// The node that originated the request.
    pub origin: NodeId,
    pub key: String,
    pub command: Command,
}

/// An [`Envelope`] plus the reply handle for the in-process transport.
#[derive(Debug)]
pub struct Request {
    pub envelope: Envelope,
    pub reply: oneshot::Sender<Response>,
}

/// A replica's answer to a single request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// The responding replica.
    pub node_id: NodeId,
    /// The responder's value for a READ; `None` acknowledges a WRITE.
    pub value: Option<Value>,
}
