use thiserror::Error;

use crate::NodeId;

/// Lifecycle errors surfaced to embedders.
///
/// The quorum operations themselves are infallible: a node that cannot
/// reach a quorum proceeds with whatever replies arrived, and callers
/// retry at the application layer if they need stronger guarantees.
#[derive(Debug, Error)]
pub enum Error {
    #[error("node {0} is already running")]
    AlreadyRunning(NodeId),

    #[error("node {0} is not running")]
    NotRunning(NodeId),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a single outgoing RPC produced no reply. Recovered locally by the
/// dispatch task; the peer simply contributes nothing to the quorum.
#[derive(Debug, Error)]
pub(crate) enum RpcError {
    /// The peer's queue is closed or was never opened.
    #[error("node {0} is down")]
    PeerDown(NodeId),

    /// The request was enqueued but no reply arrived in time.
    #[error("no reply from node {0} in time")]
    Timeout(NodeId),
}
