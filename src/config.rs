use std::time::Duration;

/// Per-node tunables. The defaults are the constants the protocol is
/// normally run with; tests shrink the timeout to speed up fault
/// injection.
#[derive(Debug, Clone)]
pub struct Config {
    /// Capacity of the inbound request queue.
    pub queue_capacity: usize,

    /// Server poll interval. Outgoing RPCs wait up to twice this for a
    /// reply, and up to once this to enqueue on a busy peer.
    pub rpc_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            queue_capacity: 100,
            rpc_timeout: Duration::from_millis(100),
        }
    }
}

impl Config {
    /// Upper bound on waiting for a single RPC reply.
    pub fn reply_timeout(&self) -> Duration {
        self.rpc_timeout * 2
    }
}
