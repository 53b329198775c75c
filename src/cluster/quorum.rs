use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::debug;

use crate::cluster::mailbox::Mailbox;
use crate::config::Config;
use crate::error::RpcError;
use crate::message::{Envelope, Request, Response};
use crate::NodeId;

/// How many replies a broadcast waits for: half of the peer directory,
/// rounded down. The coordinator's own vote is applied locally and is not
/// counted here, so a three-replica cluster (directory of two) needs one
/// external reply.
pub fn quorum_size(peer_count: usize) -> usize {
    peer_count / 2
}

/// Sends `envelope` to every peer and returns the first quorum of replies.
///
/// Each peer gets its own task with its own deadlines, so the wait is
/// bounded even when fewer than a quorum of peers are reachable; once
/// every outstanding attempt has failed or timed out the collected replies
/// are returned as-is. Replies arriving after completion are dropped.
pub async fn broadcast(
    envelope: Envelope,
    peers: &HashMap<NodeId, Arc<Mailbox>>,
    config: &Config,
) -> Vec<Response> {
    let quorum = quorum_size(peers.len());
    debug!(
        origin = envelope.origin,
        key = %envelope.key,
        peers = peers.len(),
        quorum,
        "starting broadcast"
    );

    let mut tasks = FuturesUnordered::new();
    for (&peer_id, mailbox) in peers {
        let envelope = envelope.clone();
        let mailbox = Arc::clone(mailbox);
        let send_timeout = config.rpc_timeout;
        let reply_timeout = config.reply_timeout();
        tasks.push(tokio::spawn(async move {
            match dispatch(envelope, peer_id, &mailbox, send_timeout, reply_timeout).await {
                Ok(response) => Some(response),
                Err(err) => {
                    debug!(peer = peer_id, %err, "no reply for this broadcast");
                    None
                }
            }
        }));
    }

    let mut responses = Vec::new();
    while responses.len() < quorum {
        match tasks.next().await {
            Some(Ok(Some(response))) => responses.push(response),
            // A failed attempt contributes nothing; keep draining.
            Some(_) => continue,
            // Every attempt has resolved: proceed with what arrived.
            None => break,
        }
    }
    responses
}

// One attempt against one peer: enqueue the request, then wait for the
// single-shot reply.
async fn dispatch(
    envelope: Envelope,
    peer_id: NodeId,
    mailbox: &Mailbox,
    send_timeout: Duration,
    reply_timeout: Duration,
) -> Result<Response, RpcError> {
    let sender = mailbox.sender().ok_or(RpcError::PeerDown(peer_id))?;

    let (reply_tx, reply_rx) = oneshot::channel();
    let request = Request {
        envelope,
        reply: reply_tx,
    };
    match timeout(send_timeout, sender.send(request)).await {
        Ok(Ok(())) => {}
        // The queue closed underneath us.
        Ok(Err(_)) => return Err(RpcError::PeerDown(peer_id)),
        // The queue stayed full for the whole bounded wait.
        Err(_) => return Err(RpcError::Timeout(peer_id)),
    }

    match timeout(reply_timeout, reply_rx).await {
        Ok(Ok(response)) => Ok(response),
        // The server dropped the reply handle without answering.
        Ok(Err(_)) => Err(RpcError::PeerDown(peer_id)),
        Err(_) => Err(RpcError::Timeout(peer_id)),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::message::Command;

    fn read_envelope() -> Envelope {
        Envelope {
            origin: 0,
            key: "k".to_owned(),
            command: Command::Read,
        }
    }

    fn fast_config() -> Config {
        Config {
            rpc_timeout: Duration::from_millis(20),
            ..Config::default()
        }
    }

    #[test]
    fn quorum_sizes() {
        assert_eq!(quorum_size(0), 0);
        assert_eq!(quorum_size(1), 0);
        assert_eq!(quorum_size(2), 1);
        assert_eq!(quorum_size(4), 2);
        assert_eq!(quorum_size(5), 2);
    }

    #[tokio::test]
    async fn empty_directory_returns_immediately() {
        let responses = broadcast(read_envelope(), &HashMap::new(), &fast_config()).await;
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn down_peers_resolve_quickly() {
        // Two closed mailboxes: both attempts fail fast, the broadcast
        // returns degraded well inside the reply deadline.
        let mut peers = HashMap::new();
        peers.insert(1, Arc::new(Mailbox::default()));
        peers.insert(2, Arc::new(Mailbox::default()));

        let started = Instant::now();
        let responses = broadcast(read_envelope(), &peers, &fast_config()).await;
        assert!(responses.is_empty());
        assert!(started.elapsed() < fast_config().reply_timeout());
    }

    #[tokio::test]
    async fn unserved_queue_times_out() {
        // One live queue nobody drains plus one down peer, so a reply is
        // needed for quorum: the broadcast must end at the reply deadline,
        // not hang.
        let config = fast_config();
        let mailbox = Arc::new(Mailbox::default());
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        mailbox.install(tx);

        let mut peers = HashMap::new();
        peers.insert(1, Arc::clone(&mailbox));
        peers.insert(2, Arc::new(Mailbox::default()));

        let started = Instant::now();
        let responses = broadcast(read_envelope(), &peers, &config).await;
        assert!(responses.is_empty());
        assert!(started.elapsed() >= config.reply_timeout());
        assert!(started.elapsed() < config.reply_timeout() * 4);
    }
}
