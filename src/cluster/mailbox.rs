use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::message::Request;

/// Stable address of one node's inbound queue.
///
/// Restarting a node replaces its queue; anyone holding the mailbox always
/// reaches the current one. Peer directories hold mailboxes rather than
/// node handles, which keeps the cluster's reference graph acyclic. While
/// the node is down the slot is empty and sends fail immediately.
#[derive(Debug, Default)]
pub struct Mailbox {
    slot: Mutex<Option<mpsc::Sender<Request>>>,
}

impl Mailbox {
    /// A handle on the current queue, or `None` while the node is down.
    pub fn sender(&self) -> Option<mpsc::Sender<Request>> {
        self.slot.lock().clone()
    }

    pub fn install(&self, tx: mpsc::Sender<Request>) {
        *self.slot.lock() = Some(tx);
    }

    pub fn close(&self) {
        self.slot.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_mailbox_has_no_sender() {
        let mailbox = Mailbox::default();
        assert!(mailbox.sender().is_none());

        let (tx, _rx) = mpsc::channel(1);
        mailbox.install(tx);
        assert!(mailbox.sender().is_some());

        mailbox.close();
        assert!(mailbox.sender().is_none());
    }
}
