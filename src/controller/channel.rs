//! Data Channel
//!
//! The boundary to the transport layer during the data phase. The session
//! layer that owns the connection implements [`BlockChannel`]; the controller
//! only pulls received blocks and pushes blocks to send.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::runner::{StepStatus, TransferRecord};

/// Block-level view of a peer connection
#[async_trait]
pub trait BlockChannel: Send {
    /// Next block from the peer. `None` once the peer has sent the last one.
    async fn receive(&mut self) -> Result<Option<Vec<u8>>, StepStatus>;

    /// Send the block at `rank` to the peer
    async fn send(&mut self, rank: u64, block: &[u8]) -> Result<(), StepStatus>;
}

/// Opens a connection for a transfer picked up by the recovery worker
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    async fn open(&self, record: &TransferRecord) -> Result<Box<dyn BlockChannel>, StepStatus>;
}

/// Provider for a node running without a network layer
pub struct NoTransport;

#[async_trait]
impl ChannelProvider for NoTransport {
    async fn open(&self, _record: &TransferRecord) -> Result<Box<dyn BlockChannel>, StepStatus> {
        Err(StepStatus::ConnectionImpossible)
    }
}

/// In-process channel over tokio mpsc queues
pub struct MpscChannel {
    incoming: mpsc::Receiver<Vec<u8>>,
    outgoing: mpsc::Sender<(u64, Vec<u8>)>,
}

/// The far side of an [`MpscChannel`]
pub struct MpscPeer {
    /// Blocks delivered to the local receiver. Dropping it ends the file.
    pub blocks: mpsc::Sender<Vec<u8>>,
    /// Blocks the local sender pushed, with their rank
    pub sent: mpsc::Receiver<(u64, Vec<u8>)>,
}

impl MpscChannel {
    pub fn pair(capacity: usize) -> (MpscChannel, MpscPeer) {
        let (blocks_tx, blocks_rx) = mpsc::channel(capacity);
        let (sent_tx, sent_rx) = mpsc::channel(capacity);
        (
            MpscChannel {
                incoming: blocks_rx,
                outgoing: sent_tx,
            },
            MpscPeer {
                blocks: blocks_tx,
                sent: sent_rx,
            },
        )
    }
}

#[async_trait]
impl BlockChannel for MpscChannel {
    async fn receive(&mut self) -> Result<Option<Vec<u8>>, StepStatus> {
        Ok(self.incoming.recv().await)
    }

    async fn send(&mut self, rank: u64, block: &[u8]) -> Result<(), StepStatus> {
        self.outgoing
            .send((rank, block.to_vec()))
            .await
            .map_err(|_| StepStatus::Disconnection)
    }
}
