//! The outbound queue stream packets cross on their way out to clients
//! (§4.5). Filled by this protocol's own receive path and, in a full
//! deployment, by sibling gateway-client protocols sharing the same
//! dispatch contract.

use std::collections::VecDeque;

use tokio::sync::Mutex;

use crate::wire::VoiceFrame;

pub struct QueuedFrame {
    pub frame: VoiceFrame,
    pub module: u8,
}

#[derive(Default)]
pub struct OutboundQueue {
    queue: Mutex<VecDeque<QueuedFrame>>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, frame: VoiceFrame, module: u8) {
        self.queue.lock().await.push_back(QueuedFrame { frame, module });
    }

    /// Drains the entire queue in FIFO order for a single `handle_queue`
    /// tick (§5: single-consumer, preserves per-stream arrival order).
    pub async fn drain(&self) -> Vec<QueuedFrame> {
        let mut queue = self.queue.lock().await;
        queue.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> VoiceFrame {
        VoiceFrame {
            stream_id: 1,
            packet_id: 0,
            is_last: false,
            ambe: [0; 9],
            dv_data: [0; 3],
            dmr_packet_id: 0,
            dmr_packet_subid: 0,
            ambe_plus: [0; 9],
            dv_sync: [0; 7],
            remote_peer_origin: false,
        }
    }

    #[tokio::test]
    async fn drains_in_fifo_order() {
        let queue = OutboundQueue::new();
        let mut first = sample_frame();
        first.stream_id = 1;
        let mut second = sample_frame();
        second.stream_id = 2;
        queue.push(first, b'A').await;
        queue.push(second, b'A').await;

        let drained = queue.drain().await;
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].frame.stream_id, 1);
        assert_eq!(drained[1].frame.stream_id, 2);
        assert!(queue.drain().await.is_empty());
    }
}
