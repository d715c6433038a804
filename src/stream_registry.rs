//! Maps stream-id → open stream, detects duplicate headers, and times out
//! idle streams.

use std::collections::HashMap;
use std::sync::Weak;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::client::Client;
use crate::registry::ClientHandle;

/// One active voice transmission, uniquely keyed by a 16-bit stream-id.
///
/// Holds only a [`Weak`] handle to its owning client (§9): if the client
/// is removed from the registry while the stream is still open, the next
/// `upgrade()` fails and the stream is treated as orphaned.
pub struct Stream {
    stream_id: u16,
    owning_client: Weak<RwLock<Client>>,
    module: u8,
    last_packet_at: Instant,
}

impl Stream {
    pub fn stream_id(&self) -> u16 {
        self.stream_id
    }

    pub fn module(&self) -> u8 {
        self.module
    }

    pub fn owning_client(&self) -> Option<ClientHandle> {
        self.owning_client.upgrade()
    }

    pub fn tickle(&mut self) {
        self.last_packet_at = Instant::now();
    }

    fn is_idle(&self, timeout: Duration) -> bool {
        self.last_packet_at.elapsed() > timeout
    }
}

#[derive(Default)]
pub struct StreamRegistry {
    streams: HashMap<u16, Stream>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stream_id: u16) -> Option<&Stream> {
        self.streams.get(&stream_id)
    }

    pub fn tickle(&mut self, stream_id: u16) -> bool {
        match self.streams.get_mut(&stream_id) {
            Some(stream) => {
                stream.tickle();
                true
            }
            None => false,
        }
    }

    /// Opens a new stream. Fails (returns `false`) if `stream_id` is
    /// already live; the caller should `tickle()` instead in that case.
    pub fn open_stream(&mut self, stream_id: u16, module: u8, owning_client: &ClientHandle) -> bool {
        if self.streams.contains_key(&stream_id) {
            return false;
        }
        self.streams.insert(
            stream_id,
            Stream {
                stream_id,
                owning_client: std::sync::Arc::downgrade(owning_client),
                module,
                last_packet_at: Instant::now(),
            },
        );
        true
    }

    pub fn close(&mut self, stream_id: u16) -> Option<Stream> {
        self.streams.remove(&stream_id)
    }

    /// Closes every stream idle beyond `timeout`, returning the closed
    /// stream ids so the caller can release each owning client's master
    /// flag without holding the stream-registry lock while doing so.
    pub fn close_timed_out(&mut self, timeout: Duration) -> Vec<(u16, Option<ClientHandle>)> {
        let expired: Vec<u16> = self
            .streams
            .iter()
            .filter(|(_, s)| s.is_idle(timeout))
            .map(|(id, _)| *id)
            .collect();

        expired
            .into_iter()
            .map(|id| {
                let stream = self.streams.remove(&id).expect("just observed as present");
                (id, stream.owning_client())
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
