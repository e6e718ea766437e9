//! Audio bridge between the capture callback and a session's send loop.
//!
//! The audio producer runs on a thread we don't own and must never block, or
//! frames get dropped at the device. The bridge decouples its timing from the
//! async consumer: `push` appends to an unbounded ordered queue and returns
//! immediately; the consumer drains at its own pace. Memory growth is bounded
//! by session duration, which is bounded by user interaction.

use std::sync::Mutex;
use tokio::sync::mpsc;

/// One opaque buffer of 16-bit signed little-endian mono PCM at 16 kHz.
pub type AudioChunk = Vec<u8>;

/// Creates a connected bridge: the producer half and the consumer half.
pub fn channel() -> (AudioBridge, AudioReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        AudioBridge {
            tx: Mutex::new(Some(tx)),
        },
        AudioReceiver { rx },
    )
}

/// Producer half: thread-safe, non-blocking, order-preserving.
pub struct AudioBridge {
    tx: Mutex<Option<mpsc::UnboundedSender<AudioChunk>>>,
}

impl AudioBridge {
    /// Enqueues a chunk without blocking. Chunks reach the consumer in
    /// exactly the order they were pushed. After `finish()` this is a no-op.
    pub fn push(&self, chunk: AudioChunk) {
        if let Ok(guard) = self.tx.lock()
            && let Some(tx) = guard.as_ref()
        {
            // Err means the consumer is gone (session torn down) — the chunk
            // has nowhere to go and is dropped.
            tx.send(chunk).ok();
        }
    }

    /// Marks end of input. The consumer drains whatever is queued and then
    /// terminates. Safe to call more than once.
    pub fn finish(&self) {
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }
    }
}

/// Consumer half: a single ordered asynchronous drain.
pub struct AudioReceiver {
    rx: mpsc::UnboundedReceiver<AudioChunk>,
}

impl AudioReceiver {
    /// Receives the next chunk, or `None` once the bridge is finished and
    /// fully drained.
    pub async fn recv(&mut self) -> Option<AudioChunk> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_chunks_arrive_in_push_order() {
        let (bridge, mut rx) = channel();

        for i in 0..10u8 {
            bridge.push(vec![i]);
        }
        bridge.finish();

        let mut received = Vec::new();
        while let Some(chunk) = rx.recv().await {
            received.push(chunk[0]);
        }
        assert_eq!(received, (0..10).collect::<Vec<u8>>());
    }

    #[tokio::test]
    async fn test_finish_lets_consumer_drain_then_terminate() {
        let (bridge, mut rx) = channel();
        bridge.push(vec![1, 2, 3]);
        bridge.finish();

        assert_eq!(rx.recv().await, Some(vec![1, 2, 3]));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_push_after_finish_is_noop() {
        let (bridge, mut rx) = channel();
        bridge.finish();
        bridge.push(vec![9]);

        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_finish_is_idempotent() {
        let (bridge, mut rx) = channel();
        bridge.finish();
        bridge.finish();
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_push_from_external_thread_preserves_order() {
        let (bridge, mut rx) = channel();
        let bridge = std::sync::Arc::new(bridge);

        let producer = bridge.clone();
        let handle = std::thread::spawn(move || {
            for i in 0..100u8 {
                producer.push(vec![i]);
            }
            producer.finish();
        });

        let mut received = Vec::new();
        while let Some(chunk) = rx.recv().await {
            received.push(chunk[0]);
        }
        handle.join().unwrap();

        assert_eq!(received, (0..100).collect::<Vec<u8>>());
    }

    #[tokio::test]
    async fn test_push_survives_dropped_consumer() {
        let (bridge, rx) = channel();
        drop(rx);
        // Must not panic or block
        bridge.push(vec![1]);
    }
}
