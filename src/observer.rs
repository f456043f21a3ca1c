//! Observer interface for graph outputs.
//!
//! A session fans its engine's emissions out to a single observer. The observer is *not* owned by
//! the session: only a [`Weak`](std::sync::Weak) reference is stored, so dropping the observer is
//! all the teardown a consumer ever needs; emissions after that are silently discarded.

use std::sync::Mutex;

use crate::{frame::VideoFrame, packet::Packet};

/// Receiver of asynchronous graph results.
///
/// Callbacks are invoked on the session's dispatch context, not on the thread that submitted the
/// frame. Implementations should hand data off quickly; a slow callback stalls delivery (and
/// eventually frame intake) for the whole session.
pub trait TrackerObserver: Send + Sync {
    /// Called for every packet the graph produces, tagged with its source stream.
    ///
    /// Packets on the same stream arrive with non-decreasing timestamps. No ordering holds
    /// between different streams.
    fn on_packet(&self, packet: &Packet, stream: &str);

    /// Called with the processed video frame, when frame output was enabled.
    fn on_frame(&self, frame: &VideoFrame) {
        let _ = frame;
    }

    /// Called at most once per session when the engine reports a persistent internal failure.
    ///
    /// Per-frame hiccups are logged, not escalated; only the first engine error reaches this
    /// callback.
    fn on_error(&self, error: &anyhow::Error) {
        let _ = error;
    }
}

/// Packets produced by different streams for the same input frame, keyed by stream name.
///
/// Streams of one graph typically emit results for the same input at the same graph timestamp;
/// a batch collects them back together.
#[derive(Debug)]
pub struct PacketBatch {
    timestamp_us: i64,
    packets: Vec<(String, Packet)>,
}

impl PacketBatch {
    fn new(timestamp_us: i64) -> Self {
        Self {
            timestamp_us,
            packets: Vec::new(),
        }
    }

    /// Returns the graph timestamp shared by all packets in this batch.
    #[inline]
    pub fn timestamp_us(&self) -> i64 {
        self.timestamp_us
    }

    /// Returns the packet the stream named `stream` produced, if any.
    pub fn get(&self, stream: &str) -> Option<&Packet> {
        self.packets
            .iter()
            .find(|(name, _)| name == stream)
            .map(|(_, packet)| packet)
    }

    /// Returns an iterator over `(stream name, packet)` pairs, in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Packet)> {
        self.packets
            .iter()
            .map(|(name, packet)| (name.as_str(), packet))
    }

    /// Returns the number of streams that contributed a packet.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    fn insert(&mut self, stream: &str, packet: Packet) {
        match self.packets.iter_mut().find(|(name, _)| name == stream) {
            // A stream emitting twice at one timestamp keeps the latest packet.
            Some((_, slot)) => *slot = packet,
            None => self.packets.push((stream.to_string(), packet)),
        }
    }
}

/// Observer adapter that regroups per-stream packets into per-timestamp batches.
///
/// The graph emits each stream's result separately even though they describe the same input
/// frame. `PacketBatcher` collects consecutive packets that share a timestamp and invokes the
/// handler once per completed batch. A batch completes when a packet with a *different*
/// timestamp arrives, or when the batcher is dropped.
pub struct PacketBatcher {
    handler: Box<dyn Fn(PacketBatch) + Send + Sync>,
    current: Mutex<Option<PacketBatch>>,
}

impl PacketBatcher {
    /// Creates a batcher that passes completed batches to `handler`.
    pub fn new(handler: impl Fn(PacketBatch) + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            current: Mutex::new(None),
        }
    }

    /// Completes the in-progress batch, if any, and hands it to the handler.
    pub fn flush(&self) {
        let batch = self.current.lock().unwrap().take();
        if let Some(batch) = batch {
            (self.handler)(batch);
        }
    }
}

impl TrackerObserver for PacketBatcher {
    fn on_packet(&self, packet: &Packet, stream: &str) {
        let finished = {
            let mut current = self.current.lock().unwrap();
            let timestamp_changed = current
                .as_ref()
                .map_or(false, |batch| batch.timestamp_us() != packet.timestamp_us());
            let finished = if timestamp_changed { current.take() } else { None };
            current
                .get_or_insert_with(|| PacketBatch::new(packet.timestamp_us()))
                .insert(stream, packet.clone());
            finished
        };

        // Invoke the handler outside the lock; it may take its time.
        if let Some(batch) = finished {
            (self.handler)(batch);
        }
    }
}

impl Drop for PacketBatcher {
    fn drop(&mut self) {
        let batch = self.current.get_mut().unwrap().take();
        if let Some(batch) = batch {
            (self.handler)(batch);
        }
    }
}
