//! Result packets emitted by the graph.

use std::{fmt, sync::Arc, time::SystemTime};

/// An immutable result envelope produced on one of the graph's output streams.
///
/// A packet carries zero or more opaque serialized payload blobs, tagged with the name of the
/// schema they follow. Decoding the blobs into structured landmark data is left to the observer;
/// the session only moves packets around.
///
/// Packets on the same stream are delivered with non-decreasing [`timestamp_us`]. The wall-clock
/// [`date`] is derived when the packet is constructed and is informational only, never used for
/// ordering.
///
/// [`timestamp_us`]: Self::timestamp_us
/// [`date`]: Self::date
#[derive(Clone)]
pub struct Packet {
    type_name: String,
    timestamp_us: i64,
    date: SystemTime,
    payloads: Vec<Arc<[u8]>>,
}

impl Packet {
    /// Creates a packet holding `payloads`, produced at `timestamp_us` on the graph clock.
    ///
    /// The wall-clock date is captured at the time of the call.
    pub fn new<S, I, P>(type_name: S, timestamp_us: i64, payloads: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = P>,
        P: Into<Arc<[u8]>>,
    {
        Self {
            type_name: type_name.into(),
            timestamp_us,
            date: SystemTime::now(),
            payloads: payloads.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the name of the payload schema this packet carries.
    #[inline]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the packet's timestamp on the graph clock, in microseconds.
    ///
    /// This is the authoritative ordering key for packets on the same stream.
    #[inline]
    pub fn timestamp_us(&self) -> i64 {
        self.timestamp_us
    }

    /// Returns the approximate wall-clock time at which the packet was created.
    #[inline]
    pub fn date(&self) -> SystemTime {
        self.date
    }

    /// Returns the serialized payload blobs, in the order the graph produced them.
    #[inline]
    pub fn payloads(&self) -> &[Arc<[u8]>] {
        &self.payloads
    }
}

// Payload data can be large, so `Debug` only prints the envelope.
impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("type_name", &self.type_name)
            .field("timestamp_us", &self.timestamp_us)
            .field("payloads", &self.payloads.len())
            .finish()
    }
}
