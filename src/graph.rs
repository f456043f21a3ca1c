//! The pluggable graph engine boundary.
//!
//! The computation graph that turns camera frames into hand-landmark packets is an external
//! collaborator: a pre-built, opaque pipeline defined by a binary resource and executed by some
//! engine. This module defines the contract the session drives it through, [`GraphEngine`], and
//! the configuration that is frozen when the graph starts.

use std::{
    fmt,
    path::Path,
    sync::Arc,
};

use anyhow::{bail, Context};

use crate::{
    frame::VideoFrame,
    packet::Packet,
    stream::{StreamKind, StreamSet},
};

/// Name of the side packet carrying the number of hands to track.
pub const NUM_HANDS: &str = "num_hands";

/// Name of the stream on which the processed video frame is produced, when enabled.
pub const OUTPUT_VIDEO_STREAM: &str = "output_video";

/// The opaque binary resource defining the computation graph.
///
/// The definition's format is a contract between whoever authored the graph and the engine that
/// executes it; this crate never looks inside. Loading only checks that the resource exists and
/// is non-empty, so that a missing or truncated resource surfaces before the graph starts.
#[derive(Clone)]
pub struct GraphDefinition {
    bytes: Arc<[u8]>,
}

impl GraphDefinition {
    /// Creates a graph definition from an in-memory resource.
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> anyhow::Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            bail!("graph definition is empty");
        }
        Ok(Self { bytes })
    }

    /// Loads a graph definition from a file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read graph definition from {}", path.display()))?;
        Self::from_bytes(bytes)
    }

    /// Returns the raw definition resource.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for GraphDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphDefinition")
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// A constant input parameter handed to the graph when it starts.
///
/// Side packets configure graph behavior that is fixed for the lifetime of a run, like the number
/// of hands to track or the model complexity to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidePacket {
    I32(i32),
    Bool(bool),
}

/// The full configuration a graph is started with.
///
/// Built by the session from its pre-start configuration calls; immutable from then on.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    definition: GraphDefinition,
    side_packets: Vec<(String, SidePacket)>,
    streams: StreamSet,
}

impl GraphConfig {
    pub(crate) fn new(
        definition: GraphDefinition,
        side_packets: Vec<(String, SidePacket)>,
        streams: StreamSet,
    ) -> Self {
        Self {
            definition,
            side_packets,
            streams,
        }
    }

    /// Returns the opaque graph definition resource.
    #[inline]
    pub fn definition(&self) -> &GraphDefinition {
        &self.definition
    }

    /// Returns the side packet named `name`, if one was set.
    pub fn side_packet(&self, name: &str) -> Option<SidePacket> {
        self.side_packets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| *value)
    }

    /// Returns all side packets, in the order they were set.
    #[inline]
    pub fn side_packets(&self) -> &[(String, SidePacket)] {
        &self.side_packets
    }

    /// Returns the number of hands the graph is asked to track.
    ///
    /// This reads the [`NUM_HANDS`] side packet and defaults to 1.
    pub fn hand_count(&self) -> u32 {
        match self.side_packet(NUM_HANDS) {
            Some(SidePacket::I32(n)) if n >= 1 => n as u32,
            _ => 1,
        }
    }

    /// Returns the declared output streams.
    #[inline]
    pub fn streams(&self) -> &StreamSet {
        &self.streams
    }

    /// Returns whether the processed video frame should be produced.
    pub fn frame_output(&self) -> bool {
        self.streams
            .iter()
            .any(|decl| decl.kind() == StreamKind::Frame)
    }
}

/// One emission of the graph engine.
#[derive(Debug)]
pub enum GraphOutput {
    /// A result packet produced on the named stream.
    Packet { stream: String, packet: Packet },
    /// The processed video frame, produced when frame output is enabled.
    Frame(VideoFrame),
}

/// Cloneable handle an engine uses to emit outputs towards the session.
///
/// Outputs are forwarded to the observer in the order they are emitted. The handle may be cloned
/// and moved onto whatever threads the engine uses internally; per-stream ordering is then the
/// engine's responsibility.
#[derive(Clone)]
pub struct OutputSink {
    dispatch: Arc<dyn Fn(GraphOutput) + Send + Sync>,
}

impl OutputSink {
    pub(crate) fn new(dispatch: Arc<dyn Fn(GraphOutput) + Send + Sync>) -> Self {
        Self { dispatch }
    }

    /// Emits one engine output.
    pub fn emit(&self, output: GraphOutput) {
        (self.dispatch)(output);
    }

    /// Emits a result packet on the stream named `stream`.
    pub fn emit_packet(&self, stream: impl Into<String>, packet: Packet) {
        self.emit(GraphOutput::Packet {
            stream: stream.into(),
            packet,
        });
    }

    /// Emits a processed video frame.
    pub fn emit_frame(&self, frame: VideoFrame) {
        self.emit(GraphOutput::Frame(frame));
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSink").finish_non_exhaustive()
    }
}

/// An engine that executes an opaque computation graph.
///
/// The session owns exactly one engine and drives it through this trait; the concrete graph and
/// model are swappable behind it. All three methods are called from the session's worker thread,
/// except [`start`], which runs on the caller's thread so that startup failures surface
/// synchronously.
///
/// [`start`]: Self::start
pub trait GraphEngine: Send + 'static {
    /// Initializes the graph from `config` and prepares it to accept frames.
    ///
    /// Outputs must be emitted through `sink`, tagged with the stream that produced them. Packets
    /// emitted on one stream must carry non-decreasing timestamps.
    ///
    /// An error here is fatal: the session will never start and the engine will not be retried.
    fn start(&mut self, config: &GraphConfig, sink: OutputSink) -> anyhow::Result<()>;

    /// Submits one video frame to the graph.
    ///
    /// Result delivery is asynchronous; this method only hands the frame over. Errors are
    /// per-frame and non-fatal: the session logs them and escalates the first one to the
    /// observer.
    fn process(&mut self, frame: VideoFrame) -> anyhow::Result<()>;

    /// Drains in-flight work and shuts the graph down.
    ///
    /// Called exactly once. Frames already submitted may still produce emissions during the
    /// drain; once this returns, the engine must be silent.
    fn shutdown(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_definition_is_rejected() {
        GraphDefinition::from_bytes(Vec::new()).unwrap_err();
        GraphDefinition::from_bytes(vec![0u8; 16]).unwrap();
    }

    #[test]
    fn missing_definition_file_is_rejected() {
        GraphDefinition::from_file("/nonexistent/hand_graph.binarypb").unwrap_err();
    }

    #[test]
    fn hand_count_reads_side_packet() {
        let definition = GraphDefinition::from_bytes(vec![1u8]).unwrap();
        let config = GraphConfig::new(
            definition.clone(),
            vec![(NUM_HANDS.into(), SidePacket::I32(2))],
            StreamSet::new(),
        );
        assert_eq!(config.hand_count(), 2);

        let config = GraphConfig::new(definition, Vec::new(), StreamSet::new());
        assert_eq!(config.hand_count(), 1);
    }
}
