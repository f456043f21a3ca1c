//! Feeds synthetic camera frames through a session and prints the landmark packets that come
//! back out.
//!
//! The engine here fabricates hand landmarks instead of running a real graph; swap in an engine
//! backed by an actual inference runtime to track real hands.

use std::{sync::Arc, thread, time::Duration};

use handpipe::{
    frame::{Resolution, VideoFrame},
    graph::{GraphConfig, GraphDefinition, GraphEngine, OutputSink},
    observer::TrackerObserver,
    packet::Packet,
    session::HandTracker,
    timer::FpsCounter,
};

const NUM_LANDMARKS: usize = 21;

/// Stand-in engine that synthesizes one landmark list per tracked hand and frame.
struct SyntheticEngine {
    sink: Option<OutputSink>,
    hand_count: u32,
    phase: f32,
}

impl SyntheticEngine {
    fn new() -> Self {
        Self {
            sink: None,
            hand_count: 1,
            phase: 0.0,
        }
    }

    fn landmark_blob(&self, hand: u32) -> Vec<u8> {
        let mut blob = Vec::with_capacity(NUM_LANDMARKS * 3 * 4);
        for i in 0..NUM_LANDMARKS {
            let t = self.phase + i as f32 * 0.05 + hand as f32;
            for coord in [t.sin() * 0.5 + 0.5, t.cos() * 0.5 + 0.5, 0.0] {
                blob.extend_from_slice(&coord.to_le_bytes());
            }
        }
        blob
    }
}

impl GraphEngine for SyntheticEngine {
    fn start(&mut self, config: &GraphConfig, sink: OutputSink) -> anyhow::Result<()> {
        self.hand_count = config.hand_count();
        self.sink = Some(sink);
        Ok(())
    }

    fn process(&mut self, frame: VideoFrame) -> anyhow::Result<()> {
        self.phase += 0.1;
        let sink = self.sink.as_ref().unwrap();
        let blobs: Vec<Vec<u8>> = (0..self.hand_count)
            .map(|hand| self.landmark_blob(hand))
            .collect();
        sink.emit_packet(
            "hand_landmarks",
            Packet::new("NormalizedLandmarkList", frame.timestamp_us(), blobs),
        );
        Ok(())
    }

    fn shutdown(&mut self) {
        self.sink = None;
    }
}

struct PrintObserver;

impl TrackerObserver for PrintObserver {
    fn on_packet(&self, packet: &Packet, stream: &str) {
        println!(
            "{stream} @ {}us: {} hand(s), {}",
            packet.timestamp_us(),
            packet.payloads().len(),
            packet.type_name(),
        );
    }
}

fn main() -> anyhow::Result<()> {
    handpipe::init_logger!();

    let definition = GraphDefinition::from_bytes(vec![0u8; 512])?;
    let mut session = HandTracker::new(definition, SyntheticEngine::new());
    session.set_hand_count(2)?;
    session.add_output_stream("hand_landmarks")?;

    let observer = Arc::new(PrintObserver);
    session.set_observer(&observer);
    session.start_graph()?;

    let mut fps = FpsCounter::new("camera");
    for i in 0..90i64 {
        let frame = VideoFrame::new(vec![0u8; 64], Resolution::RES_720P, i * 33_333);
        session.process_frame(&frame);
        fps.tick();
        thread::sleep(Duration::from_millis(16));
    }

    session.deactivate_blocking();
    Ok(())
}
