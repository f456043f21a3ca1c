//! Regroups the per-stream packet callbacks into one batch per input frame.
//!
//! A hand-tracking graph reports landmarks and handedness on separate streams even though both
//! describe the same frame; [`PacketBatcher`] stitches them back together by timestamp.

use std::{sync::Arc, thread, time::Duration};

use handpipe::{
    frame::{Resolution, VideoFrame},
    graph::{GraphConfig, GraphDefinition, GraphEngine, OutputSink},
    observer::PacketBatcher,
    packet::Packet,
    session::HandTracker,
};

/// Stand-in engine emitting a landmark packet and a handedness packet per frame.
struct SyntheticEngine {
    sink: Option<OutputSink>,
}

impl GraphEngine for SyntheticEngine {
    fn start(&mut self, _config: &GraphConfig, sink: OutputSink) -> anyhow::Result<()> {
        self.sink = Some(sink);
        Ok(())
    }

    fn process(&mut self, frame: VideoFrame) -> anyhow::Result<()> {
        let sink = self.sink.as_ref().unwrap();
        sink.emit_packet(
            "hand_landmarks",
            Packet::new(
                "NormalizedLandmarkList",
                frame.timestamp_us(),
                [vec![0u8; 252]],
            ),
        );
        sink.emit_packet(
            "handedness",
            Packet::new("ClassificationList", frame.timestamp_us(), [vec![1u8]]),
        );
        Ok(())
    }

    fn shutdown(&mut self) {
        self.sink = None;
    }
}

fn main() -> anyhow::Result<()> {
    handpipe::init_logger!();

    let definition = GraphDefinition::from_bytes(vec![0u8; 512])?;
    let mut session = HandTracker::new(definition, SyntheticEngine { sink: None });
    session.add_output_stream("hand_landmarks")?;
    session.add_output_stream("handedness")?;

    let batcher = Arc::new(PacketBatcher::new(|batch| {
        let streams: Vec<_> = batch.iter().map(|(stream, _)| stream.to_string()).collect();
        println!("frame @ {}us: {}", batch.timestamp_us(), streams.join(" + "));
    }));
    session.set_observer(&batcher);
    session.start_graph()?;

    for i in 0..30i64 {
        let frame = VideoFrame::new(vec![0u8; 64], Resolution::RES_720P, i * 33_333);
        session.process_frame(&frame);
        thread::sleep(Duration::from_millis(16));
    }

    session.deactivate_blocking();
    batcher.flush();
    Ok(())
}
