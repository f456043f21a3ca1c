//! Session adapter around an opaque, real-time hand-landmark computation graph.
//!
//! The graph itself (topology, model weights, inference runtime) is an external collaborator
//! hidden behind the [`GraphEngine`](graph::GraphEngine) trait. This crate owns the contract
//! around it: a [`HandTracker`](session::HandTracker) session accepts camera frames, runs the
//! engine on its own worker thread, and fans the engine's emissions out to a single, weakly-held
//! [`TrackerObserver`](observer::TrackerObserver).
//!
//! The delivery contract, in short:
//!
//! * Output streams are declared by name before the graph starts and are frozen afterwards.
//! * Packets on one stream arrive in non-decreasing timestamp order; nothing is guaranteed
//!   between streams.
//! * Frame submission is best-effort and never blocks: frames are dropped silently when the
//!   session is not running, the throttle interval has not elapsed, or the graph is backed up.
//! * Deactivation drains in-flight work, shuts the engine down, and reports completion exactly
//!   once per request.

use log::LevelFilter;

pub mod frame;
pub mod graph;
pub mod observer;
pub mod packet;
pub mod session;
pub mod stream;
pub mod timer;
pub mod worker;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and this crate will log at *debug* level; `RUST_LOG` can override the
/// defaults.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
