//! The tracker session: lifecycle control, frame submission, and result fan-out.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, Weak,
    },
    thread,
    time::{Duration, Instant},
};

use thiserror::Error;

use crate::{
    frame::VideoFrame,
    graph::{
        GraphConfig, GraphDefinition, GraphEngine, GraphOutput, OutputSink, SidePacket, NUM_HANDS,
        OUTPUT_VIDEO_STREAM,
    },
    observer::TrackerObserver,
    stream::{StreamKind, StreamKindMismatch, StreamSet},
    timer::{FpsCounter, Timer},
    worker::{self, Worker},
};

/// How many frames may sit in the session worker's inbox before submissions start getting
/// dropped.
const FRAME_QUEUE_CAPACITY: usize = 4;

/// Callback invoked once a deactivation has fully completed.
pub type CompletionHandler = Box<dyn FnOnce() + Send>;

/// Error returned by configuration calls.
///
/// Configuration after [`HandTracker::start_graph`] is rejected explicitly rather than silently
/// ignored, so misuse is visible at the call site.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("the graph has already been started; configuration is frozen")]
    AlreadyStarted,
    #[error("hand count must be at least 1")]
    InvalidHandCount,
    #[error(transparent)]
    StreamKindMismatch(#[from] StreamKindMismatch),
}

/// Error returned by [`HandTracker::start_graph`].
#[derive(Debug, Error)]
pub enum StartError {
    #[error("the graph has already been started")]
    AlreadyStarted,
    /// The engine rejected the graph definition or failed to come up. Fatal; the engine is not
    /// retried and the session never transitions to running.
    #[error("failed to initialize graph")]
    Graph(#[source] anyhow::Error),
    #[error("failed to spawn session worker")]
    Spawn(#[source] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Initial state; configuration calls are accepted. A failed start stays here.
    Configuring,
    /// The graph is running and frames are accepted.
    Running,
    /// Deactivation has begun; no more frames are accepted while the engine drains.
    Deactivating,
}

enum Msg {
    Frame(VideoFrame),
    Shutdown(Option<CompletionHandler>),
}

/// State shared with the dispatch side (the engine's emission threads).
struct Shared {
    observer: Mutex<Option<Weak<dyn TrackerObserver>>>,
    /// Last delivered timestamp per stream, for the per-stream ordering check.
    last_timestamps: Mutex<HashMap<String, i64>>,
    error_escalated: AtomicBool,
}

impl Shared {
    fn observer(&self) -> Option<Arc<dyn TrackerObserver>> {
        self.observer
            .lock()
            .unwrap()
            .as_ref()
            .and_then(Weak::upgrade)
    }

    fn dispatch(&self, output: GraphOutput) {
        let Some(observer) = self.observer() else {
            log::trace!("no live observer, dropping graph output");
            return;
        };

        match output {
            GraphOutput::Packet { stream, packet } => {
                self.check_stream_order(&stream, packet.timestamp_us());
                observer.on_packet(&packet, &stream);
            }
            GraphOutput::Frame(frame) => observer.on_frame(&frame),
        }
    }

    fn check_stream_order(&self, stream: &str, timestamp_us: i64) {
        let mut last = self.last_timestamps.lock().unwrap();
        match last.get_mut(stream) {
            Some(prev) => {
                if timestamp_us < *prev {
                    log::warn!(
                        "stream '{stream}' timestamp went backwards: {timestamp_us} < {prev}"
                    );
                }
                *prev = timestamp_us;
            }
            None => {
                last.insert(stream.to_string(), timestamp_us);
            }
        }
    }

    /// Reports an engine failure to the observer, once per session. Later failures are only
    /// logged.
    fn escalate(&self, error: anyhow::Error) {
        if self.error_escalated.swap(true, Ordering::Relaxed) {
            log::debug!("graph engine error (already escalated): {error:#}");
            return;
        }
        log::error!("graph engine error: {error:#}");
        if let Some(observer) = self.observer() {
            observer.on_error(&error);
        }
    }
}

/// A session around one opaque hand-landmark graph.
///
/// The session is configured, started once, fed camera frames, and eventually deactivated:
///
/// 1. Declare output streams with [`add_output_stream`], set parameters like
///    [`set_hand_count`], and attach an observer.
/// 2. [`start_graph`] freezes the configuration and brings the engine up. From here on the
///    engine runs on a dedicated worker thread.
/// 3. [`process_frame`] hands frames to the graph. Submission never blocks; results arrive
///    asynchronously at the observer, per-stream in timestamp order.
/// 4. [`deactivate`] drains in-flight frames, shuts the engine down, and reports completion.
///
/// The observer is held weakly: the session never keeps it alive, and outputs emitted after the
/// observer is gone are silently discarded.
///
/// [`add_output_stream`]: Self::add_output_stream
/// [`set_hand_count`]: Self::set_hand_count
/// [`start_graph`]: Self::start_graph
/// [`process_frame`]: Self::process_frame
/// [`deactivate`]: Self::deactivate
pub struct HandTracker {
    state: State,
    definition: GraphDefinition,
    side_packets: Vec<(String, SidePacket)>,
    streams: StreamSet,
    min_frame_interval: Duration,
    last_accepted: Option<Instant>,
    engine: Option<Box<dyn GraphEngine>>,
    worker: Option<Worker<Msg>>,
    shared: Arc<Shared>,
}

impl HandTracker {
    /// Creates a session that will run `definition` on `engine`.
    ///
    /// Nothing happens until [`start_graph`](Self::start_graph) is called; until then the
    /// session accepts configuration.
    pub fn new(definition: GraphDefinition, engine: impl GraphEngine) -> Self {
        Self {
            state: State::Configuring,
            definition,
            side_packets: Vec::new(),
            streams: StreamSet::new(),
            min_frame_interval: Duration::ZERO,
            last_accepted: None,
            engine: Some(Box::new(engine)),
            worker: None,
            shared: Arc::new(Shared {
                observer: Mutex::new(None),
                last_timestamps: Mutex::new(HashMap::new()),
                error_escalated: AtomicBool::new(false),
            }),
        }
    }

    /// Sets the number of hands the graph should track. Defaults to 1.
    ///
    /// Sugar for setting the [`NUM_HANDS`] side packet.
    pub fn set_hand_count(&mut self, count: u32) -> Result<(), ConfigError> {
        self.ensure_configuring()?;
        let count = i32::try_from(count).map_err(|_| ConfigError::InvalidHandCount)?;
        if count < 1 {
            return Err(ConfigError::InvalidHandCount);
        }
        self.set_side_packet(NUM_HANDS, SidePacket::I32(count))
    }

    /// Sets a constant graph input parameter, replacing any earlier value under the same name.
    pub fn set_side_packet(
        &mut self,
        name: impl Into<String>,
        value: SidePacket,
    ) -> Result<(), ConfigError> {
        self.ensure_configuring()?;
        let name = name.into();
        match self.side_packets.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.side_packets.push((name, value)),
        }
        Ok(())
    }

    /// Declares a packet-producing output stream.
    ///
    /// Declaring the same name twice is a no-op.
    pub fn add_output_stream(&mut self, name: impl Into<String>) -> Result<(), ConfigError> {
        self.ensure_configuring()?;
        self.streams.register(name, StreamKind::Packet)?;
        Ok(())
    }

    /// Requests that the processed video frame is delivered to the observer via
    /// [`TrackerObserver::on_frame`].
    pub fn enable_frame_output(&mut self) -> Result<(), ConfigError> {
        self.ensure_configuring()?;
        self.streams.register(OUTPUT_VIDEO_STREAM, StreamKind::Frame)?;
        Ok(())
    }

    /// Sets the minimum interval between two accepted frames.
    ///
    /// Frames submitted sooner after the last accepted frame are dropped, bounding the rate the
    /// graph sees regardless of the capture rate. Zero (the default) disables throttling. May be
    /// adjusted at any time.
    pub fn set_min_frame_interval(&mut self, interval: Duration) {
        self.min_frame_interval = interval;
    }

    /// Attaches `observer`, replacing any previous one.
    ///
    /// Only a weak reference is stored: the session never extends the observer's lifetime, and
    /// once the last `Arc` elsewhere is dropped, deliveries stop silently.
    pub fn set_observer<O: TrackerObserver + 'static>(&mut self, observer: &Arc<O>) {
        let observer: Arc<dyn TrackerObserver> = observer.clone();
        let weak: Weak<dyn TrackerObserver> = Arc::downgrade(&observer);
        *self.shared.observer.lock().unwrap() = Some(weak);
    }

    /// Returns whether the session is running (started and not deactivating).
    pub fn is_running(&self) -> bool {
        self.state == State::Running
    }

    fn ensure_configuring(&self) -> Result<(), ConfigError> {
        match self.state {
            State::Configuring => Ok(()),
            _ => Err(ConfigError::AlreadyStarted),
        }
    }

    /// Freezes the configuration, initializes the graph engine, and transitions to running.
    ///
    /// Engine startup runs on the calling thread, so an invalid graph definition or missing
    /// resource surfaces synchronously as [`StartError::Graph`]. Such a failure is fatal: the
    /// engine is not retried and the session never runs. Calling this a second time is an
    /// error, whether or not the first call succeeded.
    pub fn start_graph(&mut self) -> Result<(), StartError> {
        if self.state != State::Configuring || self.engine.is_none() {
            return Err(StartError::AlreadyStarted);
        }

        let config = GraphConfig::new(
            self.definition.clone(),
            self.side_packets.clone(),
            self.streams.clone(),
        );
        if config.streams().is_empty() {
            log::debug!("starting graph without any registered output streams");
        }

        let dispatch = self.shared.clone();
        let sink = OutputSink::new(Arc::new(move |output| dispatch.dispatch(output)));

        let mut startup_engine = self.engine.take().unwrap();
        if let Err(error) = startup_engine.start(&config, sink) {
            // Fatal: the engine is dropped, not retried.
            return Err(StartError::Graph(error));
        }

        let mut engine = Some(startup_engine);
        let shared = self.shared.clone();
        let mut fps = FpsCounter::new("graph session");
        let t_process = Timer::new("process");
        let worker = Worker::builder()
            .name("graph session")
            .capacity(FRAME_QUEUE_CAPACITY)
            .spawn(move |msg| match msg {
                Msg::Frame(frame) => {
                    // The engine is gone once `Shutdown` was seen; frames cannot actually
                    // arrive after it (submission stops first), but the queue drains here.
                    let Some(engine) = engine.as_mut() else { return };
                    if let Err(error) = t_process.time(|| engine.process(frame)) {
                        shared.escalate(error);
                    }
                    fps.tick_with([&t_process]);
                }
                Msg::Shutdown(completion) => {
                    if let Some(mut engine) = engine.take() {
                        engine.shutdown();
                        log::debug!("graph engine shut down");
                    }
                    if let Some(completion) = completion {
                        completion();
                    }
                }
            })
            .map_err(StartError::Spawn)?;

        self.worker = Some(worker);
        self.state = State::Running;
        log::debug!(
            "graph started: {} hand(s), {} output stream(s)",
            config.hand_count(),
            config.streams().len()
        );
        Ok(())
    }

    /// Submits one video frame for processing.
    ///
    /// Frame submission is best-effort and never blocks past the hand-over: if the session is
    /// not running, the frame arrives faster than the configured minimum interval, or the
    /// worker's inbox is full, the frame is dropped silently. Results for accepted frames arrive
    /// asynchronously at the observer.
    ///
    /// The frame buffer is shared, not copied; the caller keeps its handle.
    pub fn process_frame(&mut self, frame: &VideoFrame) {
        if self.state != State::Running {
            log::trace!(
                "session not running, dropping frame at {}",
                frame.timestamp_us()
            );
            return;
        }

        if !self.min_frame_interval.is_zero() {
            if let Some(last) = self.last_accepted {
                if last.elapsed() < self.min_frame_interval {
                    log::trace!("throttled, dropping frame at {}", frame.timestamp_us());
                    return;
                }
            }
        }

        match self.worker.as_mut().unwrap().try_send(Msg::Frame(frame.clone())) {
            Ok(()) => self.last_accepted = Some(Instant::now()),
            Err(_) => log::trace!(
                "frame queue full, dropping frame at {}",
                frame.timestamp_us()
            ),
        }
    }

    /// Stops accepting frames and shuts the graph down gracefully.
    ///
    /// Frames already in flight may still produce observer callbacks while the engine drains.
    /// `completion` is invoked exactly once, asynchronously relative to this call, after the
    /// engine has fully shut down.
    ///
    /// Deactivating is idempotent-safe: calling it again (in any state other than running)
    /// performs no engine work but still invokes the given completion asynchronously.
    pub fn deactivate(&mut self, completion: Option<CompletionHandler>) {
        match self.state {
            State::Running => {
                self.state = State::Deactivating;
                log::debug!("deactivating session");
                self.worker.as_mut().unwrap().send(Msg::Shutdown(completion));
            }
            _ => {
                log::trace!("deactivate: session is not running, nothing to do");
                if let Some(completion) = completion {
                    // The caller is still owed its completion, delivered off-thread like the
                    // real one.
                    thread::spawn(completion);
                }
            }
        }
    }

    /// Like [`deactivate`](Self::deactivate), but blocks until shutdown has completed.
    pub fn deactivate_blocking(&mut self) {
        let (promise, handle) = worker::promise();
        self.deactivate(Some(Box::new(move || promise.fulfill(()))));
        handle.block().ok();
    }
}

impl Drop for HandTracker {
    fn drop(&mut self) {
        if self.state == State::Running {
            self.deactivate(None);
        }
        // Dropping the worker joins it once the queue has drained.
    }
}
