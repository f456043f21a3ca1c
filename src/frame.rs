//! Video frame buffers submitted to the graph.

use std::{fmt, sync::Arc};

/// Resolution (`width x height`) of a video frame.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    /// 1080p resolution: `1920x1080`
    pub const RES_1080P: Self = Self {
        width: 1920,
        height: 1080,
    };

    /// 720p resolution: `1280x720`
    pub const RES_720P: Self = Self {
        width: 1280,
        height: 720,
    };

    /// Creates a new [`Resolution`] of `width x height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns the width of this [`Resolution`].
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height of this [`Resolution`].
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn num_pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A pixel buffer captured at a known point on the graph clock.
///
/// The pixel data is platform-native and opaque to this crate; format and layout are a contract
/// between the capture subsystem and the graph engine. Frames are cheaply cloneable: the buffer is
/// shared, never copied, so the capturing side keeps ownership of its handle while a clone is
/// submitted to the graph.
#[derive(Clone)]
pub struct VideoFrame {
    data: Arc<[u8]>,
    resolution: Resolution,
    timestamp_us: i64,
}

impl VideoFrame {
    /// Creates a frame from raw pixel data.
    ///
    /// `timestamp_us` is the frame's position on the graph clock, in microseconds. Frames
    /// submitted to a session are expected to carry non-decreasing timestamps.
    pub fn new(data: impl Into<Arc<[u8]>>, resolution: Resolution, timestamp_us: i64) -> Self {
        Self {
            data: data.into(),
            resolution,
            timestamp_us,
        }
    }

    /// Returns the raw pixel data.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the [`Resolution`] of this frame.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Returns the frame's timestamp on the graph clock, in microseconds.
    #[inline]
    pub fn timestamp_us(&self) -> i64 {
        self.timestamp_us
    }
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("resolution", &self.resolution)
            .field("timestamp_us", &self.timestamp_us)
            .field("bytes", &self.data.len())
            .finish()
    }
}
