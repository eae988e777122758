//! Camera frames as seen by the kernel.
//!
//! - `FrameDims`: validated frame size. Width and height are always > 0.
//! - `Frame`: one captured image handed to the vision services.
//!
//! Frames are ephemeral. A frame is analysed once and then dropped; nothing in
//! the kernel keeps pixels beyond the vision calls for that frame.

use anyhow::{anyhow, Result};

/// Frame size in pixels.
///
/// Construction fails for a zero dimension; every downstream ratio divides by
/// these values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameDims {
    width: u32,
    height: u32,
}

impl FrameDims {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!(
                "frame dimensions must be > 0 (got {}x{})",
                width,
                height
            ));
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// One captured camera frame.
pub struct Frame {
    data: Vec<u8>,
    dims: FrameDims,
    /// Monotonic sequence number assigned by the frame source.
    pub seq: u64,
}

impl Frame {
    pub fn new(data: Vec<u8>, dims: FrameDims, seq: u64) -> Self {
        Self { data, dims, seq }
    }

    pub fn dims(&self) -> FrameDims {
        self.dims
    }

    /// Pixel bytes, read-only. Backends must not retain them past the call.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Pixels are deliberately left out of debug output.
        f.debug_struct("Frame")
            .field("seq", &self.seq)
            .field("dims", &self.dims)
            .field("bytes", &self.data.len())
            .finish()
    }
}
