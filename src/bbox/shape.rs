//! Image dimensions as seen by the box normalizer.

use serde::{Deserialize, Serialize};

use crate::error::DetbridgeError;

/// Shape of an image array: (height, width, channels).
///
/// Only height and width take part in box conversion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageShape {
    pub height: usize,
    pub width: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<usize>,
}

impl ImageShape {
    /// Creates a shape without a channel count.
    #[inline]
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            channels: None,
        }
    }

    /// Sets the channel count.
    #[inline]
    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = Some(channels);
        self
    }

    /// Builds a shape from array dimensions laid out as `[H, W]` or `[H, W, C, ...]`.
    pub fn from_dims(dims: &[usize]) -> Result<Self, DetbridgeError> {
        match dims {
            [height, width] => Ok(Self::new(*height, *width)),
            [height, width, channels, ..] => Ok(Self::new(*height, *width).with_channels(*channels)),
            _ => Err(DetbridgeError::InvalidImageShape {
                dims: dims.to_vec(),
            }),
        }
    }

    #[inline]
    pub fn width_f64(&self) -> f64 {
        self.width as f64
    }

    #[inline]
    pub fn height_f64(&self) -> f64 {
        self.height as f64
    }

    /// Returns the smaller of width and height.
    #[inline]
    pub fn min_side(&self) -> usize {
        self.width.min(self.height)
    }
}
