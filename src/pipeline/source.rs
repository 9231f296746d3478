//! Upstream frame source boundary
//!
//! The reconstruction framework that feeds frames and takes back display
//! images is external. [`FrameSource`] is the interface the session loop
//! drives; [`ReplaySource`] is an in-memory implementation for replays and
//! tests.

use crate::error::Result;
use crate::pipeline::frame::{Frame, SessionHeader};
use crate::pipeline::transform::{magnitude, squeeze};
use crate::protocol::Sample;
use ndarray::ArrayD;
use std::collections::VecDeque;

/// Magnitude image handed back to the reconstruction framework for display
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayImage {
    /// Magnitude samples with axes reversed relative to the pipeline output
    pub data: ArrayD<f32>,
}

impl DisplayImage {
    /// Build a display image from a processed frame
    ///
    /// Takes the magnitude, drops singleton axes, and reverses the axis order
    /// into the column-major layout the display side expects.
    pub fn from_output<A: Sample>(output: &ArrayD<A>) -> Self {
        let data = squeeze(magnitude(output)).reversed_axes();
        DisplayImage {
            data: data.as_standard_layout().into_owned(),
        }
    }
}

/// Source of frames for one session
pub trait FrameSource {
    /// Session metadata, fixed for the lifetime of the source
    fn session_header(&self) -> &SessionHeader;

    /// Block until the next frame arrives; `None` once the stream has ended
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Return a processed image for display
    fn send_image(&mut self, image: DisplayImage) -> Result<()>;
}

/// Frame source backed by a queue of frames already in memory
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    header: SessionHeader,
    frames: VecDeque<Frame>,
    returned: Vec<DisplayImage>,
}

impl ReplaySource {
    /// Replay `frames` in order under `header`
    pub fn new(header: SessionHeader, frames: impl IntoIterator<Item = Frame>) -> Self {
        ReplaySource {
            header,
            frames: frames.into_iter().collect(),
            returned: Vec::new(),
        }
    }

    /// Frames not yet handed out
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    /// Display images sent back so far
    pub fn returned_images(&self) -> &[DisplayImage] {
        &self.returned
    }
}

impl FrameSource for ReplaySource {
    fn session_header(&self) -> &SessionHeader {
        &self.header
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frames.pop_front())
    }

    fn send_image(&mut self, image: DisplayImage) -> Result<()> {
        self.returned.push(image);
        Ok(())
    }
}
