//! Per-session processing loop
//!
//! A session pulls frames from a [`FrameSource`] strictly in order, runs each
//! through an [`ImagePipeline`], encodes the result into a
//! [`TrackingMessage`] and writes it to a [`MessageSink`] before the next
//! frame is touched. Any per-frame failure ends the session: a frame that
//! cannot be fully encoded never reaches the wire.

use crate::config::TrackingConfig;
use crate::error::Result;
use crate::io::client::TrackingClient;
use crate::pipeline::frame::{extract_frame, extract_session, Frame};
use crate::pipeline::source::{DisplayImage, FrameSource};
use crate::pipeline::variant::ImagePipeline;
use crate::protocol::{SessionGeometry, TrackingMessage};
use tracing::{debug, info};

/// Destination for encoded tracking messages
pub trait MessageSink {
    /// Write one complete message; must not return after a partial write
    fn send(&mut self, bytes: &[u8]) -> Result<()>;
}

impl MessageSink for Vec<Vec<u8>> {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.push(bytes.to_vec());
        Ok(())
    }
}

impl<T: MessageSink + ?Sized> MessageSink for &mut T {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).send(bytes)
    }
}

/// Totals for a finished session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Frames pulled from the source and fully processed
    pub frames: u64,
    /// Messages written to the sink
    pub messages_sent: u64,
    /// Bytes written to the sink
    pub bytes_sent: u64,
}

/// One processing session: a frame source bound to a pipeline variant
pub struct TrackingSession<S, P> {
    source: S,
    pipeline: P,
}

impl<S: FrameSource, P: ImagePipeline> TrackingSession<S, P> {
    /// Pair a source with a pipeline
    pub fn new(source: S, pipeline: P) -> Self {
        TrackingSession { source, pipeline }
    }

    /// The frame source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The pipeline variant
    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// Split back into source and pipeline
    pub fn into_parts(self) -> (S, P) {
        (self.source, self.pipeline)
    }

    /// Run the session against the consumer named in `config`
    ///
    /// Session geometry is read before the connection is opened, so a
    /// source without a field of view never connects. The connection is
    /// closed on every exit path, and error context is logged first.
    ///
    /// # Errors
    ///
    /// - [`TrackingError::Connect`](crate::error::TrackingError::Connect) -
    ///   the consumer could not be reached; no frame is processed
    /// - Any per-frame error; the frame's message is not sent
    pub fn run(&mut self, config: &TrackingConfig) -> Result<SessionSummary> {
        let geometry = extract_session(self.source.session_header())?;
        TrackingClient::scoped(config, |client| self.drive(&geometry, client))
    }

    /// Run the session writing into an arbitrary sink
    pub fn run_with<T: MessageSink>(&mut self, mut sink: T) -> Result<SessionSummary> {
        let geometry = extract_session(self.source.session_header())?;
        self.drive(&geometry, &mut sink)
    }

    /// Run the session with no tracking consumer
    ///
    /// Frames are processed and returned for display only.
    pub fn run_display_only(&mut self) -> Result<SessionSummary> {
        let mut summary = SessionSummary::default();
        while let Some(frame) = self.source.next_frame()? {
            let output = self.pipeline.process(&frame.data)?;
            self.source.send_image(DisplayImage::from_output(&output))?;
            summary.frames += 1;
        }
        info!(frames = summary.frames, "Display-only session finished");
        Ok(summary)
    }

    fn drive<T: MessageSink>(
        &mut self,
        geometry: &SessionGeometry,
        sink: &mut T,
    ) -> Result<SessionSummary> {
        info!(
            fov_x = geometry.fov_x,
            fov_y = geometry.fov_y,
            fov_z = geometry.fov_z,
            upsample_ratio = self.pipeline.upsample_ratio(),
            "Tracking session started"
        );

        let mut summary = SessionSummary::default();
        while let Some(frame) = self.source.next_frame()? {
            let sent = self.process_frame(&frame, geometry, sink)?;
            summary.frames += 1;
            summary.messages_sent += 1;
            summary.bytes_sent += sent as u64;
        }

        info!(
            frames = summary.frames,
            bytes = summary.bytes_sent,
            "Tracking session finished"
        );
        Ok(summary)
    }

    fn process_frame<T: MessageSink>(
        &mut self,
        frame: &Frame,
        geometry: &SessionGeometry,
        sink: &mut T,
    ) -> Result<usize> {
        let output = self.pipeline.process(&frame.data)?;
        let metadata = extract_frame(frame)?;
        let message = TrackingMessage::from_parts(
            &metadata,
            geometry,
            output.view(),
            self.pipeline.upsample_ratio(),
        )?;

        let h = &message.header;
        info!(
            header_byte_count = h.header_byte_count,
            payload_byte_count = h.payload_byte_count,
            sagittal = h.slice_position_sagittal,
            coronal = h.slice_position_coronal,
            transverse = h.slice_position_transverse,
            voxel_size_z = h.voxel_size_z,
            inter_slice_spacing = h.inter_slice_spacing,
            voxel_size_x = h.voxel_size_x,
            voxel_size_y = h.voxel_size_y,
            width = h.width,
            height = h.height,
            "Tracking header"
        );

        let bytes = message.encode();
        sink.send(&bytes)?;
        debug!(bytes = bytes.len(), "Frame sent");

        self.source.send_image(DisplayImage::from_output(&output))?;
        Ok(bytes.len())
    }
}
