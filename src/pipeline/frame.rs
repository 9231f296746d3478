//! Frames, session headers, and metadata extraction
//!
//! A [`Frame`] is one reconstructed image array together with the acquisition
//! headers it was built from. A [`SessionHeader`] carries the encoding spaces
//! announced once when the upstream connection opens.

use crate::error::{Result, TrackingError};
use crate::protocol::{FrameMetadata, SessionGeometry};
use ndarray::ArrayD;
use num_complex::Complex32;
use serde::{Deserialize, Serialize};

/// Per-acquisition header record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionHeader {
    /// Slice centre in patient coordinates (mm): sagittal, coronal, transverse
    pub position: [f32; 3],
}

/// One reconstructed frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Complex samples; axes 0 and 1 are the in-plane axes
    pub data: ArrayD<Complex32>,
    /// Acquisition headers the frame was reconstructed from
    pub headers: Vec<AcquisitionHeader>,
}

impl Frame {
    /// Create a frame with a single acquisition header
    pub fn new(data: ArrayD<Complex32>, header: AcquisitionHeader) -> Self {
        Frame {
            data,
            headers: vec![header],
        }
    }
}

/// Field of view in millimetres
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldOfView {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// One encoding space of the session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncodingSpace {
    /// Encoded field of view
    pub field_of_view_mm: FieldOfView,
}

/// Session-level metadata, fixed for the lifetime of the connection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionHeader {
    /// Encoding spaces; the first one describes the streamed frames
    #[serde(default)]
    pub encoding: Vec<EncodingSpace>,
}

impl SessionHeader {
    /// Session header with a single encoding space
    pub fn with_fov(x: f32, y: f32, z: f32) -> Self {
        SessionHeader {
            encoding: vec![EncodingSpace {
                field_of_view_mm: FieldOfView { x, y, z },
            }],
        }
    }
}

/// Pull slice position and in-plane sample counts from a frame
///
/// Width and height are the lengths of axes 0 and 1 of the frame array.
///
/// # Errors
///
/// - [`TrackingError::MissingField`] - the frame has no acquisition header or
///   fewer than two axes
///
/// # Examples
///
/// ```
/// use mlc_tracking_rust::pipeline::frame::{extract_frame, AcquisitionHeader, Frame};
/// use ndarray::{ArrayD, IxDyn};
///
/// let frame = Frame::new(
///     ArrayD::zeros(IxDyn(&[64, 48, 1, 1])),
///     AcquisitionHeader { position: [1.0, 2.0, 3.0] },
/// );
/// let meta = extract_frame(&frame)?;
/// assert_eq!((meta.width, meta.height), (64, 48));
/// assert_eq!(meta.slice_position_transverse, 3.0);
/// # Ok::<(), mlc_tracking_rust::TrackingError>(())
/// ```
pub fn extract_frame(frame: &Frame) -> Result<FrameMetadata> {
    let header = frame
        .headers
        .first()
        .ok_or(TrackingError::MissingField("acquisition_header"))?;
    let shape = frame.data.shape();
    let width = *shape.first().ok_or(TrackingError::MissingField("width"))?;
    let height = *shape.get(1).ok_or(TrackingError::MissingField("height"))?;

    Ok(FrameMetadata {
        slice_position_sagittal: header.position[0] as f64,
        slice_position_coronal: header.position[1] as f64,
        slice_position_transverse: header.position[2] as f64,
        width,
        height,
    })
}

/// Pull the field of view from the session header
///
/// # Errors
///
/// - [`TrackingError::MissingField`] - the session has no encoding space
pub fn extract_session(session: &SessionHeader) -> Result<SessionGeometry> {
    let space = session
        .encoding
        .first()
        .ok_or(TrackingError::MissingField("encoding.field_of_view_mm"))?;
    let fov = space.field_of_view_mm;

    Ok(SessionGeometry {
        fov_x: fov.x as f64,
        fov_y: fov.y as f64,
        fov_z: fov.z as f64,
    })
}
