//! Frame and session geometry
//!
//! Per-frame metadata (slice position, in-plane sample counts), per-session
//! field of view, and the voxel sizes derived from both.

use crate::error::{Result, TrackingError};
use serde::{Deserialize, Serialize};

/// Readout oversampling factor of the upstream acquisition along x
///
/// The field of view along x covers twice the reported sample count.
pub const READOUT_OVERSAMPLING: f64 = 2.0;

/// Geometry pulled from a single frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameMetadata {
    /// Slice position along the sagittal axis (mm)
    pub slice_position_sagittal: f64,
    /// Slice position along the coronal axis (mm)
    pub slice_position_coronal: f64,
    /// Slice position along the transverse axis (mm)
    pub slice_position_transverse: f64,
    /// Samples along axis 0 of the frame array
    pub width: usize,
    /// Samples along axis 1 of the frame array
    pub height: usize,
}

impl FrameMetadata {
    /// Scale the in-plane sample counts by an integer upsample ratio
    ///
    /// Used when the image has been super-resolved onto a finer grid than the
    /// acquisition. Slice positions are unchanged.
    ///
    /// # Errors
    ///
    /// - [`TrackingError::InvalidConfig`] - a scaled count overflows `usize`
    ///
    /// # Examples
    ///
    /// ```
    /// use mlc_tracking_rust::protocol::FrameMetadata;
    ///
    /// let meta = FrameMetadata {
    ///     slice_position_sagittal: 0.0,
    ///     slice_position_coronal: 0.0,
    ///     slice_position_transverse: 0.0,
    ///     width: 64,
    ///     height: 64,
    /// };
    /// let up = meta.upsampled(4)?;
    /// assert_eq!((up.width, up.height), (256, 256));
    /// # Ok::<(), mlc_tracking_rust::TrackingError>(())
    /// ```
    pub fn upsampled(&self, ratio: u32) -> Result<Self> {
        let scale = |count: usize| {
            usize::try_from(ratio)
                .ok()
                .and_then(|r| count.checked_mul(r))
                .ok_or_else(|| {
                    TrackingError::InvalidConfig(format!(
                        "upsample ratio {} overflows a {} x {} frame",
                        ratio, self.width, self.height
                    ))
                })
        };
        Ok(FrameMetadata {
            width: scale(self.width)?,
            height: scale(self.height)?,
            ..*self
        })
    }
}

/// Field of view of the session, fixed for the lifetime of a connection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionGeometry {
    /// Field of view along x (mm)
    pub fov_x: f64,
    /// Field of view along y (mm)
    pub fov_y: f64,
    /// Field of view along z (mm)
    pub fov_z: f64,
}

/// Voxel sizes derived from field of view and sample counts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedGeometry {
    /// Voxel size along x (mm)
    pub voxel_size_x: f64,
    /// Voxel size along y (mm)
    pub voxel_size_y: f64,
    /// Voxel size along z, the slice thickness (mm)
    pub voxel_size_z: f64,
    /// Gap between slices; always zero for single-slice data
    pub inter_slice_spacing: f64,
}

impl DerivedGeometry {
    /// Derive voxel sizes for a frame of `width` x `height` samples
    ///
    /// - `voxel_size_x = fov_x / (2 * width)`
    /// - `voxel_size_y = fov_y / height`
    /// - `voxel_size_z = fov_z` (single slice: thickness equals the z field of view)
    ///
    /// Zero counts yield infinite sizes, following IEEE division.
    ///
    /// # Examples
    ///
    /// ```
    /// use mlc_tracking_rust::protocol::{DerivedGeometry, SessionGeometry};
    ///
    /// let fov = SessionGeometry { fov_x: 256.0, fov_y: 256.0, fov_z: 5.0 };
    /// let derived = DerivedGeometry::compute(&fov, 256, 256);
    /// assert_eq!(derived.voxel_size_x, 0.5);
    /// assert_eq!(derived.voxel_size_y, 1.0);
    /// assert_eq!(derived.voxel_size_z, 5.0);
    /// ```
    pub fn compute(session: &SessionGeometry, width: usize, height: usize) -> Self {
        DerivedGeometry {
            voxel_size_x: session.fov_x / (READOUT_OVERSAMPLING * width as f64),
            voxel_size_y: session.fov_y / height as f64,
            voxel_size_z: session.fov_z,
            inter_slice_spacing: 0.0,
        }
    }
}
