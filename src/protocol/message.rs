//! Tracking message structure
//!
//! A tracking message is the fixed header followed immediately by
//! `width * height` unsigned 16-bit magnitude samples. There is no padding,
//! delimiter, or trailing marker.

use crate::error::{Result, TrackingError};
use crate::protocol::geometry::{DerivedGeometry, FrameMetadata, SessionGeometry};
use crate::protocol::header::{TrackingHeader, BYTES_PER_SAMPLE, HEADER_BYTE_COUNT};
use bytes::{Buf, BufMut};
use ndarray::{Array2, ArrayViewD};
use num_complex::{Complex32, Complex64};
use tracing::{trace, warn};

/// A pixel sample that can be reduced to a non-negative magnitude
///
/// Complex samples use their modulus; real samples their absolute value.
pub trait Sample: Copy {
    /// Magnitude of the sample
    fn magnitude(self) -> f64;
}

impl Sample for f32 {
    fn magnitude(self) -> f64 {
        (self as f64).abs()
    }
}

impl Sample for f64 {
    fn magnitude(self) -> f64 {
        self.abs()
    }
}

impl Sample for u16 {
    fn magnitude(self) -> f64 {
        self as f64
    }
}

impl Sample for i16 {
    fn magnitude(self) -> f64 {
        (self as f64).abs()
    }
}

impl Sample for i32 {
    fn magnitude(self) -> f64 {
        (self as f64).abs()
    }
}

impl Sample for Complex32 {
    fn magnitude(self) -> f64 {
        self.norm() as f64
    }
}

impl Sample for Complex64 {
    fn magnitude(self) -> f64 {
        self.norm()
    }
}

/// Narrow one sample to the 16-bit wire representation
///
/// Uses Rust's float-to-integer cast: values above 65535 saturate to 65535
/// and NaN becomes 0. Callers must keep magnitudes in `[0, 65535]`; see
/// [`narrowing_overflow_count`] to detect samples that were clamped.
///
/// # Examples
///
/// ```
/// use mlc_tracking_rust::protocol::message::narrow_sample;
///
/// assert_eq!(narrow_sample(-12.7f32), 12);
/// assert_eq!(narrow_sample(70_000.0f64), u16::MAX);
/// ```
pub fn narrow_sample<A: Sample>(sample: A) -> u16 {
    sample.magnitude() as u16
}

/// Count samples whose magnitude falls outside the 16-bit range
pub fn narrowing_overflow_count<A: Sample>(image: &ArrayViewD<'_, A>) -> usize {
    image
        .iter()
        .filter(|s| {
            let m = s.magnitude();
            m.is_nan() || m > u16::MAX as f64
        })
        .count()
}

/// Payload size in bytes of a `width` x `height` image
///
/// # Errors
///
/// - [`TrackingError::InvalidSize`] - the payload does not fit the 32-bit
///   `payload_byte_count` field
pub fn payload_size(width: usize, height: usize) -> Result<usize> {
    width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(BYTES_PER_SAMPLE))
        .filter(|&n| n <= u32::MAX as usize)
        .ok_or_else(|| TrackingError::InvalidSize {
            expected: u32::MAX as usize,
            actual: width.saturating_mul(height).saturating_mul(BYTES_PER_SAMPLE),
        })
}

/// Total encoded size of a message carrying a `side` x `side` image
///
/// # Errors
///
/// - [`TrackingError::InvalidSize`] - the payload of such a message cannot be
///   described on the wire
///
/// # Examples
///
/// ```
/// use mlc_tracking_rust::protocol::message::message_size;
///
/// assert_eq!(message_size(64)?, 72 + 64 * 64 * 2);
/// assert!(message_size(usize::MAX).is_err());
/// # Ok::<(), mlc_tracking_rust::TrackingError>(())
/// ```
pub fn message_size(side: usize) -> Result<usize> {
    Ok(TrackingHeader::SIZE + payload_size(side, side)?)
}

/// One complete tracking message
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingMessage {
    /// Fixed 72-byte header
    pub header: TrackingHeader,
    /// Magnitude samples in row-major order of the source image
    pub pixels: Vec<u16>,
}

impl TrackingMessage {
    /// Build a message from frame metadata, session geometry and an image
    ///
    /// Width and height are scaled by `upsample_ratio` before the voxel sizes
    /// are derived. The image is flattened in logical row-major order and
    /// each sample narrowed with [`narrow_sample`].
    ///
    /// # Errors
    ///
    /// - [`TrackingError::InvalidSize`] - the image does not hold exactly
    ///   `width * height` samples after upsampling, or a dimension or the
    ///   payload does not fit its 32-bit wire field
    /// - [`TrackingError::InvalidConfig`] - `upsample_ratio` overflows the
    ///   frame dimensions
    ///
    /// # Examples
    ///
    /// ```
    /// use mlc_tracking_rust::protocol::{FrameMetadata, SessionGeometry, TrackingMessage};
    /// use ndarray::ArrayD;
    ///
    /// let meta = FrameMetadata {
    ///     slice_position_sagittal: 0.0,
    ///     slice_position_coronal: 0.0,
    ///     slice_position_transverse: 0.0,
    ///     width: 2,
    ///     height: 2,
    /// };
    /// let fov = SessionGeometry { fov_x: 256.0, fov_y: 256.0, fov_z: 5.0 };
    /// let image = ArrayD::from_shape_vec(vec![2, 2], vec![1.0f32, -2.0, 3.0, 4.0])?;
    ///
    /// let msg = TrackingMessage::from_parts(&meta, &fov, image.view(), 1)?;
    /// assert_eq!(msg.pixels, vec![1, 2, 3, 4]);
    /// assert_eq!(msg.header.payload_byte_count, 8);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_parts<A: Sample>(
        frame: &FrameMetadata,
        session: &SessionGeometry,
        image: ArrayViewD<'_, A>,
        upsample_ratio: u32,
    ) -> Result<Self> {
        let frame = frame.upsampled(upsample_ratio)?;
        let payload_byte_count = payload_size(frame.width, frame.height)?;
        let derived = DerivedGeometry::compute(session, frame.width, frame.height);

        let pixel_count = payload_byte_count / BYTES_PER_SAMPLE;
        if image.len() != pixel_count {
            return Err(TrackingError::InvalidSize {
                expected: pixel_count,
                actual: image.len(),
            });
        }

        let overflow = narrowing_overflow_count(&image);
        if overflow > 0 {
            warn!(
                samples = overflow,
                "Pixel magnitudes outside the 16-bit range were saturated"
            );
        }

        let pixels: Vec<u16> = image.iter().map(|&s| narrow_sample(s)).collect();

        let header = TrackingHeader {
            header_byte_count: HEADER_BYTE_COUNT,
            payload_byte_count: to_wire_u32(payload_byte_count)?,
            slice_position_sagittal: frame.slice_position_sagittal,
            slice_position_coronal: frame.slice_position_coronal,
            slice_position_transverse: frame.slice_position_transverse,
            voxel_size_z: derived.voxel_size_z,
            inter_slice_spacing: derived.inter_slice_spacing,
            voxel_size_x: derived.voxel_size_x,
            voxel_size_y: derived.voxel_size_y,
            width: to_wire_i32(frame.width)?,
            height: to_wire_i32(frame.height)?,
        };

        Ok(TrackingMessage { header, pixels })
    }

    /// Encode the complete message to bytes
    ///
    /// # Returns
    /// 72-byte prefix followed by `2 * pixels.len()` payload bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(TrackingHeader::SIZE + self.pixels.len() * BYTES_PER_SAMPLE);
        self.header.encode_into(&mut buf);
        for &px in &self.pixels {
            buf.put_u16_le(px);
        }

        trace!(bytes = buf.len(), "Tracking message encoded");
        buf
    }

    /// Decode one message for a known `side` x `side` grid
    ///
    /// The protocol carries no length prefix of its own, so the receiver
    /// must know the grid size. Only the first [`message_size`]`(side)`
    /// bytes of `data` are read. A header whose width and height disagree
    /// with `side` is logged but still decoded.
    ///
    /// # Errors
    ///
    /// - [`TrackingError::InvalidSize`] - `data` is shorter than one message,
    ///   or `side` is too large to describe on the wire
    pub fn decode(data: &[u8], side: usize) -> Result<Self> {
        let expected = message_size(side)?;
        if data.len() < expected {
            return Err(TrackingError::InvalidSize {
                expected,
                actual: data.len(),
            });
        }

        let header = TrackingHeader::decode(data)?;
        if header.pixel_count() != side * side {
            warn!(
                width = header.width,
                height = header.height,
                side = side,
                "Header dimensions disagree with the configured grid side"
            );
        }

        let mut payload = &data[TrackingHeader::SIZE..expected];
        let mut pixels = Vec::with_capacity(side * side);
        while payload.has_remaining() {
            pixels.push(payload.get_u16_le());
        }

        Ok(TrackingMessage { header, pixels })
    }

    /// View the pixels as a `side` x `side` image
    ///
    /// # Errors
    ///
    /// - [`TrackingError::ShapeMismatch`] - pixel count is not `side * side`
    pub fn image(&self, side: usize) -> Result<Array2<u16>> {
        Array2::from_shape_vec((side, side), self.pixels.clone()).map_err(|_| {
            TrackingError::ShapeMismatch {
                expected: vec![side, side],
                actual: self.pixels.len(),
            }
        })
    }
}

fn to_wire_i32(value: usize) -> Result<i32> {
    i32::try_from(value).map_err(|_| TrackingError::InvalidSize {
        expected: i32::MAX as usize,
        actual: value,
    })
}

fn to_wire_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| TrackingError::InvalidSize {
        expected: u32::MAX as usize,
        actual: value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    fn meta(width: usize, height: usize) -> FrameMetadata {
        FrameMetadata {
            slice_position_sagittal: 10.0,
            slice_position_coronal: -20.5,
            slice_position_transverse: 3.75,
            width,
            height,
        }
    }

    const FOV: SessionGeometry = SessionGeometry {
        fov_x: 256.0,
        fov_y: 256.0,
        fov_z: 5.0,
    };

    #[test]
    fn test_superresolved_frame_header() {
        let image = ArrayD::<f32>::zeros(IxDyn(&[256, 256, 1, 1]));
        let msg = TrackingMessage::from_parts(&meta(64, 64), &FOV, image.view(), 4).unwrap();

        assert_eq!(msg.header.width, 256);
        assert_eq!(msg.header.height, 256);
        assert_eq!(msg.header.voxel_size_x, 0.5);
        assert_eq!(msg.header.voxel_size_y, 1.0);
        assert_eq!(msg.header.voxel_size_z, 5.0);
        assert_eq!(msg.header.inter_slice_spacing, 0.0);
        assert_eq!(msg.header.header_byte_count, 64);
        assert_eq!(msg.header.payload_byte_count, 131_072);
        assert_eq!(msg.encode().len(), 72 + 131_072);
    }

    #[test]
    fn test_pixel_count_mismatch() {
        let image = ArrayD::<f32>::zeros(IxDyn(&[64, 64]));
        let result = TrackingMessage::from_parts(&meta(64, 64), &FOV, image.view(), 4);
        assert!(matches!(
            result,
            Err(TrackingError::InvalidSize {
                expected: 65_536,
                actual: 4096
            })
        ));
    }

    #[test]
    fn test_huge_upsample_ratio_is_rejected() {
        let image = ArrayD::<f32>::zeros(IxDyn(&[64, 64]));
        let result = TrackingMessage::from_parts(&meta(64, 64), &FOV, image.view(), u32::MAX);
        assert!(matches!(
            result,
            Err(TrackingError::InvalidSize { .. }) | Err(TrackingError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_oversized_dimensions() {
        assert_eq!(payload_size(256, 256).unwrap(), 131_072);
        assert!(matches!(
            payload_size(1 << 16, 1 << 16),
            Err(TrackingError::InvalidSize {
                expected: 4_294_967_295,
                ..
            })
        ));
        assert!(payload_size(usize::MAX, 2).is_err());
        assert!(message_size(usize::MAX).is_err());
        assert!(TrackingMessage::decode(&[0u8; 80], usize::MAX).is_err());
    }

    #[test]
    fn test_empty_payload_still_has_header() {
        let image = ArrayD::<f32>::zeros(IxDyn(&[0, 0]));
        let msg = TrackingMessage::from_parts(&meta(0, 0), &FOV, image.view(), 1).unwrap();
        assert_eq!(msg.header.payload_byte_count, 0);
        assert!(msg.pixels.is_empty());
        assert_eq!(msg.encode().len(), TrackingHeader::SIZE);
    }

    #[test]
    fn test_complex_samples_use_modulus() {
        let image = ArrayD::from_shape_vec(
            IxDyn(&[1, 2]),
            vec![Complex32::new(3.0, 4.0), Complex32::new(-6.0, 8.0)],
        )
        .unwrap();
        let msg = TrackingMessage::from_parts(&meta(1, 2), &FOV, image.view(), 1).unwrap();
        assert_eq!(msg.pixels, vec![5, 10]);
    }

    #[test]
    fn test_narrowing_saturates() {
        assert_eq!(narrow_sample(65_535.9f64), 65_535);
        assert_eq!(narrow_sample(1.0e9f64), u16::MAX);
        assert_eq!(narrow_sample(-1.0e9f64), u16::MAX);
        assert_eq!(narrow_sample(f64::NAN), 0);
        assert_eq!(narrow_sample(0.99f32), 0);

        let image = ArrayD::from_shape_vec(IxDyn(&[3]), vec![1.0f64, 70_000.0, f64::NAN]).unwrap();
        assert_eq!(narrowing_overflow_count(&image.view()), 2);
    }

    #[test]
    fn test_encode_decode() {
        let data: Vec<f32> = (0..16).map(|v| v as f32 * 100.0).collect();
        let image = ArrayD::from_shape_vec(IxDyn(&[4, 4]), data).unwrap();
        let original = TrackingMessage::from_parts(&meta(4, 4), &FOV, image.view(), 1).unwrap();

        let encoded = original.encode();
        assert_eq!(encoded.len(), message_size(4).unwrap());

        let decoded = TrackingMessage::decode(&encoded, 4).unwrap();
        assert_eq!(decoded, original);

        let grid = decoded.image(4).unwrap();
        assert_eq!(grid[[0, 1]], 100);
        assert_eq!(grid[[3, 3]], 1500);
    }

    #[test]
    fn test_decode_short_buffer() {
        let result = TrackingMessage::decode(&[0u8; 80], 4);
        assert!(matches!(
            result,
            Err(TrackingError::InvalidSize {
                expected: 104,
                actual: 80
            })
        ));
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let image = ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![1u16, 2, 3, 4]).unwrap();
        let msg = TrackingMessage::from_parts(&meta(2, 2), &FOV, image.view(), 1).unwrap();
        let mut bytes = msg.encode();
        bytes.extend_from_slice(&[0xAA; 10]);

        let decoded = TrackingMessage::decode(&bytes, 2).unwrap();
        assert_eq!(decoded.pixels, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_image_shape_mismatch() {
        let msg = TrackingMessage {
            header: TrackingHeader::decode(&[0u8; 72]).unwrap(),
            pixels: vec![0; 3],
        };
        assert!(matches!(
            msg.image(2),
            Err(TrackingError::ShapeMismatch { actual: 3, .. })
        ));
    }
}
