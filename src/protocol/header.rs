//! Tracking message header implementation
//!
//! Every tracking message starts with a fixed 72-byte prefix: two 32-bit size
//! fields followed by the 64-byte geometry header.

use crate::error::{Result, TrackingError};
use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

/// Value of the `header_byte_count` field: 7 x f64 + 2 x i32
pub const HEADER_BYTE_COUNT: u32 = 64;

/// Bytes used by the two leading size fields
pub const SIZE_FIELDS_LEN: usize = 8;

/// Bytes per pixel sample on the wire
pub const BYTES_PER_SAMPLE: usize = 2;

/// Tracking message header (72 bytes fixed size)
///
/// # Header Structure (all numerical values in little-endian)
/// - header_byte_count: u32 (always 64)
/// - payload_byte_count: u32 (2 x width x height)
/// - slice_position_sagittal: f64
/// - slice_position_coronal: f64
/// - slice_position_transverse: f64
/// - voxel_size_z: f64
/// - inter_slice_spacing: f64
/// - voxel_size_x: f64
/// - voxel_size_y: f64
/// - width: i32
/// - height: i32
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackingHeader {
    /// Size of the geometry header in bytes
    pub header_byte_count: u32,
    /// Size of the pixel payload in bytes
    pub payload_byte_count: u32,
    /// Slice position, sagittal (mm)
    pub slice_position_sagittal: f64,
    /// Slice position, coronal (mm)
    pub slice_position_coronal: f64,
    /// Slice position, transverse (mm)
    pub slice_position_transverse: f64,
    /// Slice thickness (mm)
    pub voxel_size_z: f64,
    /// Spacing between slices (mm)
    pub inter_slice_spacing: f64,
    /// Pixel size along x (mm)
    pub voxel_size_x: f64,
    /// Pixel size along y (mm)
    pub voxel_size_y: f64,
    /// Image width in samples
    pub width: i32,
    /// Image height in samples
    pub height: i32,
}

impl Default for TrackingHeader {
    /// Zeroed geometry with the constant header size already filled in
    fn default() -> Self {
        TrackingHeader {
            header_byte_count: HEADER_BYTE_COUNT,
            payload_byte_count: 0,
            slice_position_sagittal: 0.0,
            slice_position_coronal: 0.0,
            slice_position_transverse: 0.0,
            voxel_size_z: 0.0,
            inter_slice_spacing: 0.0,
            voxel_size_x: 0.0,
            voxel_size_y: 0.0,
            width: 0,
            height: 0,
        }
    }
}

impl TrackingHeader {
    /// Prefix size in bytes, size fields included
    pub const SIZE: usize = SIZE_FIELDS_LEN + HEADER_BYTE_COUNT as usize;

    /// Number of pixels declared by width and height
    ///
    /// Negative dimensions count as zero pixels.
    pub fn pixel_count(&self) -> usize {
        let w = usize::try_from(self.width).unwrap_or(0);
        let h = usize::try_from(self.height).unwrap_or(0);
        w * h
    }

    /// Decode a header from a byte slice
    ///
    /// # Arguments
    /// * `buf` - Byte slice containing at least 72 bytes
    ///
    /// # Returns
    /// Decoded header or error if buffer is too short
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(TrackingError::InvalidSize {
                expected: Self::SIZE,
                actual: buf.len(),
            });
        }

        let mut cursor = &buf[..Self::SIZE];

        Ok(TrackingHeader {
            header_byte_count: cursor.get_u32_le(),
            payload_byte_count: cursor.get_u32_le(),
            slice_position_sagittal: cursor.get_f64_le(),
            slice_position_coronal: cursor.get_f64_le(),
            slice_position_transverse: cursor.get_f64_le(),
            voxel_size_z: cursor.get_f64_le(),
            inter_slice_spacing: cursor.get_f64_le(),
            voxel_size_x: cursor.get_f64_le(),
            voxel_size_y: cursor.get_f64_le(),
            width: cursor.get_i32_le(),
            height: cursor.get_i32_le(),
        })
    }

    /// Append the encoded header to `buf`
    pub fn encode_into<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(self.header_byte_count);
        buf.put_u32_le(self.payload_byte_count);

        buf.put_f64_le(self.slice_position_sagittal);
        buf.put_f64_le(self.slice_position_coronal);
        buf.put_f64_le(self.slice_position_transverse);
        buf.put_f64_le(self.voxel_size_z);
        buf.put_f64_le(self.inter_slice_spacing);
        buf.put_f64_le(self.voxel_size_x);
        buf.put_f64_le(self.voxel_size_y);

        buf.put_i32_le(self.width);
        buf.put_i32_le(self.height);
    }

    /// Encode the header into a byte vector
    ///
    /// # Returns
    /// 72-byte vector containing the encoded header
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.encode_into(&mut buf);
        buf.to_vec()
    }
}
