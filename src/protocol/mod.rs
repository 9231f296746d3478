//! Tracking wire protocol
//!
//! This module contains the fixed binary message layout, the geometry it
//! carries, and the receiver-side reassembly logic. Nothing here touches a
//! socket.

pub mod geometry;
pub mod header;
pub mod message;
pub mod reassembler;

// Re-export commonly used types
pub use geometry::{DerivedGeometry, FrameMetadata, SessionGeometry};
pub use header::{TrackingHeader, HEADER_BYTE_COUNT};
pub use message::{message_size, payload_size, Sample, TrackingMessage};
pub use reassembler::StreamReassembler;
