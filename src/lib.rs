//! MLC Tracking Protocol Implementation in Rust
//!
//! This library streams reconstructed MR frames through a per-frame image
//! pipeline and forwards each result, packed into a fixed binary layout, to
//! an external tracking consumer over one persistent TCP connection. It also
//! provides the receiving side of that wire format.
//!
//! # Features
//!
//! - **Fixed binary layout** - 72-byte prefix plus 16-bit magnitude samples
//! - **Stream reassembly** - Correct message boundaries for any chunking
//! - **Pipeline variants** - Pass-through or model-backed super-resolution
//! - **Fail-fast sessions** - No partial message ever reaches the wire
//! - **Synchronous and asynchronous receivers** - Blocking std or Tokio
//!
//! # Quick Start
//!
//! ## Sending Frames
//!
//! ```no_run
//! use mlc_tracking_rust::config::TrackingConfig;
//! use mlc_tracking_rust::pipeline::{PassThroughPipeline, ReplaySource, SessionHeader, TrackingSession};
//!
//! let source = ReplaySource::new(SessionHeader::with_fov(256.0, 256.0, 5.0), vec![]);
//! let mut session = TrackingSession::new(source, PassThroughPipeline);
//!
//! let summary = session.run(&TrackingConfig::default())?;
//! println!("sent {} frames", summary.frames);
//! # Ok::<(), mlc_tracking_rust::TrackingError>(())
//! ```
//!
//! ## Receiving Messages
//!
//! ```no_run
//! use mlc_tracking_rust::io::TrackingReceiver;
//!
//! let receiver = TrackingReceiver::bind("localhost:31000", 256)?;
//! let mut conn = receiver.accept()?;
//! while let Some(msg) = conn.receive()? {
//!     println!("{:?}", msg.header);
//! }
//! # Ok::<(), mlc_tracking_rust::TrackingError>(())
//! ```
//!
//! # Architecture
//!
//! ## Module Structure
//!
//! - **`protocol`** - Wire format, no I/O
//!   - `header` - Fixed 72-byte prefix
//!   - `geometry` - Frame/session geometry and voxel-size derivation
//!   - `message` - Header plus pixel payload, encode and decode
//!   - `reassembler` - Byte stream to message boundaries
//!
//! - **`pipeline`** - Per-frame processing
//!   - `frame` - Frames, session headers, metadata extraction
//!   - `transform` - Orientation and shape helpers
//!   - `normalisation` - Reversible intensity scaling
//!   - `inference` - Inference engine boundary and warm-up
//!   - `variant` - `PassThroughPipeline` / `SuperResolutionPipeline`
//!   - `session` - Sequential source-to-wire loop
//!
//! - **`io`** - Network I/O layer
//!   - `TrackingClient` - Outbound connection with scoped close
//!   - `TrackingReceiver` / `AsyncTrackingReceiver` - Listeners
//!
//! - **`config`** - JSON-backed sender and receiver settings
//!
//! - **`error`** - Error handling
//!   - `TrackingError` - Unified error type for all operations
//!   - `Result<T>` - Type alias for `Result<T, TrackingError>`
//!
//! # Wire Format
//!
//! All fields little-endian, no padding:
//!
//! | Field | Type |
//! |---|---|
//! | header_byte_count (always 64) | u32 |
//! | payload_byte_count | u32 |
//! | slice position sagittal, coronal, transverse | 3 x f64 |
//! | voxel_size_z, inter_slice_spacing, voxel_size_x, voxel_size_y | 4 x f64 |
//! | width, height | 2 x i32 |
//! | pixels | u16 x width x height |
//!
//! The message carries no length of its own beyond width and height, so a
//! receiver must be told the grid side.

pub mod config;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod protocol;

// Re-export commonly used types
pub use error::{Result, TrackingError};
