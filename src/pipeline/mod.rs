//! Per-frame processing
//!
//! Frames arrive from a [`FrameSource`], go through one [`ImagePipeline`]
//! variant, and leave as tracking messages plus a display image.

pub mod frame;
pub mod inference;
pub mod normalisation;
pub mod session;
pub mod source;
pub mod transform;
pub mod variant;

pub use frame::{extract_frame, extract_session, AcquisitionHeader, Frame, SessionHeader};
pub use inference::{Device, InferenceEngine, ModelDimensions, Tensor};
pub use normalisation::{
    IdentityNormalisation, MinMaxNormalisation, Normalisation, PercentileNormalisation,
};
pub use session::{MessageSink, SessionSummary, TrackingSession};
pub use source::{DisplayImage, FrameSource, ReplaySource};
pub use variant::{ImagePipeline, PassThroughPipeline, SuperResolutionPipeline};
