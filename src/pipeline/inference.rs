//! Inference engine boundary
//!
//! The super-resolution model is an external collaborator. This module
//! defines what the pipeline needs from it: a synchronous
//! `infer(tensor) -> tensor` call, a warm-up pass, and the tensor shapes the
//! model was trained for.

use crate::error::{Result, TrackingError};
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Compute device a tensor is placed on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Host memory
    #[default]
    Cpu,
    /// CUDA GPU with the given device index
    Cuda(usize),
}

impl Device {
    /// Check if this device is a GPU
    pub fn is_gpu(&self) -> bool {
        matches!(self, Device::Cuda(_))
    }
}

/// A real-valued tensor tagged with the device it lives on
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    /// Tensor values
    pub data: ArrayD<f32>,
    /// Placement of the values
    pub device: Device,
}

impl Tensor {
    /// Wrap `data` as a tensor on `device`
    pub fn new(data: ArrayD<f32>, device: Device) -> Self {
        Tensor { data, device }
    }

    /// Zero tensor of the given shape
    pub fn zeros(shape: &[usize], device: Device) -> Self {
        Tensor {
            data: ArrayD::zeros(IxDyn(shape)),
            device,
        }
    }

    /// Shape of the tensor
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }
}

/// Input and output shapes of a model
///
/// `input` is the `(batch, channel, height, width)` tensor fed to the model;
/// `output` is the shape the result is reshaped to before encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDimensions {
    /// Model input shape
    pub input: [usize; 4],
    /// Shape of the post-transformed model output
    pub output: Vec<usize>,
}

impl Default for ModelDimensions {
    /// 4x super-resolution from a 64 x 64 acquisition to 256 x 256
    fn default() -> Self {
        ModelDimensions {
            input: [1, 1, 64, 64],
            output: vec![256, 256, 1, 1],
        }
    }
}

impl ModelDimensions {
    /// Element count of the output shape
    pub fn output_len(&self) -> usize {
        self.output.iter().product()
    }

    /// Reject empty, zero-sized, or overflowing shapes
    pub fn validate(&self) -> Result<()> {
        if self.input.iter().any(|&d| d == 0) {
            return Err(TrackingError::InvalidConfig(format!(
                "model input shape has a zero dimension: {:?}",
                self.input
            )));
        }
        if self.output.is_empty() || self.output.iter().any(|&d| d == 0) {
            return Err(TrackingError::InvalidConfig(format!(
                "model output shape is empty or zero-sized: {:?}",
                self.output
            )));
        }
        let fits = |shape: &[usize]| {
            shape
                .iter()
                .try_fold(1usize, |n, &d| n.checked_mul(d))
                .is_some()
        };
        if !fits(&self.input) || !fits(&self.output) {
            return Err(TrackingError::InvalidConfig(format!(
                "model shape element count overflows: {:?} -> {:?}",
                self.input, self.output
            )));
        }
        Ok(())
    }
}

/// Opaque inference capability
///
/// Implementations load and own the model. Failures are fatal for the frame
/// being processed.
pub trait InferenceEngine {
    /// Run one forward pass
    fn infer(&mut self, input: Tensor) -> Result<Tensor>;

    /// Run one throwaway forward pass so the first real frame is not slowed
    /// down by lazy initialisation on the device
    fn warm_up(&mut self, dims: &ModelDimensions, device: Device) -> Result<()> {
        info!(device = ?device, input = ?dims.input, "Warming up inference engine");
        let start = Instant::now();
        self.infer(Tensor::zeros(&dims.input, device))?;
        debug!(elapsed_ms = start.elapsed().as_secs_f64() * 1e3, "Warm-up done");
        Ok(())
    }
}

impl<F> InferenceEngine for F
where
    F: FnMut(Tensor) -> Result<Tensor>,
{
    fn infer(&mut self, input: Tensor) -> Result<Tensor> {
        self(input)
    }
}
