//! Pipeline variants
//!
//! Every variant turns a raw frame array into the image that gets encoded
//! and displayed. The set is closed: [`PassThroughPipeline`] only reorients
//! the frame, [`SuperResolutionPipeline`] runs it through a model.

use crate::config::TrackingConfig;
use crate::error::Result;
use crate::pipeline::inference::{Device, InferenceEngine, ModelDimensions};
use crate::pipeline::normalisation::{IdentityNormalisation, Normalisation};
use crate::pipeline::transform::{passthrough_transform, posttransform, pretransform};
use crate::protocol::Sample;
use ndarray::ArrayD;
use num_complex::Complex32;
use std::time::Instant;
use tracing::{debug, info};

/// Per-frame image processing shared by all pipeline variants
pub trait ImagePipeline {
    /// Sample type of the processed image
    type Output: Sample;

    /// Factor between the processed grid and the acquisition grid
    fn upsample_ratio(&self) -> u32;

    /// Process one raw frame array
    fn process(&mut self, raw: &ArrayD<Complex32>) -> Result<ArrayD<Self::Output>>;
}

/// Reorients frames without any model; the grid is unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughPipeline;

impl ImagePipeline for PassThroughPipeline {
    type Output = Complex32;

    fn upsample_ratio(&self) -> u32 {
        1
    }

    fn process(&mut self, raw: &ArrayD<Complex32>) -> Result<ArrayD<Complex32>> {
        passthrough_transform(raw)
    }
}

/// Runs frames through a super-resolution model
///
/// pretransform, normalise, infer, denormalise, posttransform.
pub struct SuperResolutionPipeline<E, N = IdentityNormalisation> {
    engine: E,
    normalisation: N,
    dimensions: ModelDimensions,
    device: Device,
    upsample_ratio: u32,
}

impl<E: InferenceEngine> SuperResolutionPipeline<E, IdentityNormalisation> {
    /// Build the pipeline and warm the engine up
    ///
    /// # Errors
    ///
    /// - [`TrackingError::InvalidConfig`](crate::error::TrackingError::InvalidConfig) -
    ///   invalid model dimensions
    /// - Any error the engine returns from its warm-up pass
    pub fn new(
        mut engine: E,
        dimensions: ModelDimensions,
        device: Device,
        upsample_ratio: u32,
    ) -> Result<Self> {
        dimensions.validate()?;
        engine.warm_up(&dimensions, device)?;
        info!(
            input = ?dimensions.input,
            output = ?dimensions.output,
            upsample_ratio = upsample_ratio,
            "Super-resolution pipeline ready"
        );

        Ok(SuperResolutionPipeline {
            engine,
            normalisation: IdentityNormalisation,
            dimensions,
            device,
            upsample_ratio,
        })
    }

    /// Build the pipeline from the model section of a [`TrackingConfig`]
    ///
    /// The whole config is validated before the engine is warmed up.
    pub fn from_config(engine: E, config: &TrackingConfig) -> Result<Self> {
        config.validate()?;
        Self::new(
            engine,
            config.model_dimensions.clone(),
            config.device,
            config.upsample_ratio,
        )
    }
}

impl<E: InferenceEngine, N: Normalisation> SuperResolutionPipeline<E, N> {
    /// Replace the normalisation stage
    pub fn with_normalisation<M: Normalisation>(
        self,
        normalisation: M,
    ) -> SuperResolutionPipeline<E, M> {
        SuperResolutionPipeline {
            engine: self.engine,
            normalisation,
            dimensions: self.dimensions,
            device: self.device,
            upsample_ratio: self.upsample_ratio,
        }
    }

    /// Model dimensions in use
    pub fn dimensions(&self) -> &ModelDimensions {
        &self.dimensions
    }
}

impl<E: InferenceEngine, N: Normalisation> ImagePipeline for SuperResolutionPipeline<E, N> {
    type Output = f32;

    fn upsample_ratio(&self) -> u32 {
        self.upsample_ratio
    }

    fn process(&mut self, raw: &ArrayD<Complex32>) -> Result<ArrayD<f32>> {
        let mut input = pretransform(raw, self.device)?;
        input.data = self.normalisation.apply(input.data);

        let start = Instant::now();
        let mut output = self.engine.infer(input)?;
        debug!(
            elapsed_ms = start.elapsed().as_secs_f64() * 1e3,
            shape = ?output.shape(),
            "Inference done"
        );

        output.data = self.normalisation.apply_inverse(output.data);
        posttransform(output, &self.dimensions.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrackingError;
    use crate::pipeline::inference::Tensor;
    use crate::pipeline::normalisation::MinMaxNormalisation;
    use ndarray::{Array, IxDyn};

    fn upsample(factor: usize) -> impl FnMut(Tensor) -> Result<Tensor> {
        move |t: Tensor| {
            let shape = t.shape().to_vec();
            let (h, w) = (shape[2], shape[3]);
            let out = Array::from_shape_fn(IxDyn(&[1, 1, h * factor, w * factor]), |idx| {
                t.data[[0, 0, idx[2] / factor, idx[3] / factor]]
            });
            Ok(Tensor::new(out, t.device))
        }
    }

    fn raw(side: usize) -> ArrayD<Complex32> {
        ArrayD::from_shape_fn(IxDyn(&[side, side, 1, 1]), |idx| {
            Complex32::new((idx[0] * side + idx[1]) as f32, 0.0)
        })
    }

    #[test]
    fn test_passthrough() {
        let mut p = PassThroughPipeline;
        assert_eq!(p.upsample_ratio(), 1);
        let out = p.process(&raw(4)).unwrap();
        assert_eq!(out.shape(), &[4, 4, 1, 1]);
        assert_eq!(out[[0, 0, 0, 0]].re, 15.0);
    }

    #[test]
    fn test_super_resolution() {
        let dims = ModelDimensions {
            input: [1, 1, 4, 4],
            output: vec![8, 8, 1, 1],
        };
        let mut p = SuperResolutionPipeline::new(upsample(2), dims, Device::Cpu, 2).unwrap();
        assert_eq!(p.upsample_ratio(), 2);

        let out = p.process(&raw(4)).unwrap();
        assert_eq!(out.shape(), &[8, 8, 1, 1]);
        assert_eq!(out[[0, 0, 0, 0]], 15.0);
        assert_eq!(out[[7, 7, 0, 0]], 0.0);
    }

    #[test]
    fn test_super_resolution_output_mismatch() {
        let dims = ModelDimensions {
            input: [1, 1, 4, 4],
            output: vec![16, 16, 1, 1],
        };
        let mut p = SuperResolutionPipeline::new(upsample(2), dims, Device::Cpu, 4).unwrap();
        assert!(matches!(
            p.process(&raw(4)),
            Err(TrackingError::ShapeMismatch { actual: 64, .. })
        ));
    }

    #[test]
    fn test_inference_failure_propagates() {
        let failing =
            |_t: Tensor| -> Result<Tensor> { Err(TrackingError::Inference("device lost".into())) };
        let result =
            SuperResolutionPipeline::new(failing, ModelDimensions::default(), Device::Cpu, 4);
        assert!(matches!(result, Err(TrackingError::Inference(_))));
    }

    #[test]
    fn test_from_config_rejects_invalid_config() {
        let calls = std::cell::Cell::new(0);
        let engine = |t: Tensor| -> Result<Tensor> {
            calls.set(calls.get() + 1);
            Ok(t)
        };

        let mut config = TrackingConfig {
            upsample_ratio: 0,
            ..TrackingConfig::default()
        };
        let result = SuperResolutionPipeline::from_config(engine, &config);
        assert!(matches!(result, Err(TrackingError::InvalidConfig(_))));
        assert_eq!(calls.get(), 0);

        config.upsample_ratio = u32::MAX;
        let result = SuperResolutionPipeline::from_config(engine, &config);
        assert!(matches!(result, Err(TrackingError::InvalidConfig(_))));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_normalisation_is_undone() {
        let dims = ModelDimensions {
            input: [1, 1, 4, 4],
            output: vec![4, 4, 1, 1],
        };
        let mut p = SuperResolutionPipeline::new(upsample(1), dims, Device::Cpu, 1)
            .unwrap()
            .with_normalisation(MinMaxNormalisation::new(0.0, 1.0));
        let out = p.process(&raw(4)).unwrap();
        assert_eq!(out[[0, 0, 0, 0]], 15.0);
        assert_eq!(out[[3, 3, 0, 0]], 0.0);
    }
}
