//! Geometric transforms between frame arrays and model tensors
//!
//! Frames arrive as complex arrays with trailing singleton axes, in the
//! orientation of the reconstruction. The tracking consumer and the model
//! both expect the in-plane image rotated by 180 degrees.

use crate::error::{Result, TrackingError};
use crate::pipeline::inference::{Device, Tensor};
use crate::protocol::Sample;
use ndarray::{ArrayD, Axis, IxDyn};
use tracing::trace;

/// Remove every axis of length one
///
/// An array made only of singleton axes becomes zero-dimensional.
pub fn squeeze<A>(mut array: ArrayD<A>) -> ArrayD<A> {
    for axis in (0..array.ndim()).rev() {
        if array.len_of(Axis(axis)) == 1 {
            array = array.remove_axis(Axis(axis));
        }
    }
    array
}

/// Insert a leading axis of length one
pub fn unsqueeze<A>(array: ArrayD<A>) -> ArrayD<A> {
    array.insert_axis(Axis(0))
}

/// Elementwise magnitude as `f32`
///
/// Complex input loses its phase; this is intended for display and tracking.
pub fn magnitude<A: Sample>(array: &ArrayD<A>) -> ArrayD<f32> {
    array.mapv(|s| s.magnitude() as f32)
}

/// Rotate the plane spanned by axes 0 and 1 by 180 degrees
///
/// Equivalent to two quarter turns. Remaining axes are untouched.
///
/// # Errors
///
/// - [`TrackingError::ShapeMismatch`] - the array has fewer than two axes
///
/// # Examples
///
/// ```
/// use mlc_tracking_rust::pipeline::transform::rotate_180;
/// use ndarray::arr2;
///
/// let a = arr2(&[[1, 2], [3, 4]]).into_dyn();
/// let r = rotate_180(&a)?;
/// assert_eq!(r, arr2(&[[4, 3], [2, 1]]).into_dyn());
/// # Ok::<(), mlc_tracking_rust::TrackingError>(())
/// ```
pub fn rotate_180<A: Clone>(array: &ArrayD<A>) -> Result<ArrayD<A>> {
    if array.ndim() < 2 {
        return Err(TrackingError::ShapeMismatch {
            expected: vec![0, 0],
            actual: array.len(),
        });
    }

    let mut view = array.view();
    view.invert_axis(Axis(0));
    view.invert_axis(Axis(1));
    Ok(view.as_standard_layout().into_owned())
}

/// Reshape to `shape` in row-major order
///
/// # Errors
///
/// - [`TrackingError::ShapeMismatch`] - element count differs from the
///   product of `shape`; nothing is truncated or padded
pub fn reshape<A: Clone>(array: ArrayD<A>, shape: &[usize]) -> Result<ArrayD<A>> {
    let expected: usize = shape.iter().product();
    if array.len() != expected {
        return Err(TrackingError::ShapeMismatch {
            expected: shape.to_vec(),
            actual: array.len(),
        });
    }

    let actual = array.len();
    array
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order(IxDyn(shape))
        .map_err(|_| TrackingError::ShapeMismatch {
            expected: shape.to_vec(),
            actual,
        })
}

/// Prepare a raw frame for inference
///
/// Squeezes singleton axes, takes the magnitude, rotates by 180 degrees, and
/// adds batch and channel axes to give `(1, 1, height, width)`. No intensity
/// scaling is applied.
///
/// # Errors
///
/// - [`TrackingError::ShapeMismatch`] - the squeezed frame is not 2D
pub fn pretransform<A: Sample>(raw: &ArrayD<A>, device: Device) -> Result<Tensor> {
    let plane = squeeze(magnitude(raw));
    if plane.ndim() != 2 {
        return Err(TrackingError::ShapeMismatch {
            expected: vec![0, 0],
            actual: plane.len(),
        });
    }

    let rotated = rotate_180(&plane)?;
    let batched = unsqueeze(unsqueeze(rotated));
    trace!(shape = ?batched.shape(), device = ?device, "Pretransformed frame");

    Ok(Tensor::new(batched, device))
}

/// Bring a model output back to host memory in the declared output shape
///
/// # Errors
///
/// - [`TrackingError::ShapeMismatch`] - the output element count does not
///   match `shape`
pub fn posttransform(tensor: Tensor, shape: &[usize]) -> Result<ArrayD<f32>> {
    if tensor.device.is_gpu() {
        trace!(device = ?tensor.device, "Copying model output to host");
    }
    reshape(tensor.data, shape)
}

/// Orientation-only transform used when no model is involved
///
/// Normalises the frame to four axes (trailing singleton axes are added or
/// removed) and rotates it by 180 degrees. Samples keep their type; complex
/// data stays complex.
///
/// # Errors
///
/// - [`TrackingError::ShapeMismatch`] - axes beyond the fourth are not all
///   singleton, or the frame has fewer than two axes
pub fn passthrough_transform<A: Clone>(raw: &ArrayD<A>) -> Result<ArrayD<A>> {
    let mut shape: Vec<usize> = raw.shape().iter().take(4).copied().collect();
    shape.resize(4, 1);

    let normalised = reshape(raw.clone(), &shape)?;
    rotate_180(&normalised)
}
