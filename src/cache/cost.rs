//! Cost Policy Module
//!
//! Computes the cost of a value when the caller does not supply one.

use std::sync::Arc;

/// Cost function applied to values stored without an explicit cost.
pub type CostFn<V> = Arc<dyn Fn(&V) -> u64 + Send + Sync>;

/// Default policy: every value costs nothing.
pub fn zero_cost<V>() -> CostFn<V> {
    Arc::new(|_| 0)
}

// == Pixel Footprint ==
/// Image-shaped values whose decoded size is known from their dimensions.
pub trait PixelFootprint {
    /// Width in points.
    fn width(&self) -> f64;
    /// Height in points.
    fn height(&self) -> f64;
    /// Points to pixels scale factor.
    fn scale(&self) -> f64 {
        1.0
    }
}

impl<T: PixelFootprint + ?Sized> PixelFootprint for Arc<T> {
    fn width(&self) -> f64 {
        (**self).width()
    }

    fn height(&self) -> f64 {
        (**self).height()
    }

    fn scale(&self) -> f64 {
        (**self).scale()
    }
}

/// Approximates decoded memory as `width * height * scale`, truncated.
///
/// Negative or non-finite products cost zero.
pub fn pixel_cost<V: PixelFootprint + ?Sized>(value: &V) -> u64 {
    let area = value.width() * value.height() * value.scale();
    if area.is_finite() && area > 0.0 {
        area as u64
    } else {
        0
    }
}

/// Resolves the cost to record: an explicit positive cost wins, otherwise the policy decides.
pub(crate) fn resolve_cost<V>(explicit: u64, value: &V, policy: &CostFn<V>) -> u64 {
    if explicit > 0 {
        explicit
    } else {
        policy(value)
    }
}
