//! The transform hook applied between loading and dumping.
//!
//! A transform sees only the canonical observations × variables array. It
//! must return the same number of rows; the dumper additionally needs the
//! same number of columns to restore voxel positions or column labels.

use ndarray::Axis;

use crate::data::model::CanonicalArray;
use crate::error::{Result, TransformerError};

/// Array → array operation supplied to a [`Transformer`](crate::Transformer).
///
/// The provided `transform` reports [`TransformerError::NotImplemented`], so
/// an implementor that only names itself fails loudly instead of passing
/// data through.
pub trait Transform {
    fn name(&self) -> &str;

    fn transform(&self, array: CanonicalArray) -> Result<CanonicalArray> {
        let _ = array;
        Err(TransformerError::NotImplemented(self.name().to_string()))
    }
}

impl<T: Transform + ?Sized> Transform for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn transform(&self, array: CanonicalArray) -> Result<CanonicalArray> {
        (**self).transform(array)
    }
}

impl<T: Transform + ?Sized> Transform for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn transform(&self, array: CanonicalArray) -> Result<CanonicalArray> {
        (**self).transform(array)
    }
}

/// Adapter turning a closure into a [`Transform`].
pub struct FnTransform<F> {
    name: String,
    f: F,
}

/// Wrap `f` as a named transform.
pub fn from_fn<F>(name: impl Into<String>, f: F) -> FnTransform<F>
where
    F: Fn(CanonicalArray) -> Result<CanonicalArray>,
{
    FnTransform {
        name: name.into(),
        f,
    }
}

impl<F> Transform for FnTransform<F>
where
    F: Fn(CanonicalArray) -> Result<CanonicalArray>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, array: CanonicalArray) -> Result<CanonicalArray> {
        (self.f)(array)
    }
}

// ---------------------------------------------------------------------------
// Reference transforms
// ---------------------------------------------------------------------------

/// Returns its input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Transform for Identity {
    fn name(&self) -> &str {
        "identity"
    }

    fn transform(&self, array: CanonicalArray) -> Result<CanonicalArray> {
        Ok(array)
    }
}

/// Mean of each column, skipping NaN. `None` when the column has no values.
fn column_means(array: &CanonicalArray) -> Vec<Option<f64>> {
    array
        .axis_iter(Axis(1))
        .map(|col| {
            let (sum, n) = col
                .iter()
                .filter(|v| !v.is_nan())
                .fold((0.0, 0usize), |(s, n), &v| (s + v, n + 1));
            (n > 0).then(|| sum / n as f64)
        })
        .collect()
}

/// Subtracts each variable's mean over observations.
#[derive(Debug, Clone, Copy, Default)]
pub struct Demean;

impl Transform for Demean {
    fn name(&self) -> &str {
        "demean"
    }

    fn transform(&self, mut array: CanonicalArray) -> Result<CanonicalArray> {
        let means = column_means(&array);
        for (mut col, mean) in array.axis_iter_mut(Axis(1)).zip(means) {
            if let Some(mean) = mean {
                col.mapv_inplace(|v| v - mean);
            }
        }
        Ok(array)
    }
}

/// Standardizes each variable over observations (population SD). Constant
/// variables become zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZScore;

impl Transform for ZScore {
    fn name(&self) -> &str {
        "zscore"
    }

    fn transform(&self, mut array: CanonicalArray) -> Result<CanonicalArray> {
        let means = column_means(&array);
        for (mut col, mean) in array.axis_iter_mut(Axis(1)).zip(means) {
            let Some(mean) = mean else { continue };
            let (ss, n) = col
                .iter()
                .filter(|v| !v.is_nan())
                .fold((0.0, 0usize), |(s, n), &v| (s + (v - mean).powi(2), n + 1));
            let sd = (ss / n as f64).sqrt();
            if sd > 0.0 {
                col.mapv_inplace(|v| (v - mean) / sd);
            } else {
                col.mapv_inplace(|v| if v.is_nan() { v } else { 0.0 });
            }
        }
        Ok(array)
    }
}
