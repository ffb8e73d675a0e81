//! volutab - format-preserving array transformer
//!
//! Loads a NIfTI volume series or a delimited text table into one
//! observations × variables `f64` array, hands it to a caller-supplied
//! [`Transform`], and writes the result back in the input's format:
//!
//! - **NIfTI** (`.nii`, `.nii.gz`): rows are volumes, columns are voxels
//!   (optionally restricted to a mask); header and affine are reused and the
//!   output is float64.
//! - **Tables** (anything else): rows and columns as read; the output is
//!   tab-separated with the input's column labels and `n/a` for missing
//!   values.
//!
//! ```no_run
//! use volutab::{Transformer, TransformerInputs, ZScore};
//!
//! let out = Transformer::new(ZScore)
//!     .run(&TransformerInputs::new("sub-01_bold.nii.gz").with_mask("brain_mask.nii.gz"))?;
//! println!("{}", out.display());
//! # Ok::<(), volutab::TransformerError>(())
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod transform;

pub use config::TransformerConfig;
pub use data::model::{CanonicalArray, FormatFamily, LoadContext};
pub use error::{Result, TransformerError};
pub use pipeline::{Transformer, TransformerInputs};
pub use transform::{from_fn, Demean, FnTransform, Identity, Transform, ZScore};
