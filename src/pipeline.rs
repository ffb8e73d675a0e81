use std::path::{Path, PathBuf};

use log::debug;

use crate::config::TransformerConfig;
use crate::data::model::{CanonicalArray, LoadContext};
use crate::data::{dumper, loader};
use crate::error::{Result, TransformerError};
use crate::transform::Transform;

/// Files handed to one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformerInputs {
    /// Volumetric or tabular input; must exist.
    pub in_file: PathBuf,
    /// Optional mask; a path that does not exist means no mask.
    pub mask: Option<PathBuf>,
}

impl TransformerInputs {
    pub fn new(in_file: impl Into<PathBuf>) -> Self {
        Self {
            in_file: in_file.into(),
            mask: None,
        }
    }

    pub fn with_mask(mut self, mask: impl Into<PathBuf>) -> Self {
        self.mask = Some(mask.into());
        self
    }
}

/// Load → transform → dump around an injected [`Transform`].
///
/// Holds no state between runs; every call to [`run`](Self::run) builds its
/// own [`LoadContext`], so one `Transformer` can serve many inputs.
pub struct Transformer<T> {
    transform: T,
    config: TransformerConfig,
}

impl<T: Transform> Transformer<T> {
    pub fn new(transform: T) -> Self {
        Self {
            transform,
            config: TransformerConfig::default(),
        }
    }

    pub fn with_config(transform: T, config: TransformerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { transform, config })
    }

    pub fn load(&self, in_file: &Path, mask: Option<&Path>) -> Result<(CanonicalArray, LoadContext)> {
        loader::load(in_file, mask)
    }

    pub fn dump(&self, array: &CanonicalArray, ctx: &LoadContext) -> Result<PathBuf> {
        dumper::dump(array, ctx, &self.config)
    }

    /// Run one full cycle and return the absolute output path.
    pub fn run(&self, inputs: &TransformerInputs) -> Result<PathBuf> {
        let (array, ctx) = self.load(&inputs.in_file, inputs.mask.as_deref())?;
        let n_observations = array.nrows();

        debug!(
            "applying {} to {} × {} {:?} array",
            self.transform.name(),
            n_observations,
            array.ncols(),
            ctx.family()
        );
        let transformed = self.transform.transform(array)?;

        if transformed.nrows() != n_observations {
            return Err(TransformerError::Shape(format!(
                "transform {} returned {} rows for {} observations of \"{}\"",
                self.transform.name(),
                transformed.nrows(),
                n_observations,
                inputs.in_file.display()
            )));
        }

        self.dump(&transformed, &ctx)
    }
}
