use std::path::{Path, PathBuf};

use thiserror::Error;

/// Every way a load → transform → dump cycle can fail.
///
/// Messages carry the offending file path(s) so a failed invocation can be
/// traced back to its inputs without extra context.
#[derive(Debug, Error)]
pub enum TransformerError {
    /// Unsupported rank or an array whose shape cannot be reconciled.
    #[error("shape error: {0}")]
    Shape(String),

    /// Mask does not reduce to a single volume matching the input grid.
    #[error("mask error: {0}")]
    Mask(String),

    /// Mask and input affines differ beyond tolerance.
    #[error("Affine mismatch between \"{}\" and \"{}\"", .in_file.display(), .mask_file.display())]
    Alignment { in_file: PathBuf, mask_file: PathBuf },

    /// A tabular cell is not a real number.
    #[error("cannot convert {value:?} to a number in \"{}\" (row {row}, column {column})", .path.display())]
    Coercion {
        path: PathBuf,
        row: usize,
        column: usize,
        value: String,
    },

    /// The transform hook was never provided.
    #[error("transform \"{0}\" is not implemented")]
    NotImplemented(String),

    /// File content does not follow the expected layout.
    #[error("invalid format in \"{}\": {message}", .path.display())]
    InvalidFormat { path: PathBuf, message: String },

    #[error("I/O error on \"{}\": {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TransformerError>;

impl TransformerError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        TransformerError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn invalid(path: &Path, message: impl Into<String>) -> Self {
        TransformerError::InvalidFormat {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}
