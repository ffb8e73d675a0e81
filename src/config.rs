use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TransformerError};

/// Suffix appended to the input stem when naming the output file.
pub const DEFAULT_SUFFIX: &str = "transformed";

/// Per-run settings shared by the loader and dumper.
///
/// Missing keys in a JSON config fall back to the defaults, so `{}` is a
/// valid configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformerConfig {
    /// Output name is `<stem>_<suffix><ext>`.
    pub suffix: String,
    /// Write a header row when the output is tabular.
    pub write_header: bool,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            suffix: DEFAULT_SUFFIX.to_string(),
            write_header: true,
        }
    }
}

impl TransformerConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| TransformerError::io(path, e))?;
        let config: TransformerConfig = serde_json::from_str(&text)
            .map_err(|e| TransformerError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// The suffix ends up inside a file name, so path separators are refused.
    pub fn validate(&self) -> Result<()> {
        if self.suffix.is_empty() {
            return Err(TransformerError::Config("suffix must not be empty".into()));
        }
        if self.suffix.contains(['/', '\\']) {
            return Err(TransformerError::Config(format!(
                "suffix {:?} must not contain path separators",
                self.suffix
            )));
        }
        Ok(())
    }
}
