use std::path::{Path, PathBuf};

use ndarray::Array2;

use super::mask::VoxelMask;
use super::nifti::NiftiHeader;
use super::table::Table;
use crate::error::{Result, TransformerError};

/// Observations (rows) × variables (columns), always `f64`.
pub type CanonicalArray = Array2<f64>;

// ---------------------------------------------------------------------------
// FormatFamily – which codec handles a file
// ---------------------------------------------------------------------------

/// Extensions handled by the volumetric codec. Everything else is tabular.
pub const VOLUMETRIC_EXTENSIONS: [&str; 2] = [".nii", ".nii.gz"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatFamily {
    Volumetric,
    Tabular,
}

impl FormatFamily {
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_ascii_lowercase();
        if VOLUMETRIC_EXTENSIONS.contains(&ext.as_str()) {
            FormatFamily::Volumetric
        } else {
            FormatFamily::Tabular
        }
    }

    pub fn from_path(path: &Path) -> Self {
        let (_, ext) = split_ext(path);
        Self::from_extension(&ext)
    }
}

// ---------------------------------------------------------------------------
// Output naming
// ---------------------------------------------------------------------------

/// Split a path into stem and extension, keeping `.gz` together with the
/// extension before it (`bold.nii.gz` → `bold`, `.nii.gz`).
///
/// The stem keeps the parent directory. Dot-files without a further dot
/// have no extension.
pub fn split_ext(path: &Path) -> (PathBuf, String) {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return (path.to_path_buf(), String::new());
    };

    let mut cut = match name.rfind('.') {
        Some(i) if i > 0 => i,
        _ => return (path.to_path_buf(), String::new()),
    };
    if name[cut..].eq_ignore_ascii_case(".gz") {
        if let Some(i) = name[..cut].rfind('.') {
            if i > 0 {
                cut = i;
            }
        }
    }

    let stem = path.with_file_name(&name[..cut]);
    (stem, name[cut..].to_string())
}

/// Where the dumper writes: `<stem>_<suffix><ext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputName {
    pub stem: PathBuf,
    pub ext: String,
}

impl OutputName {
    pub fn from_input(in_file: &Path) -> Self {
        let (stem, ext) = split_ext(in_file);
        Self { stem, ext }
    }

    /// Absolute output path. The parent directory is canonicalized when it
    /// exists so symlinked working directories resolve the same way.
    pub fn output_path(&self, suffix: &str) -> Result<PathBuf> {
        let mut name = self.stem.clone().into_os_string();
        name.push(format!("_{suffix}{}", self.ext));
        let path = PathBuf::from(name);

        let path = std::path::absolute(&path).map_err(|e| TransformerError::io(&path, e))?;
        match (path.parent(), path.file_name()) {
            (Some(parent), Some(file_name)) => match parent.canonicalize() {
                Ok(parent) => Ok(parent.join(file_name)),
                Err(_) => Ok(path),
            },
            _ => Ok(path),
        }
    }
}

// ---------------------------------------------------------------------------
// LoadContext – side channel from loader to dumper
// ---------------------------------------------------------------------------

/// What the dumper needs to rebuild a NIfTI file.
#[derive(Debug, Clone)]
pub struct VolumeContext {
    pub name: OutputName,
    /// Header of the input image; affine and pixdims are reused verbatim.
    pub header: NiftiHeader,
    /// Raw extension blocks following the header.
    pub extensions: Vec<u8>,
    /// Spatial shape of one volume.
    pub volume_shape: [usize; 3],
    pub mask: Option<VoxelMask>,
}

/// What the dumper needs to rebuild a table.
#[derive(Debug, Clone)]
pub struct TableContext {
    pub name: OutputName,
    pub table: Table,
}

/// Side-channel state for one load → transform → dump cycle.
#[derive(Debug, Clone)]
pub enum LoadContext {
    Volumetric(VolumeContext),
    Tabular(TableContext),
}

impl LoadContext {
    pub fn name(&self) -> &OutputName {
        match self {
            LoadContext::Volumetric(ctx) => &ctx.name,
            LoadContext::Tabular(ctx) => &ctx.name,
        }
    }

    pub fn family(&self) -> FormatFamily {
        match self {
            LoadContext::Volumetric(_) => FormatFamily::Volumetric,
            LoadContext::Tabular(_) => FormatFamily::Tabular,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_ext_keeps_gz_pair() {
        let (stem, ext) = split_ext(Path::new("/data/sub-01_bold.nii.gz"));
        assert_eq!(stem, PathBuf::from("/data/sub-01_bold"));
        assert_eq!(ext, ".nii.gz");

        let (stem, ext) = split_ext(Path::new("confounds.tsv"));
        assert_eq!(stem, PathBuf::from("confounds"));
        assert_eq!(ext, ".tsv");

        let (stem, ext) = split_ext(Path::new("dir.v2/regressors"));
        assert_eq!(stem, PathBuf::from("dir.v2/regressors"));
        assert_eq!(ext, "");

        let (_, ext) = split_ext(Path::new(".hidden"));
        assert_eq!(ext, "");
    }

    #[test]
    fn format_family_by_extension() {
        assert_eq!(FormatFamily::from_path(Path::new("a.nii")), FormatFamily::Volumetric);
        assert_eq!(FormatFamily::from_path(Path::new("a.NII.GZ")), FormatFamily::Volumetric);
        assert_eq!(FormatFamily::from_path(Path::new("a.tsv.gz")), FormatFamily::Tabular);
        assert_eq!(FormatFamily::from_path(Path::new("a.txt")), FormatFamily::Tabular);
    }

    #[test]
    fn output_path_appends_suffix_before_extension() {
        let dir = tempfile::tempdir().unwrap();
        let name = OutputName::from_input(&dir.path().join("bold.nii.gz"));
        let out = name.output_path("transformed").unwrap();

        assert!(out.is_absolute());
        assert_eq!(out.file_name().unwrap(), "bold_transformed.nii.gz");
        assert_eq!(out.parent().unwrap(), dir.path().canonicalize().unwrap());
    }
}
