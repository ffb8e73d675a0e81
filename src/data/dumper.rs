use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use ndarray::{Array4, ArrayD, Axis};
use tempfile::{Builder, NamedTempFile};

use super::model::{CanonicalArray, LoadContext, TableContext, VolumeContext};
use super::nifti::encode_for_path;
use super::table::write_tsv;
use crate::config::TransformerConfig;
use crate::error::{Result, TransformerError};

/// Write `array` in the format family recorded in `ctx` and return the
/// absolute output path.
pub fn dump(array: &CanonicalArray, ctx: &LoadContext, config: &TransformerConfig) -> Result<PathBuf> {
    let out_file = ctx.name().output_path(&config.suffix)?;

    match ctx {
        LoadContext::Volumetric(vol) => dump_volumetric(array, vol, &out_file)?,
        LoadContext::Tabular(tab) => dump_tabular(array, tab, config.write_header, &out_file)?,
    }

    info!("wrote {}", out_file.display());
    Ok(out_file)
}

/// Staging file in `dir`, created with mode 0666 so the process umask
/// decides the final permissions exactly as `File::create` would.
fn staging_file(dir: &Path) -> std::io::Result<NamedTempFile> {
    let mut builder = Builder::new();
    builder.prefix(".volutab-");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    builder.tempfile_in(dir)
}

/// Stage the output next to its destination and rename it into place, so a
/// failed write never leaves a partial file behind.
fn write_atomically<F>(out_file: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&std::fs::File>) -> std::io::Result<()>,
{
    let dir = out_file.parent().unwrap_or_else(|| Path::new("."));
    let tmp = staging_file(dir).map_err(|e| TransformerError::io(dir, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        write(&mut writer)
            .and_then(|_| writer.flush())
            .map_err(|e| TransformerError::io(out_file, e))?;
    }
    tmp.persist(out_file)
        .map_err(|e| TransformerError::io(out_file, e.error))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Volumetric
// ---------------------------------------------------------------------------

/// Rebuild the `(x, y, z, n_observations)` stack, collapsed to 3-D when
/// there is a single observation.
fn to_volume_stack(array: &CanonicalArray, ctx: &VolumeContext) -> Result<ArrayD<f64>> {
    let [nx, ny, nz] = ctx.volume_shape;
    let (n_obs, n_vars) = array.dim();

    let expected = match &ctx.mask {
        Some(mask) => mask.count(),
        None => nx * ny * nz,
    };
    if n_vars != expected {
        return Err(TransformerError::Shape(format!(
            "transformed array has {n_vars} columns but {} needs {expected} to rebuild {}",
            if ctx.mask.is_some() { "the mask" } else { "the volume grid" },
            ctx.name.stem.display()
        )));
    }

    let mut stack = Array4::<f64>::zeros((nx, ny, nz, n_obs));
    for (row, mut volume) in array.rows().into_iter().zip(stack.axis_iter_mut(Axis(3))) {
        match &ctx.mask {
            Some(mask) => mask.scatter(volume, row.iter().copied()),
            None => {
                for (slot, &v) in volume.iter_mut().zip(row.iter()) {
                    *slot = v;
                }
            }
        }
    }

    if n_obs == 1 {
        Ok(stack.index_axis_move(Axis(3), 0).into_dyn())
    } else {
        Ok(stack.into_dyn())
    }
}

fn dump_volumetric(array: &CanonicalArray, ctx: &VolumeContext, out_file: &Path) -> Result<()> {
    let stack = to_volume_stack(array, ctx)?;
    debug!("dumping volume stack {:?} to {}", stack.shape(), out_file.display());

    write_atomically(out_file, |w| {
        encode_for_path(w, out_file, &ctx.header, &ctx.extensions, stack.view())
    })
}

// ---------------------------------------------------------------------------
// Tabular
// ---------------------------------------------------------------------------

fn dump_tabular(
    array: &CanonicalArray,
    ctx: &TableContext,
    write_header: bool,
    out_file: &Path,
) -> Result<()> {
    let columns = &ctx.table.columns;
    if array.ncols() != ctx.table.n_columns() {
        return Err(TransformerError::Shape(format!(
            "transformed array has {} columns but {} has {} column labels",
            array.ncols(),
            ctx.name.stem.display(),
            ctx.table.n_columns()
        )));
    }
    debug!(
        "dumping {} rows × {} columns to {} (header={write_header})",
        array.nrows(),
        array.ncols(),
        out_file.display()
    );

    write_atomically(out_file, |w| {
        write_tsv(w, columns, array.view(), write_header).map_err(std::io::Error::other)
    })
}
