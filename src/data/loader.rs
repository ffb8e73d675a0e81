use std::path::Path;

use log::{debug, warn};
use ndarray::{Array2, Axis, Ix3, Ix4};

use super::mask::VoxelMask;
use super::model::{
    CanonicalArray, FormatFamily, LoadContext, OutputName, TableContext, VolumeContext,
};
use super::nifti::{affines_close, NiftiHeader, NiftiImage};
use super::table::read_table;
use crate::error::{Result, TransformerError};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load `in_file` into an observations × variables array.  Dispatch by
/// extension.
///
/// * `.nii` / `.nii.gz` – one row per volume, one column per voxel (or per
///   mask-included voxel when `mask_file` names an existing file)
/// * anything else     – delimited text table, one row per table row
///
/// A `mask_file` that does not exist is ignored rather than reported.
pub fn load(in_file: &Path, mask_file: Option<&Path>) -> Result<(CanonicalArray, LoadContext)> {
    let name = OutputName::from_input(in_file);
    let family = FormatFamily::from_extension(&name.ext);
    debug!("loading {} as {family:?}", in_file.display());

    match family {
        FormatFamily::Volumetric => load_volumetric(in_file, mask_file, name),
        FormatFamily::Tabular => load_tabular(in_file, name),
    }
}

// ---------------------------------------------------------------------------
// Volumetric
// ---------------------------------------------------------------------------

fn load_volumetric(
    in_file: &Path,
    mask_file: Option<&Path>,
    name: OutputName,
) -> Result<(CanonicalArray, LoadContext)> {
    let NiftiImage {
        header,
        extensions,
        data,
    } = NiftiImage::read(in_file)?;

    // A 3-D image is a series of one volume.
    let series = match data.ndim() {
        3 => data.insert_axis(Axis(3)),
        4 => data,
        ndim => {
            return Err(TransformerError::Shape(format!(
                "Unexpected number of dimensions {ndim} in \"{}\"",
                in_file.display()
            )))
        }
    };
    let series = series
        .into_dimensionality::<Ix4>()
        .map_err(|e| TransformerError::Shape(format!("{}: {e}", in_file.display())))?;
    let (nx, ny, nz, n_volumes) = series.dim();
    let volume_shape = [nx, ny, nz];

    let mask = match mask_file {
        Some(path) if path.is_file() => Some(load_mask(path, in_file, &header, volume_shape)?),
        Some(path) => {
            warn!("mask {} does not exist, using all voxels", path.display());
            None
        }
        None => None,
    };

    let n_voxels = match &mask {
        Some(mask) => mask.count(),
        None => volume_shape.iter().product(),
    };

    let mut array = Array2::<f64>::zeros((n_volumes, n_voxels));
    for (volume, mut row) in series.axis_iter(Axis(3)).zip(array.rows_mut()) {
        match &mask {
            Some(mask) => {
                for (dst, v) in row.iter_mut().zip(mask.gather(volume)) {
                    *dst = v;
                }
            }
            None => {
                for (dst, &v) in row.iter_mut().zip(volume.iter()) {
                    *dst = v;
                }
            }
        }
    }

    debug!(
        "{}: {n_volumes} volume(s) of {volume_shape:?}, {n_voxels} voxel(s){}",
        in_file.display(),
        if mask.is_some() { " in mask" } else { "" }
    );

    let ctx = VolumeContext {
        name,
        header,
        extensions,
        volume_shape,
        mask,
    };
    Ok((array, LoadContext::Volumetric(ctx)))
}

fn load_mask(
    mask_file: &Path,
    in_file: &Path,
    in_header: &NiftiHeader,
    volume_shape: [usize; 3],
) -> Result<VoxelMask> {
    let mask_img = NiftiImage::read(mask_file)?.squeeze();

    if mask_img.ndim() < 3 || mask_img.n_volumes() != 1 {
        return Err(TransformerError::Mask(format!(
            "Expecting a single volume for mask file \"{}\"",
            mask_file.display()
        )));
    }
    if !affines_close(&mask_img.affine(), &in_header.affine()) {
        return Err(TransformerError::Alignment {
            in_file: in_file.to_path_buf(),
            mask_file: mask_file.to_path_buf(),
        });
    }

    let mask_shape = &mask_img.shape()[..3];
    if mask_shape != &volume_shape[..] {
        return Err(TransformerError::Mask(format!(
            "mask \"{}\" has shape {mask_shape:?} but \"{}\" has volumes of {volume_shape:?}",
            mask_file.display(),
            in_file.display()
        )));
    }

    let volume = mask_img
        .data
        .into_dimensionality::<Ix3>()
        .map_err(|e| TransformerError::Mask(format!("{}: {e}", mask_file.display())))?;
    Ok(VoxelMask::from_volume(volume.view()))
}

// ---------------------------------------------------------------------------
// Tabular
// ---------------------------------------------------------------------------

fn load_tabular(in_file: &Path, name: OutputName) -> Result<(CanonicalArray, LoadContext)> {
    let table = read_table(in_file)?;
    let array = table.values.clone();
    Ok((array, LoadContext::Tabular(TableContext { name, table })))
}
