use ndarray::{ArrayView3, ArrayViewMut3};

/// Values within this distance of zero count as background.
pub const MASK_ATOL: f64 = 1e-2;

/// A voxel is kept unless it is `<= 0` or within [`MASK_ATOL`] of zero.
pub fn is_included(value: f64) -> bool {
    !(value <= 0.0 || value.abs() <= MASK_ATOL)
}

/// Binarized mask over one volume, in logical `(x, y, z)` raster order.
///
/// The same flags drive both gathering voxels into columns at load time
/// and scattering columns back at dump time, so column `j` always maps to
/// the `j`-th included voxel.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelMask {
    included: Vec<bool>,
    count: usize,
}

impl VoxelMask {
    pub fn from_volume(volume: ArrayView3<'_, f64>) -> Self {
        let included: Vec<bool> = volume.iter().map(|&v| is_included(v)).collect();
        let count = included.iter().filter(|&&keep| keep).count();
        Self {
            included,
            count,
        }
    }

    /// Number of included voxels.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Included voxels of `volume`, in mask order.
    pub fn gather<'a>(&'a self, volume: ArrayView3<'a, f64>) -> impl Iterator<Item = f64> + 'a {
        volume
            .into_iter()
            .zip(&self.included)
            .filter(|(_, &keep)| keep)
            .map(|(&v, _)| v)
    }

    /// Write `values` into the included voxels of `volume`; excluded voxels
    /// are left untouched.
    pub fn scatter(&self, mut volume: ArrayViewMut3<'_, f64>, values: impl IntoIterator<Item = f64>) {
        let targets = volume
            .iter_mut()
            .zip(&self.included)
            .filter(|(_, &keep)| keep)
            .map(|(slot, _)| slot);
        for (slot, v) in targets.zip(values) {
            *slot = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr3, Array3};

    #[test]
    fn binarization_boundary() {
        for excluded in [0.0, -0.0, -5.0, 1e-2, -1e-2, 0.005, 0.00999] {
            assert!(!is_included(excluded), "{excluded} should be excluded");
        }
        for included in [0.0101, 0.02, 1.0, 255.0] {
            assert!(is_included(included), "{included} should be included");
        }
    }

    #[test]
    fn gather_and_scatter_use_same_positions() {
        let mask_data = arr3(&[[[1.0, 0.0], [0.5, 0.0]], [[0.0, 2.0], [0.001, 1.0]]]);
        let mask = VoxelMask::from_volume(mask_data.view());
        assert_eq!(mask.count(), 4);

        let volume = Array3::from_shape_fn((2, 2, 2), |(x, y, z)| (100 * x + 10 * y + z) as f64);
        let gathered: Vec<f64> = mask.gather(volume.view()).collect();
        assert_eq!(gathered, vec![0.0, 10.0, 101.0, 111.0]);

        let mut out = Array3::<f64>::zeros((2, 2, 2));
        mask.scatter(out.view_mut(), gathered.iter().copied());
        for ((idx, &v), &m) in out.indexed_iter().zip(mask_data.iter()) {
            if is_included(m) {
                assert_eq!(v, volume[idx]);
            } else {
                assert_eq!(v, 0.0);
            }
        }
    }
}
