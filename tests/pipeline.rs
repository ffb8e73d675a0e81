use std::fs::File;
use std::path::{Path, PathBuf};

use ndarray::{Array, Array4, ArrayD, IxDyn};

use volutab::data::nifti::{encode_for_path, NiftiHeader, NiftiImage};
use volutab::{
    from_fn, CanonicalArray, Identity, Transformer, TransformerConfig, TransformerError,
    TransformerInputs,
};

fn header() -> NiftiHeader {
    NiftiHeader {
        sform_code: 1,
        srow_x: [2.0, 0.0, 0.0, -10.0],
        srow_y: [0.0, 2.0, 0.0, -12.0],
        srow_z: [0.0, 0.0, 2.0, -4.0],
        pixdim: [1.0, 2.0, 2.0, 2.0, 1.5, 1.0, 1.0, 1.0],
        ..NiftiHeader::default()
    }
}

fn save(path: &Path, header: &NiftiHeader, data: &ArrayD<f64>) {
    let file = File::create(path).unwrap();
    encode_for_path(file, path, header, &[], data.view()).unwrap();
}

fn series(t: usize) -> ArrayD<f64> {
    Array4::from_shape_fn((3, 4, 2, t), |(x, y, z, t)| {
        1.0 + x as f64 + 10.0 * y as f64 + 100.0 * z as f64 + 1000.0 * t as f64
    })
    .into_dyn()
}

fn write_bold(dir: &Path, t: usize) -> PathBuf {
    let path = dir.join("sub-01_bold.nii.gz");
    save(&path, &header(), &series(t));
    path
}

#[test]
fn unmasked_identity_roundtrips_shape_and_values() {
    let dir = tempfile::tempdir().unwrap();
    let in_file = write_bold(dir.path(), 5);

    let out = Transformer::new(Identity)
        .run(&TransformerInputs::new(&in_file))
        .unwrap();

    assert!(out.is_absolute());
    assert_eq!(out.file_name().unwrap(), "sub-01_bold_transformed.nii.gz");

    let img = NiftiImage::read(&out).unwrap();
    assert_eq!(img.shape(), &[3, 4, 2, 5]);
    assert_eq!(img.data, series(5));
    assert_eq!(img.header.datatype, 64);
    assert_eq!(img.affine(), header().affine());
    assert_eq!(img.header.pixdim, header().pixdim);
}

#[test]
fn single_volume_series_collapses_to_three_d() {
    let dir = tempfile::tempdir().unwrap();
    let in_file = write_bold(dir.path(), 1);

    let out = Transformer::new(Identity)
        .run(&TransformerInputs::new(&in_file))
        .unwrap();
    let img = NiftiImage::read(&out).unwrap();
    assert_eq!(img.shape(), &[3, 4, 2]);
}

#[test]
fn excluded_voxels_are_zero_after_dump() {
    let dir = tempfile::tempdir().unwrap();
    let in_file = write_bold(dir.path(), 3);

    let mask_values = [0.0, -1.0, 0.005, 0.01, 0.0101, 0.5, 1.0, 2.0];
    let mask = Array::from_shape_fn((3, 4, 2), |(x, y, z)| {
        mask_values[(x + 3 * y + 12 * z) % mask_values.len()]
    })
    .into_dyn();
    let mask_file = dir.path().join("mask.nii.gz");
    save(&mask_file, &header(), &mask);

    // A transform that touches every value, so zeros can only come from the
    // background fill.
    let plus_one = from_fn("plus_one", |a: CanonicalArray| Ok(a + 1.0));
    let out = Transformer::new(plus_one)
        .run(&TransformerInputs::new(&in_file).with_mask(&mask_file))
        .unwrap();

    let img = NiftiImage::read(&out).unwrap();
    assert_eq!(img.shape(), &[3, 4, 2, 3]);
    let input = series(3);
    for ((x, y, z), &m) in mask
        .view()
        .into_dimensionality::<ndarray::Ix3>()
        .unwrap()
        .indexed_iter()
    {
        for t in 0..3 {
            let got = img.data[IxDyn(&[x, y, z, t])];
            if m >= 0.0101 {
                assert_eq!(got, input[IxDyn(&[x, y, z, t])] + 1.0);
            } else {
                assert_eq!(got, 0.0, "voxel {:?} with mask {m} must be zero", (x, y, z));
            }
        }
    }
}

#[test]
fn misaligned_mask_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let in_file = write_bold(dir.path(), 2);

    let mut shifted = header();
    shifted.srow_x[3] += 2.0;
    let mask_file = dir.path().join("mask.nii");
    save(&mask_file, &shifted, &ArrayD::from_elem(IxDyn(&[3, 4, 2]), 1.0));

    let err = Transformer::new(Identity)
        .run(&TransformerInputs::new(&in_file).with_mask(&mask_file))
        .unwrap_err();
    assert!(matches!(err, TransformerError::Alignment { .. }));
    assert!(!dir.path().join("sub-01_bold_transformed.nii.gz").exists());
}

#[test]
fn nonexistent_mask_path_uses_every_voxel() {
    let dir = tempfile::tempdir().unwrap();
    let in_file = write_bold(dir.path(), 2);

    let out = Transformer::new(Identity)
        .run(&TransformerInputs::new(&in_file).with_mask(dir.path().join("missing_mask.nii.gz")))
        .unwrap();
    let img = NiftiImage::read(&out).unwrap();
    assert_eq!(img.data, series(2));
}

#[test]
fn identity_preserves_table_contents() {
    let dir = tempfile::tempdir().unwrap();
    let in_file = dir.path().join("confounds.tsv");
    std::fs::write(&in_file, "a\tb\n1.0\t2.0\n3.0\t4.0\n").unwrap();

    let out = Transformer::new(Identity)
        .run(&TransformerInputs::new(&in_file))
        .unwrap();
    assert_eq!(out.file_name().unwrap(), "confounds_transformed.tsv");
    assert_eq!(
        std::fs::read_to_string(&out).unwrap(),
        "a\tb\n1.0\t2.0\n3.0\t4.0\n"
    );
}

#[test]
fn single_column_table_roundtrips_spaced_label() {
    let dir = tempfile::tempdir().unwrap();
    let in_file = dir.path().join("global_signal.tsv");
    std::fs::write(&in_file, "global signal\n1.5\n2.5\n").unwrap();

    let out = Transformer::new(Identity)
        .run(&TransformerInputs::new(&in_file))
        .unwrap();
    assert_eq!(
        std::fs::read_to_string(&out).unwrap(),
        "global signal\n1.5\n2.5\n"
    );
}

#[test]
fn missing_cells_are_written_as_na() {
    let dir = tempfile::tempdir().unwrap();
    let in_file = dir.path().join("confounds.tsv");
    std::fs::write(&in_file, "a\tb\n1\tn/a\n3\t4\n").unwrap();

    let out = Transformer::new(Identity)
        .run(&TransformerInputs::new(&in_file))
        .unwrap();
    assert_eq!(
        std::fs::read_to_string(&out).unwrap(),
        "a\tb\n1.0\tn/a\n3.0\t4.0\n"
    );
}

#[test]
fn header_row_can_be_suppressed() {
    let dir = tempfile::tempdir().unwrap();
    let in_file = dir.path().join("confounds.tsv");
    std::fs::write(&in_file, "a\tb\n1.0\t2.0\n3.0\t4.0\n").unwrap();

    let config = TransformerConfig {
        write_header: false,
        ..Default::default()
    };
    let out = Transformer::with_config(Identity, config)
        .unwrap()
        .run(&TransformerInputs::new(&in_file))
        .unwrap();
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "1.0\t2.0\n3.0\t4.0\n");
}

#[test]
fn non_numeric_table_fails_with_coercion_error() {
    let dir = tempfile::tempdir().unwrap();
    let in_file = dir.path().join("confounds.tsv");
    std::fs::write(&in_file, "a\tb\n1.0\tyes\n").unwrap();

    let err = Transformer::new(Identity)
        .run(&TransformerInputs::new(&in_file))
        .unwrap_err();
    assert!(matches!(err, TransformerError::Coercion { .. }));
    assert!(err.to_string().contains("confounds.tsv"));
}

#[test]
fn custom_suffix_names_output() {
    let dir = tempfile::tempdir().unwrap();
    let in_file = dir.path().join("x.txt");
    std::fs::write(&in_file, "1 2\n3 4\n").unwrap();

    let config = TransformerConfig {
        suffix: "filtered".into(),
        ..Default::default()
    };
    let out = Transformer::with_config(Identity, config)
        .unwrap()
        .run(&TransformerInputs::new(&in_file))
        .unwrap();
    assert_eq!(out.file_name().unwrap(), "x_filtered.txt");
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "0\t1\n1.0\t2.0\n3.0\t4.0\n");
}
