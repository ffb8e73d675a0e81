use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ndarray::{Array2, Array3, Array4};

use volutab::data::nifti::{encode_for_path, NiftiHeader};
use volutab::data::table::write_tsv;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// Write a synthetic BOLD-like series, a brain mask and a confounds table.
#[derive(Parser, Debug)]
#[command(about)]
struct Args {
    /// Output directory
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Number of volumes in the series
    #[arg(long, default_value_t = 20)]
    volumes: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

const SHAPE: (usize, usize, usize) = (16, 16, 10);
const VOXEL_MM: f32 = 3.0;
const TR_S: f32 = 2.0;

fn template_header() -> NiftiHeader {
    let (nx, ny, nz) = SHAPE;
    let half = |n: usize| -(n as f32 - 1.0) / 2.0 * VOXEL_MM;
    let mut header = NiftiHeader {
        pixdim: [1.0, VOXEL_MM, VOXEL_MM, VOXEL_MM, TR_S, 1.0, 1.0, 1.0],
        xyzt_units: 2 | 8, // mm, seconds
        sform_code: 1,
        qform_code: 1,
        srow_x: [VOXEL_MM, 0.0, 0.0, half(nx)],
        srow_y: [0.0, VOXEL_MM, 0.0, half(ny)],
        srow_z: [0.0, 0.0, VOXEL_MM, half(nz)],
        qoffset_x: half(nx),
        qoffset_y: half(ny),
        qoffset_z: half(nz),
        ..NiftiHeader::default()
    };
    header.descrip[..17].copy_from_slice(b"volutab synthetic");
    header
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut rng = SimpleRng::new(args.seed);
    let (nx, ny, nz) = SHAPE;

    // Ellipsoid "brain" centred in the grid
    let inside = |x: usize, y: usize, z: usize| {
        let dx = (x as f64 - (nx as f64 - 1.0) / 2.0) / (nx as f64 / 2.2);
        let dy = (y as f64 - (ny as f64 - 1.0) / 2.0) / (ny as f64 / 2.2);
        let dz = (z as f64 - (nz as f64 - 1.0) / 2.0) / (nz as f64 / 2.2);
        dx * dx + dy * dy + dz * dz <= 1.0
    };
    let mask = Array3::from_shape_fn(SHAPE, |(x, y, z)| if inside(x, y, z) { 1.0 } else { 0.0 });

    let drift: Vec<f64> = (0..args.volumes).map(|t| 0.05 * t as f64).collect();
    let motion: Vec<f64> = (0..args.volumes).map(|_| rng.gauss(0.0, 0.2)).collect();

    let mut bold = Array4::<f64>::zeros((nx, ny, nz, args.volumes));
    for ((x, y, z, t), v) in bold.indexed_iter_mut() {
        let baseline = if inside(x, y, z) { 1000.0 } else { 20.0 };
        let signal = 10.0 * (2.0 * std::f64::consts::PI * t as f64 / 10.0).sin();
        *v = baseline + signal + drift[t] + 5.0 * motion[t] + rng.gauss(0.0, 2.0);
    }

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;
    let header = template_header();

    let bold_path = args.out_dir.join("sub-01_task-rest_bold.nii.gz");
    let file = File::create(&bold_path).context("creating bold image")?;
    encode_for_path(file, &bold_path, &header, &[], bold.view().into_dyn())
        .context("writing bold image")?;

    let mask_path = args.out_dir.join("sub-01_mask.nii.gz");
    let file = File::create(&mask_path).context("creating mask image")?;
    encode_for_path(file, &mask_path, &header, &[], mask.view().into_dyn())
        .context("writing mask image")?;

    let columns = vec!["drift".to_string(), "motion".to_string()];
    let confounds = Array2::from_shape_fn((args.volumes, 2), |(t, c)| {
        if c == 0 { drift[t] } else { motion[t] }
    });
    let tsv_path = args.out_dir.join("sub-01_confounds.tsv");
    let file = File::create(&tsv_path).context("creating confounds table")?;
    write_tsv(file, &columns, confounds.view(), true).context("writing confounds table")?;

    println!(
        "Wrote {} volumes of {:?} ({} voxels in mask) to {}",
        args.volumes,
        SHAPE,
        mask.iter().filter(|&&m| m > 0.0).count(),
        args.out_dir.display()
    );
    Ok(())
}
