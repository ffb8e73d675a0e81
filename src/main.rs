use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use volutab::{Demean, Identity, Transform, Transformer, TransformerConfig, TransformerInputs, ZScore};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransformKind {
    Identity,
    Demean,
    Zscore,
}

impl TransformKind {
    fn build(self) -> Box<dyn Transform> {
        match self {
            TransformKind::Identity => Box::new(Identity),
            TransformKind::Demean => Box::new(Demean),
            TransformKind::Zscore => Box::new(ZScore),
        }
    }
}

/// Apply an array transform to a NIfTI image or a text table and write the
/// result in the same format.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input .nii/.nii.gz image or delimited text table
    #[arg(long)]
    in_file: PathBuf,

    /// Mask image restricting the voxels (ignored when the file is missing)
    #[arg(long)]
    mask: Option<PathBuf>,

    /// Transform to apply
    #[arg(long, value_enum, default_value_t = TransformKind::Identity)]
    transform: TransformKind,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output suffix (overrides the configuration file)
    #[arg(long)]
    suffix: Option<String>,

    /// Do not write a header row for tabular output
    #[arg(long)]
    no_header: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TransformerConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TransformerConfig::default(),
    };
    if let Some(suffix) = args.suffix {
        config.suffix = suffix;
    }
    if args.no_header {
        config.write_header = false;
    }

    let transformer = Transformer::with_config(args.transform.build(), config)?;
    let mut inputs = TransformerInputs::new(&args.in_file);
    if let Some(mask) = args.mask {
        inputs = inputs.with_mask(mask);
    }

    let out_file = transformer
        .run(&inputs)
        .with_context(|| format!("transforming {}", args.in_file.display()))?;
    println!("{}", out_file.display());
    Ok(())
}
