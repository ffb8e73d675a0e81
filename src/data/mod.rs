/// Data layer: canonical array, format codecs, loading and dumping.
///
/// Architecture:
/// ```text
///  .nii / .nii.gz            .tsv / .csv / .txt
///        │                          │
///        ▼                          ▼
///   ┌──────────┐              ┌──────────┐
///   │  nifti    │              │  table    │
///   └──────────┘              └──────────┘
///        │  (+ mask)                │
///        ▼                          ▼
///   ┌──────────────────────────────────────┐
///   │ loader   → CanonicalArray + LoadContext│
///   └──────────────────────────────────────┘
///        │
///        ▼   transform (caller supplied)
///   ┌──────────────────────────────────────┐
///   │ dumper   CanonicalArray + LoadContext  │  same format family out
///   └──────────────────────────────────────┘
/// ```

pub mod dumper;
pub mod loader;
pub mod mask;
pub mod model;
pub mod nifti;
pub mod table;
