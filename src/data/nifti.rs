//! NIfTI-1 single-file codec (`.nii`, `.nii.gz`).
//!
//! Reads any of the standard integer/float datatypes in either byte order,
//! applies `scl_slope`/`scl_inter`, and exposes voxels as an `f64` array in
//! logical `(x, y, z[, t, ...])` order. Writing is always little-endian
//! float64 with the header of a template image.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{ArrayD, ArrayViewD, IxDyn, ShapeBuilder};

use crate::error::{Result, TransformerError};

pub const HEADER_SIZE: usize = 348;
/// Header plus the 4-byte extension flag.
pub const MIN_VOX_OFFSET: usize = 352;
const MAGIC_SINGLE: &[u8; 4] = b"n+1\0";
const MAGIC_PAIR: &[u8; 4] = b"ni1\0";

pub type Affine = [[f64; 4]; 4];

// ---------------------------------------------------------------------------
// Datatype
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NiftiType {
    Uint8,
    Int16,
    Int32,
    Float32,
    Float64,
    Int8,
    Uint16,
    Uint32,
    Int64,
    Uint64,
}

impl NiftiType {
    pub fn from_code(code: i16) -> Option<Self> {
        Some(match code {
            2 => NiftiType::Uint8,
            4 => NiftiType::Int16,
            8 => NiftiType::Int32,
            16 => NiftiType::Float32,
            64 => NiftiType::Float64,
            256 => NiftiType::Int8,
            512 => NiftiType::Uint16,
            768 => NiftiType::Uint32,
            1024 => NiftiType::Int64,
            1280 => NiftiType::Uint64,
            _ => return None,
        })
    }

    pub fn code(self) -> i16 {
        match self {
            NiftiType::Uint8 => 2,
            NiftiType::Int16 => 4,
            NiftiType::Int32 => 8,
            NiftiType::Float32 => 16,
            NiftiType::Float64 => 64,
            NiftiType::Int8 => 256,
            NiftiType::Uint16 => 512,
            NiftiType::Uint32 => 768,
            NiftiType::Int64 => 1024,
            NiftiType::Uint64 => 1280,
        }
    }

    pub fn size(self) -> usize {
        match self {
            NiftiType::Uint8 | NiftiType::Int8 => 1,
            NiftiType::Int16 | NiftiType::Uint16 => 2,
            NiftiType::Int32 | NiftiType::Uint32 | NiftiType::Float32 => 4,
            NiftiType::Float64 | NiftiType::Int64 | NiftiType::Uint64 => 8,
        }
    }

    fn decode(self, raw: &[u8], big_endian: bool) -> f64 {
        macro_rules! num {
            ($t:ty, $n:expr) => {{
                let mut b = [0u8; $n];
                b.copy_from_slice(raw);
                if big_endian {
                    <$t>::from_be_bytes(b) as f64
                } else {
                    <$t>::from_le_bytes(b) as f64
                }
            }};
        }
        match self {
            NiftiType::Uint8 => raw[0] as f64,
            NiftiType::Int8 => raw[0] as i8 as f64,
            NiftiType::Int16 => num!(i16, 2),
            NiftiType::Uint16 => num!(u16, 2),
            NiftiType::Int32 => num!(i32, 4),
            NiftiType::Uint32 => num!(u32, 4),
            NiftiType::Float32 => num!(f32, 4),
            NiftiType::Float64 => num!(f64, 8),
            NiftiType::Int64 => num!(i64, 8),
            NiftiType::Uint64 => num!(u64, 8),
        }
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// The 348-byte NIfTI-1 header, field for field.
#[derive(Debug, Clone, PartialEq)]
pub struct NiftiHeader {
    pub data_type: [u8; 10],
    pub db_name: [u8; 18],
    pub extents: i32,
    pub session_error: i16,
    pub regular: u8,
    pub dim_info: u8,
    pub dim: [i16; 8],
    pub intent_p1: f32,
    pub intent_p2: f32,
    pub intent_p3: f32,
    pub intent_code: i16,
    pub datatype: i16,
    pub bitpix: i16,
    pub slice_start: i16,
    pub pixdim: [f32; 8],
    pub vox_offset: f32,
    pub scl_slope: f32,
    pub scl_inter: f32,
    pub slice_end: i16,
    pub slice_code: u8,
    pub xyzt_units: u8,
    pub cal_max: f32,
    pub cal_min: f32,
    pub slice_duration: f32,
    pub toffset: f32,
    pub glmax: i32,
    pub glmin: i32,
    pub descrip: [u8; 80],
    pub aux_file: [u8; 24],
    pub qform_code: i16,
    pub sform_code: i16,
    pub quatern_b: f32,
    pub quatern_c: f32,
    pub quatern_d: f32,
    pub qoffset_x: f32,
    pub qoffset_y: f32,
    pub qoffset_z: f32,
    pub srow_x: [f32; 4],
    pub srow_y: [f32; 4],
    pub srow_z: [f32; 4],
    pub intent_name: [u8; 16],
    pub magic: [u8; 4],
}

impl Default for NiftiHeader {
    fn default() -> Self {
        Self {
            data_type: [0; 10],
            db_name: [0; 18],
            extents: 0,
            session_error: 0,
            regular: b'r',
            dim_info: 0,
            dim: [0, 1, 1, 1, 1, 1, 1, 1],
            intent_p1: 0.0,
            intent_p2: 0.0,
            intent_p3: 0.0,
            intent_code: 0,
            datatype: NiftiType::Float64.code(),
            bitpix: 64,
            slice_start: 0,
            pixdim: [1.0; 8],
            vox_offset: MIN_VOX_OFFSET as f32,
            scl_slope: 1.0,
            scl_inter: 0.0,
            slice_end: 0,
            slice_code: 0,
            xyzt_units: 0,
            cal_max: 0.0,
            cal_min: 0.0,
            slice_duration: 0.0,
            toffset: 0.0,
            glmax: 0,
            glmin: 0,
            descrip: [0; 80],
            aux_file: [0; 24],
            qform_code: 0,
            sform_code: 0,
            quatern_b: 0.0,
            quatern_c: 0.0,
            quatern_d: 0.0,
            qoffset_x: 0.0,
            qoffset_y: 0.0,
            qoffset_z: 0.0,
            srow_x: [1.0, 0.0, 0.0, 0.0],
            srow_y: [0.0, 1.0, 0.0, 0.0],
            srow_z: [0.0, 0.0, 1.0, 0.0],
            intent_name: [0; 16],
            magic: *MAGIC_SINGLE,
        }
    }
}

/// Fixed-offset field reader over the raw header bytes.
struct Fields<'a> {
    bytes: &'a [u8],
    big_endian: bool,
}

impl Fields<'_> {
    fn arr<const N: usize>(&self, off: usize) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[off..off + N]);
        out
    }

    fn i16(&self, off: usize) -> i16 {
        let b = self.arr::<2>(off);
        if self.big_endian { i16::from_be_bytes(b) } else { i16::from_le_bytes(b) }
    }

    fn i32(&self, off: usize) -> i32 {
        let b = self.arr::<4>(off);
        if self.big_endian { i32::from_be_bytes(b) } else { i32::from_le_bytes(b) }
    }

    fn f32(&self, off: usize) -> f32 {
        let b = self.arr::<4>(off);
        if self.big_endian { f32::from_be_bytes(b) } else { f32::from_le_bytes(b) }
    }

    fn f32s<const N: usize>(&self, off: usize) -> [f32; N] {
        std::array::from_fn(|i| self.f32(off + 4 * i))
    }
}

fn put(buf: &mut [u8], off: usize, bytes: &[u8]) {
    buf[off..off + bytes.len()].copy_from_slice(bytes);
}

fn put_f32s(buf: &mut [u8], off: usize, values: &[f32]) {
    for (i, v) in values.iter().enumerate() {
        put(buf, off + 4 * i, &v.to_le_bytes());
    }
}

impl NiftiHeader {
    /// Parse a header, detecting byte order from `sizeof_hdr`.
    /// Returns the header and whether the file is big-endian.
    pub fn parse(bytes: &[u8], path: &Path) -> Result<(Self, bool)> {
        if bytes.len() < HEADER_SIZE {
            return Err(TransformerError::invalid(path, "file shorter than a NIfTI-1 header"));
        }
        let sizeof_hdr = [bytes[0], bytes[1], bytes[2], bytes[3]];
        let big_endian = if i32::from_le_bytes(sizeof_hdr) == HEADER_SIZE as i32 {
            false
        } else if i32::from_be_bytes(sizeof_hdr) == HEADER_SIZE as i32 {
            true
        } else {
            return Err(TransformerError::invalid(path, "sizeof_hdr is not 348"));
        };

        let f = Fields { bytes, big_endian };
        let magic: [u8; 4] = f.arr(344);
        if &magic == MAGIC_PAIR {
            return Err(TransformerError::invalid(
                path,
                "header/image pairs (.hdr/.img) are not supported",
            ));
        }
        if &magic != MAGIC_SINGLE {
            return Err(TransformerError::invalid(path, "missing NIfTI-1 magic \"n+1\""));
        }

        let header = NiftiHeader {
            data_type: f.arr(4),
            db_name: f.arr(14),
            extents: f.i32(32),
            session_error: f.i16(36),
            regular: bytes[38],
            dim_info: bytes[39],
            dim: std::array::from_fn(|i| f.i16(40 + 2 * i)),
            intent_p1: f.f32(56),
            intent_p2: f.f32(60),
            intent_p3: f.f32(64),
            intent_code: f.i16(68),
            datatype: f.i16(70),
            bitpix: f.i16(72),
            slice_start: f.i16(74),
            pixdim: f.f32s(76),
            vox_offset: f.f32(108),
            scl_slope: f.f32(112),
            scl_inter: f.f32(116),
            slice_end: f.i16(120),
            slice_code: bytes[122],
            xyzt_units: bytes[123],
            cal_max: f.f32(124),
            cal_min: f.f32(128),
            slice_duration: f.f32(132),
            toffset: f.f32(136),
            glmax: f.i32(140),
            glmin: f.i32(144),
            descrip: f.arr(148),
            aux_file: f.arr(228),
            qform_code: f.i16(252),
            sform_code: f.i16(254),
            quatern_b: f.f32(256),
            quatern_c: f.f32(260),
            quatern_d: f.f32(264),
            qoffset_x: f.f32(268),
            qoffset_y: f.f32(272),
            qoffset_z: f.f32(276),
            srow_x: f.f32s(280),
            srow_y: f.f32s(296),
            srow_z: f.f32s(312),
            intent_name: f.arr(328),
            magic,
        };

        let ndim = header.dim[0];
        if !(1..=7).contains(&ndim) {
            return Err(TransformerError::invalid(path, format!("dim[0] = {ndim} is out of range")));
        }
        if header.dim[1..=ndim as usize].iter().any(|&d| d < 0) {
            return Err(TransformerError::invalid(path, "negative dimension length"));
        }
        Ok((header, big_endian))
    }

    /// Serialize as little-endian.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        put(&mut buf, 0, &(HEADER_SIZE as i32).to_le_bytes());
        put(&mut buf, 4, &self.data_type);
        put(&mut buf, 14, &self.db_name);
        put(&mut buf, 32, &self.extents.to_le_bytes());
        put(&mut buf, 36, &self.session_error.to_le_bytes());
        buf[38] = self.regular;
        buf[39] = self.dim_info;
        for (i, d) in self.dim.iter().enumerate() {
            put(&mut buf, 40 + 2 * i, &d.to_le_bytes());
        }
        put_f32s(&mut buf, 56, &[self.intent_p1, self.intent_p2, self.intent_p3]);
        put(&mut buf, 68, &self.intent_code.to_le_bytes());
        put(&mut buf, 70, &self.datatype.to_le_bytes());
        put(&mut buf, 72, &self.bitpix.to_le_bytes());
        put(&mut buf, 74, &self.slice_start.to_le_bytes());
        put_f32s(&mut buf, 76, &self.pixdim);
        put_f32s(&mut buf, 108, &[self.vox_offset, self.scl_slope, self.scl_inter]);
        put(&mut buf, 120, &self.slice_end.to_le_bytes());
        buf[122] = self.slice_code;
        buf[123] = self.xyzt_units;
        put_f32s(
            &mut buf,
            124,
            &[self.cal_max, self.cal_min, self.slice_duration, self.toffset],
        );
        put(&mut buf, 140, &self.glmax.to_le_bytes());
        put(&mut buf, 144, &self.glmin.to_le_bytes());
        put(&mut buf, 148, &self.descrip);
        put(&mut buf, 228, &self.aux_file);
        put(&mut buf, 252, &self.qform_code.to_le_bytes());
        put(&mut buf, 254, &self.sform_code.to_le_bytes());
        put_f32s(
            &mut buf,
            256,
            &[
                self.quatern_b,
                self.quatern_c,
                self.quatern_d,
                self.qoffset_x,
                self.qoffset_y,
                self.qoffset_z,
            ],
        );
        put_f32s(&mut buf, 280, &self.srow_x);
        put_f32s(&mut buf, 296, &self.srow_y);
        put_f32s(&mut buf, 312, &self.srow_z);
        put(&mut buf, 328, &self.intent_name);
        put(&mut buf, 344, &self.magic);
        buf
    }

    pub fn shape(&self) -> Vec<usize> {
        let ndim = self.dim[0].clamp(0, 7) as usize;
        self.dim[1..=ndim].iter().map(|&d| d.max(0) as usize).collect()
    }

    /// Set `dim` for a new array shape; unused trailing entries become 1.
    pub fn set_shape(&mut self, shape: &[usize]) -> Result<()> {
        if shape.is_empty() || shape.len() > 7 {
            return Err(TransformerError::Shape(format!(
                "cannot store a {}-dimensional array in NIfTI-1",
                shape.len()
            )));
        }
        let mut dim = [1i16; 8];
        dim[0] = shape.len() as i16;
        for (slot, &len) in dim[1..].iter_mut().zip(shape) {
            *slot = i16::try_from(len).map_err(|_| {
                TransformerError::Shape(format!("axis length {len} exceeds NIfTI-1 limit"))
            })?;
        }
        self.dim = dim;
        Ok(())
    }

    pub fn set_data_dtype(&mut self, dtype: NiftiType) {
        self.datatype = dtype.code();
        self.bitpix = (dtype.size() * 8) as i16;
    }

    /// Slope/intercept applied to stored values; `(1, 0)` when unused.
    pub fn scaling(&self) -> (f64, f64) {
        let slope = self.scl_slope as f64;
        if slope == 0.0 || !slope.is_finite() {
            return (1.0, 0.0);
        }
        let inter = self.scl_inter as f64;
        (slope, if inter.is_finite() { inter } else { 0.0 })
    }

    /// Voxel → world transform: sform if set, else qform, else a
    /// centered diagonal built from the voxel sizes.
    pub fn affine(&self) -> Affine {
        if self.sform_code > 0 {
            self.sform_affine()
        } else if self.qform_code > 0 {
            self.qform_affine()
        } else {
            self.base_affine()
        }
    }

    fn sform_affine(&self) -> Affine {
        let row = |r: &[f32; 4]| [r[0] as f64, r[1] as f64, r[2] as f64, r[3] as f64];
        [
            row(&self.srow_x),
            row(&self.srow_y),
            row(&self.srow_z),
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    fn qform_affine(&self) -> Affine {
        let (b, c, d) = (
            self.quatern_b as f64,
            self.quatern_c as f64,
            self.quatern_d as f64,
        );
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
        let rot = [
            [a * a + b * b - c * c - d * d, 2.0 * (b * c - a * d), 2.0 * (b * d + a * c)],
            [2.0 * (b * c + a * d), a * a + c * c - b * b - d * d, 2.0 * (c * d - a * b)],
            [2.0 * (b * d - a * c), 2.0 * (c * d + a * b), a * a + d * d - b * b - c * c],
        ];
        let qfac = if self.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let zooms = [
            self.pixdim[1] as f64,
            self.pixdim[2] as f64,
            self.pixdim[3] as f64 * qfac,
        ];
        let offset = [
            self.qoffset_x as f64,
            self.qoffset_y as f64,
            self.qoffset_z as f64,
        ];

        let mut aff = [[0.0; 4]; 4];
        for i in 0..3 {
            for j in 0..3 {
                aff[i][j] = rot[i][j] * zooms[j];
            }
            aff[i][3] = offset[i];
        }
        aff[3][3] = 1.0;
        aff
    }

    fn base_affine(&self) -> Affine {
        let shape = self.shape();
        let mut aff = [[0.0; 4]; 4];
        for i in 0..3 {
            let n = shape.get(i).copied().unwrap_or(1) as f64;
            let mut zoom = self.pixdim[i + 1] as f64;
            if i == 0 {
                zoom = -zoom;
            }
            aff[i][i] = zoom;
            aff[i][3] = -(n - 1.0) / 2.0 * zoom;
        }
        aff[3][3] = 1.0;
        aff
    }
}

/// Elementwise `|a - b| <= atol + rtol * |b|`.
pub fn affines_close(a: &Affine, b: &Affine) -> bool {
    const RTOL: f64 = 1e-5;
    const ATOL: f64 = 1e-8;
    a.iter()
        .flatten()
        .zip(b.iter().flatten())
        .all(|(x, y)| (x - y).abs() <= ATOL + RTOL * y.abs())
}

// ---------------------------------------------------------------------------
// Image
// ---------------------------------------------------------------------------

/// A decoded image: header, raw extension blocks, scaled voxel data.
#[derive(Debug, Clone)]
pub struct NiftiImage {
    pub header: NiftiHeader,
    /// Bytes between the extension flag and `vox_offset`, kept verbatim.
    pub extensions: Vec<u8>,
    pub data: ArrayD<f64>,
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"))
}

impl NiftiImage {
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| TransformerError::io(path, e))?;
        let mut bytes = Vec::new();
        let read = if is_gzip(path) {
            MultiGzDecoder::new(BufReader::new(file)).read_to_end(&mut bytes)
        } else {
            BufReader::new(file).read_to_end(&mut bytes)
        };
        read.map_err(|e| TransformerError::io(path, e))?;
        Self::from_bytes(&bytes, path)
    }

    pub fn from_bytes(bytes: &[u8], path: &Path) -> Result<Self> {
        let (header, big_endian) = NiftiHeader::parse(bytes, path)?;

        let dtype = NiftiType::from_code(header.datatype).ok_or_else(|| {
            TransformerError::invalid(path, format!("unsupported datatype code {}", header.datatype))
        })?;

        let vox_offset = (header.vox_offset.max(0.0) as usize).max(MIN_VOX_OFFSET);
        if vox_offset > bytes.len() {
            return Err(TransformerError::invalid(path, "vox_offset points past end of file"));
        }
        let extensions = if bytes[HEADER_SIZE] != 0 {
            bytes[MIN_VOX_OFFSET..vox_offset].to_vec()
        } else {
            Vec::new()
        };

        let shape = header.shape();
        let n_bytes = shape
            .iter()
            .try_fold(dtype.size(), |acc, &len| acc.checked_mul(len))
            .ok_or_else(|| {
                TransformerError::invalid(path, format!("dimensions {shape:?} are too large"))
            })?;
        let data_end = vox_offset.checked_add(n_bytes).ok_or_else(|| {
            TransformerError::invalid(path, format!("dimensions {shape:?} are too large"))
        })?;
        let raw = bytes
            .get(vox_offset..data_end)
            .ok_or_else(|| {
                TransformerError::invalid(
                    path,
                    format!("expected {n_bytes} bytes of voxel data after offset {vox_offset}"),
                )
            })?;

        let (slope, inter) = header.scaling();
        let values: Vec<f64> = raw
            .chunks_exact(dtype.size())
            .map(|chunk| dtype.decode(chunk, big_endian) * slope + inter)
            .collect();

        // Voxels are stored with x varying fastest.
        let data = ArrayD::from_shape_vec(IxDyn(&shape).f(), values)
            .map_err(|e| TransformerError::invalid(path, e.to_string()))?;

        log::debug!(
            "read {} shape={:?} dtype={:?}{}",
            path.display(),
            shape,
            dtype,
            if big_endian { " (big-endian)" } else { "" }
        );

        Ok(Self {
            header,
            extensions,
            data,
        })
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    pub fn affine(&self) -> Affine {
        self.header.affine()
    }

    /// Drop trailing length-1 axes beyond the third.
    pub fn squeeze(mut self) -> Self {
        while self.data.ndim() > 3 && self.data.shape()[self.data.ndim() - 1] == 1 {
            let last = self.data.ndim() - 1;
            self.data = self.data.index_axis_move(ndarray::Axis(last), 0);
        }
        // The header keeps the original dims; only the array is squeezed.
        self
    }

    /// Number of 3-D volumes: the product of axes beyond the third.
    pub fn n_volumes(&self) -> usize {
        self.data.shape().iter().skip(3).product()
    }
}

/// Encode `data` as a float64 image using `template` for every other
/// header field. `data` is in logical `(x, y, z[, t])` order.
pub fn encode<W: Write>(
    mut writer: W,
    template: &NiftiHeader,
    extensions: &[u8],
    data: ArrayViewD<'_, f64>,
) -> std::io::Result<()> {
    let mut header = template.clone();
    header
        .set_shape(data.shape())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    header.set_data_dtype(NiftiType::Float64);
    header.vox_offset = (MIN_VOX_OFFSET + extensions.len()) as f32;
    header.scl_slope = 1.0;
    header.scl_inter = 0.0;
    header.magic = *MAGIC_SINGLE;

    writer.write_all(&header.to_bytes())?;
    let flag: [u8; 4] = if extensions.is_empty() { [0; 4] } else { [1, 0, 0, 0] };
    writer.write_all(&flag)?;
    writer.write_all(extensions)?;

    // Reversing the axes turns logical iteration into x-fastest order.
    let mut buf = Vec::with_capacity(data.len() * 8);
    for v in data.t().iter() {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    writer.write_all(&buf)?;
    writer.flush()
}

/// Write to `writer`, gzip-compressed when `path` ends in `.gz`.
pub fn encode_for_path<W: Write>(
    writer: W,
    path: &Path,
    template: &NiftiHeader,
    extensions: &[u8],
    data: ArrayViewD<'_, f64>,
) -> std::io::Result<()> {
    if is_gzip(path) {
        let mut gz = GzEncoder::new(writer, Compression::default());
        encode(&mut gz, template, extensions, data)?;
        gz.finish()?;
        Ok(())
    } else {
        encode(writer, template, extensions, data)
    }
}
