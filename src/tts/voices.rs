//! Speaker style embeddings for kitten / kokoro models (`voices.npz`).
//!
//! The archive is a ZIP of `.npy` members, one per voice.  Each member is a
//! float32 C-order matrix whose row `i` is the style vector to use for an
//! input of `i` characters; longer inputs use the last row.
//!
//! Voice names are sorted so speaker ids are stable across loads.

use std::{
    fs::File,
    io::{Read, Seek},
    path::Path,
};

use anyhow::{bail, ensure, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use zip::ZipArchive;

const NPY_MAGIC: &[u8] = b"\x93NUMPY";

/// Largest `.npy` member read from a voice archive.
pub const MAX_VOICE_BYTES: u64 = 64 << 20;

static RE_DESCR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"['"]descr['"]\s*:\s*['"]([^'"]+)['"]"#).expect("static regex"));
static RE_FORTRAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"['"]fortran_order['"]\s*:\s*(True|False)"#).expect("static regex"));
static RE_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"['"]shape['"]\s*:\s*\(([^)]*)\)"#).expect("static regex"));

/// Row-major float32 matrix.  A 1-D array is a single row.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl StyleMatrix {
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        ensure!(rows > 0 && cols > 0, "empty style matrix {rows}x{cols}");
        let len = rows
            .checked_mul(cols)
            .with_context(|| format!("style matrix {rows}x{cols} is too large"))?;
        ensure!(data.len() == len, "style matrix {rows}x{cols} has {} values", data.len());
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Style vector for an input of `text_len` characters, clamped to the last row.
    pub fn row_for(&self, text_len: usize) -> &[f32] {
        let i = text_len.min(self.rows - 1);
        &self.data[i * self.cols..(i + 1) * self.cols]
    }
}

/// Header fields of a `.npy` member.
struct NpyHeader {
    big_endian: bool,
    shape: Vec<usize>,
    data_offset: usize,
}

fn read_header(bytes: &[u8]) -> Result<NpyHeader> {
    ensure!(bytes.len() >= 10 && bytes.starts_with(NPY_MAGIC), "not an NPY array (bad magic)");
    let (header_len, header_start) = match bytes[6] {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            ensure!(bytes.len() >= 12, "NPY v{} header truncated", bytes[6]);
            (u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize, 12)
        }
        v => bail!("unsupported NPY version {}.{}", v, bytes[7]),
    };
    let data_offset = header_start + header_len;
    ensure!(bytes.len() >= data_offset, "NPY header truncated");
    let header = std::str::from_utf8(&bytes[header_start..data_offset])
        .context("NPY header is not UTF-8")?;

    let descr = RE_DESCR
        .captures(header)
        .and_then(|c| c.get(1))
        .context("NPY header missing 'descr'")?
        .as_str();
    let big_endian = match descr {
        "<f4" | "=f4" | "|f4" => false,
        ">f4" => true,
        other => bail!("unsupported dtype '{other}', expected float32"),
    };

    if let Some(c) = RE_FORTRAN.captures(header) {
        ensure!(&c[1] == "False", "Fortran-order arrays are not supported");
    }

    let dims = RE_SHAPE
        .captures(header)
        .and_then(|c| c.get(1))
        .context("NPY header missing 'shape'")?
        .as_str();
    let shape = dims
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| d.parse::<usize>().with_context(|| format!("bad shape dim '{d}'")))
        .collect::<Result<Vec<_>>>()?;

    Ok(NpyHeader { big_endian, shape, data_offset })
}

/// Parse one `.npy` member into a [`StyleMatrix`].
pub fn parse_npy(bytes: &[u8]) -> Result<StyleMatrix> {
    let header = read_header(bytes)?;
    let (rows, cols) = match header.shape.as_slice() {
        [n] => (1, *n),
        [r, c] => (*r, *c),
        [r, rest @ ..] => {
            let cols = rest
                .iter()
                .try_fold(1usize, |acc, &d| acc.checked_mul(d))
                .with_context(|| format!("NPY shape {:?} is too large", header.shape))?;
            (*r, cols)
        }
        [] => bail!("scalar NPY arrays are not style matrices"),
    };
    let need = rows
        .checked_mul(cols)
        .and_then(|n| n.checked_mul(4))
        .with_context(|| format!("NPY shape {:?} is too large", header.shape))?;
    let payload = &bytes[header.data_offset..];
    ensure!(
        payload.len() >= need,
        "NPY data truncated: need {} bytes, have {}",
        need,
        payload.len()
    );
    let data = payload[..need]
        .chunks_exact(4)
        .map(|b| {
            let b = [b[0], b[1], b[2], b[3]];
            if header.big_endian { f32::from_be_bytes(b) } else { f32::from_le_bytes(b) }
        })
        .collect();
    StyleMatrix::new(rows, cols, data)
}

/// Named style matrices, indexed by speaker id.
#[derive(Debug, Clone)]
pub struct VoiceBank {
    names: Vec<String>,
    styles: Vec<StyleMatrix>,
}

impl VoiceBank {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Cannot open voices: {}", path.display()))?;
        Self::from_archive(file).with_context(|| format!("Cannot load voices: {}", path.display()))
    }

    /// Members larger than [`MAX_VOICE_BYTES`] are rejected.
    pub fn from_archive<R: Read + Seek>(reader: R) -> Result<Self> {
        Self::from_archive_limited(reader, MAX_VOICE_BYTES)
    }

    fn from_archive_limited<R: Read + Seek>(reader: R, limit: u64) -> Result<Self> {
        let mut archive = ZipArchive::new(reader).context("Cannot open ZIP archive")?;
        let mut voices = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).context("Failed to read ZIP entry")?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().trim_end_matches(".npy").to_string();
            ensure!(
                entry.size() <= limit,
                "voice '{name}' declares {} bytes, limit is {limit}",
                entry.size()
            );
            let mut buf = Vec::new();
            (&mut entry)
                .take(limit + 1)
                .read_to_end(&mut buf)
                .context("Failed to read NPY entry")?;
            ensure!(buf.len() as u64 <= limit, "voice '{name}' is larger than {limit} bytes");
            let style = parse_npy(&buf).with_context(|| format!("Bad voice '{name}'"))?;
            voices.push((name, style));
        }
        ensure!(!voices.is_empty(), "voice archive is empty");
        voices.sort_by(|a, b| a.0.cmp(&b.0));
        let (names, styles) = voices.into_iter().unzip();
        Ok(Self { names, styles })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn name(&self, speaker: usize) -> Option<&str> {
        self.names.get(speaker).map(String::as_str)
    }

    pub fn style(&self, speaker: usize, text_len: usize) -> Option<&[f32]> {
        self.styles.get(speaker).map(|m| m.row_for(text_len))
    }
}
