//! Native dataset container.
//!
//! Layout (inside a single gzip stream):
//!
//! ```text
//! magic   b"MDSA"
//! version u32 LE
//! hlen    u64 LE
//! header  JSON, hlen bytes (dimensions, attributes, variable descriptors)
//! payload f32 LE values of each variable, in header order
//! ```
//!
//! The gzip header carries no timestamp and maps are ordered, so writing
//! the same dataset twice produces identical bytes.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::dataset::{Dataset, Dimension, Variable};
use crate::error::{DatasetError, DatasetResult};
use crate::io::{DatasetFormat, DatasetIo};

const MAGIC: &[u8; 4] = b"MDSA";
const VERSION: u32 = 1;
const MAX_HEADER_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    dimensions: Vec<Dimension>,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    variables: Vec<VariableHeader>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VariableHeader {
    name: String,
    dims: Vec<String>,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    len: usize,
}

/// Reads and writes the native gzip container.
#[derive(Debug, Clone, Default)]
pub struct GridArchiveIo {
    compression: u32,
}

impl GridArchiveIo {
    pub fn new() -> Self {
        Self { compression: 6 }
    }

    /// Use a specific gzip level (0-9).
    pub fn with_compression(level: u32) -> Self {
        Self {
            compression: level.min(9),
        }
    }
}

impl DatasetIo for GridArchiveIo {
    fn format(&self) -> DatasetFormat {
        DatasetFormat::Archive
    }

    fn read_dataset(&self, path: &Path) -> DatasetResult<Dataset> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(DatasetError::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let mut reader = GzDecoder::new(BufReader::new(file));

        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .map_err(|e| truncated(path, e))?;
        if &magic != MAGIC {
            return Err(DatasetError::invalid_format(format!(
                "{}: not a dataset archive",
                path.display()
            )));
        }

        let version = read_u32(&mut reader).map_err(|e| truncated(path, e))?;
        if version != VERSION {
            return Err(DatasetError::invalid_format(format!(
                "{}: unsupported archive version {}",
                path.display(),
                version
            )));
        }

        let header_len = read_u64(&mut reader).map_err(|e| truncated(path, e))?;
        if header_len > MAX_HEADER_BYTES {
            return Err(DatasetError::invalid_format(format!(
                "{}: header length {} exceeds limit",
                path.display(),
                header_len
            )));
        }
        let mut header_bytes = vec![0u8; header_len as usize];
        reader
            .read_exact(&mut header_bytes)
            .map_err(|e| truncated(path, e))?;
        let header: Header = serde_json::from_slice(&header_bytes)?;

        let mut dataset = Dataset::new();
        for dim in header.dimensions {
            dataset.add_dimension(dim.name, dim.len)?;
        }
        for (name, value) in header.attributes {
            dataset.set_attribute(name, value);
        }
        for var in header.variables {
            let expected: usize = var
                .dims
                .iter()
                .map(|d| dataset.dimension_len(d).unwrap_or(0))
                .product();
            if expected != var.len {
                return Err(DatasetError::invalid_format(format!(
                    "{}: variable {} declares {} values, dimensions give {}",
                    path.display(),
                    var.name,
                    var.len,
                    expected
                )));
            }
            let data = read_f32s(&mut reader, var.len).map_err(|e| truncated(path, e))?;
            dataset.add_variable(
                var.name,
                Variable {
                    dims: var.dims,
                    data,
                    attributes: var.attributes,
                },
            )?;
        }

        Ok(dataset)
    }

    fn write_dataset(&self, dataset: &Dataset, path: &Path) -> DatasetResult<()> {
        let header = Header {
            dimensions: dataset.dimensions().to_vec(),
            attributes: dataset.attributes().clone(),
            variables: dataset
                .variables()
                .map(|(name, var)| VariableHeader {
                    name: name.to_string(),
                    dims: var.dims.clone(),
                    attributes: var.attributes.clone(),
                    len: var.data.len(),
                })
                .collect(),
        };
        let header_bytes = serde_json::to_vec(&header)?;

        let file = File::create(path)?;
        let mut writer = GzEncoder::new(BufWriter::new(file), Compression::new(self.compression));
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&(header_bytes.len() as u64).to_le_bytes())?;
        writer.write_all(&header_bytes)?;
        for (_, var) in dataset.variables() {
            write_f32s(&mut writer, &var.data)?;
        }

        let buffered = writer.finish()?;
        let file = buffered
            .into_inner()
            .map_err(|e| DatasetError::Io(e.into_error()))?;
        file.sync_all()?;
        Ok(())
    }
}

fn truncated(path: &Path, err: io::Error) -> DatasetError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        DatasetError::invalid_format(format!("{}: truncated archive", path.display()))
    } else {
        DatasetError::invalid_format(format!("{}: {}", path.display(), err))
    }
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn write_f32s<W: Write>(writer: &mut W, data: &[f32]) -> io::Result<()> {
    if cfg!(target_endian = "little") {
        writer.write_all(bytemuck::cast_slice(data))
    } else {
        for v in data {
            writer.write_all(&v.to_le_bytes())?;
        }
        Ok(())
    }
}

fn read_f32s<R: Read>(reader: &mut R, len: usize) -> io::Result<Vec<f32>> {
    let mut out = vec![0f32; len];
    reader.read_exact(bytemuck::cast_slice_mut(&mut out))?;
    if cfg!(target_endian = "big") {
        for v in &mut out {
            *v = f32::from_bits(v.to_bits().swap_bytes());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        let mut ds = Dataset::new();
        ds.add_dimension("time", 2).unwrap();
        ds.add_dimension("lat", 3).unwrap();
        ds.add_dimension("lon", 4).unwrap();
        ds.set_attribute("Title", "GEOS-FP surface fields");
        let data: Vec<f32> = (0..24).map(|i| 270.0 + i as f32).collect();
        ds.add_variable(
            "TS",
            Variable::new(["time", "lat", "lon"], data).with_attribute("units", "K"),
        )
        .unwrap();
        ds.add_variable("lat", Variable::new(["lat"], vec![-2.0, 0.0, 2.0]))
            .unwrap();
        ds
    }

    #[test]
    fn test_write_then_read_preserves_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.grd");
        let io = GridArchiveIo::new();

        let ds = sample();
        io.write_dataset(&ds, &path).unwrap();
        let back = io.read_dataset(&path).unwrap();

        assert!(ds.fields_equal(&back));
        assert_eq!(back.variable("TS").unwrap().attribute("units"), Some("K"));
        assert_eq!(back.attribute("Title"), Some("GEOS-FP surface fields"));
    }

    #[test]
    fn test_encoding_is_byte_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.grd");
        let b = dir.path().join("b.grd");
        let io = GridArchiveIo::new();

        io.write_dataset(&sample(), &a).unwrap();
        io.write_dataset(&sample(), &b).unwrap();

        assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = GridArchiveIo::new()
            .read_dataset(&dir.path().join("absent.grd"))
            .unwrap_err();
        assert!(matches!(err, DatasetError::NotFound(_)));
    }

    #[test]
    fn test_garbage_is_invalid_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.grd");
        std::fs::write(&path, b"definitely not gzip").unwrap();
        let err = GridArchiveIo::new().read_dataset(&path).unwrap_err();
        assert!(matches!(err, DatasetError::InvalidFormat(_)));
    }

    #[test]
    fn test_truncated_archive_is_invalid_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.grd");
        let io = GridArchiveIo::with_compression(0);
        io.write_dataset(&sample(), &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        assert!(matches!(
            io.read_dataset(&path).unwrap_err(),
            DatasetError::InvalidFormat(_)
        ));
    }

    #[test]
    fn test_write_atomic_leaves_no_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2014/08/GEOSFP.20140820.A1.2x25.nc");
        GridArchiveIo::new().write_atomic(&sample(), &path).unwrap();

        assert!(path.exists());
        assert!(!geosfp_common::partial_path(&path).exists());
    }
}
