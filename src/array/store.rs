//! On-disk array files.
//!
//! Layout:
//!
//! ```text
//! "CHNK" | version: u32 LE | header_len: u64 LE | header (JSON) | data (f64 LE)
//! ```
//!
//! The header lists coordinates and variables; each variable records the
//! offset of its data relative to the start of the data section.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::graph::{FilePart, Node};
use super::{shape_nbytes, ArrayError, Chunking, Coordinate, LazyArray, ITEMSIZE};

const MAGIC: &[u8; 4] = b"CHNK";
const VERSION: u32 = 1;
const PREAMBLE_LEN: u64 = 16;

#[derive(Debug, Serialize, Deserialize)]
struct FileHeader {
    coords: Vec<CoordHeader>,
    variables: Vec<VariableHeader>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CoordHeader {
    name: String,
    values: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    units: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VariableHeader {
    name: String,
    dims: Vec<String>,
    shape: Vec<usize>,
    offset: u64,
}

fn format_error(path: &Path, reason: impl Into<String>) -> ArrayError {
    ArrayError::Format {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Materialize `arrays` into one file. Coordinates are shared by name; the
/// first array carrying a coordinate wins.
pub fn write_dataset(path: impl AsRef<Path>, arrays: &[&LazyArray]) -> Result<(), ArrayError> {
    let path = path.as_ref();

    let mut coords: Vec<CoordHeader> = Vec::new();
    let mut variables = Vec::with_capacity(arrays.len());
    let mut data = Vec::with_capacity(arrays.len());
    let mut offset = 0u64;

    for array in arrays {
        for c in array.coords() {
            if !coords.iter().any(|h| h.name == c.name) {
                coords.push(CoordHeader {
                    name: c.name.clone(),
                    values: c.values.to_vec(),
                    units: c.units.clone(),
                });
            }
        }
        let values = array.compute()?;
        variables.push(VariableHeader {
            name: array.name().to_string(),
            dims: array.dims().to_vec(),
            shape: array.shape().to_vec(),
            offset,
        });
        offset += (values.len() * ITEMSIZE) as u64;
        data.push(values);
    }

    let header = serde_json::to_vec(&FileHeader { coords, variables })
        .map_err(|e| format_error(path, e.to_string()))?;

    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(MAGIC)?;
    out.write_all(&VERSION.to_le_bytes())?;
    out.write_all(&(header.len() as u64).to_le_bytes())?;
    out.write_all(&header)?;
    for values in &data {
        for v in values {
            out.write_all(&v.to_le_bytes())?;
        }
    }
    out.flush()?;
    Ok(())
}

/// Read the header of an array file, returning it with the absolute offset of
/// the data section.
fn read_header(path: &Path) -> Result<(FileHeader, u64), ArrayError> {
    let mut file = File::open(path)?;
    let mut preamble = [0u8; PREAMBLE_LEN as usize];
    file.read_exact(&mut preamble)
        .map_err(|_| format_error(path, "file too short"))?;

    if &preamble[..4] != MAGIC {
        return Err(format_error(path, "bad magic"));
    }
    let mut word = [0u8; 4];
    word.copy_from_slice(&preamble[4..8]);
    let version = u32::from_le_bytes(word);
    if version != VERSION {
        return Err(format_error(path, format!("unsupported version {}", version)));
    }
    let mut len = [0u8; 8];
    len.copy_from_slice(&preamble[8..16]);
    let header_len = u64::from_le_bytes(len);

    let file_len = file.metadata()?.len();
    let data_len = file_len
        .checked_sub(PREAMBLE_LEN)
        .and_then(|rest| rest.checked_sub(header_len))
        .ok_or_else(|| format_error(path, "header length exceeds file size"))?;

    let mut header = vec![0u8; header_len as usize];
    file.read_exact(&mut header)
        .map_err(|_| format_error(path, "truncated header"))?;
    let header: FileHeader =
        serde_json::from_slice(&header).map_err(|e| format_error(path, e.to_string()))?;
    check_header(path, &header, data_len)?;

    Ok((header, PREAMBLE_LEN + header_len))
}

/// Reject headers whose variables do not fit the data section or whose
/// coordinates disagree with the axes they label.
fn check_header(path: &Path, header: &FileHeader, data_len: u64) -> Result<(), ArrayError> {
    for var in &header.variables {
        if var.dims.len() != var.shape.len() {
            return Err(format_error(
                path,
                format!(
                    "variable '{}' has {} dims for a {}-d shape",
                    var.name,
                    var.dims.len(),
                    var.shape.len()
                ),
            ));
        }
        let end = shape_nbytes(&var.shape)
            .and_then(|n| var.offset.checked_add(n as u64))
            .ok_or_else(|| format_error(path, format!("variable '{}' is too large", var.name)))?;
        if end > data_len {
            return Err(format_error(
                path,
                format!(
                    "data of '{}' ends at byte {} of a {}-byte section",
                    var.name, end, data_len
                ),
            ));
        }
        for (dim, &len) in var.dims.iter().zip(&var.shape) {
            if let Some(coord) = header.coords.iter().find(|c| &c.name == dim) {
                if coord.values.len() != len {
                    return Err(format_error(
                        path,
                        format!(
                            "coordinate '{}' has {} values for an axis of {}",
                            dim,
                            coord.values.len(),
                            len
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Open variable `var` across `paths`, concatenated along `concat_dim`.
///
/// Only headers are read here; data is read when the array is evaluated.
/// With `auto` chunking each file becomes one block along `concat_dim`.
pub fn open_mfdataset(
    paths: &[PathBuf],
    var: &str,
    concat_dim: &str,
    chunking: &Chunking,
) -> Result<LazyArray, ArrayError> {
    let Some(first_path) = paths.first() else {
        return Err(ArrayError::NoFiles(var.to_string()));
    };

    let mut parts = Vec::with_capacity(paths.len());
    let mut first: Option<(VariableHeader, Vec<CoordHeader>)> = None;
    let mut concat_values: Vec<f64> = Vec::new();
    let mut axis = 0;

    for path in paths {
        let (header, data_start) = read_header(path)?;
        let variable = header
            .variables
            .iter()
            .find(|v| v.name == var)
            .cloned()
            .ok_or_else(|| ArrayError::MissingVariable {
                var: var.to_string(),
                path: path.clone(),
            })?;

        match &first {
            None => {
                axis = variable
                    .dims
                    .iter()
                    .position(|d| d == concat_dim)
                    .ok_or_else(|| ArrayError::UnknownDimension(concat_dim.to_string()))?;
            }
            Some((reference, _)) => {
                let compatible = reference.dims == variable.dims
                    && reference
                        .shape
                        .iter()
                        .zip(&variable.shape)
                        .enumerate()
                        .all(|(i, (a, b))| i == axis || a == b);
                if !compatible {
                    return Err(ArrayError::ShapeMismatch(format!(
                        "{} has {:?} {:?}, expected {:?} {:?} outside '{}'",
                        path.display(),
                        variable.dims,
                        variable.shape,
                        reference.dims,
                        reference.shape,
                        concat_dim
                    )));
                }
            }
        }

        match header.coords.iter().find(|c| c.name == concat_dim) {
            Some(c) => concat_values.extend_from_slice(&c.values),
            None => {
                let start = concat_values.len();
                concat_values.extend((start..start + variable.shape[axis]).map(|i| i as f64));
            }
        }

        parts.push(FilePart {
            path: path.clone(),
            offset: data_start + variable.offset,
            shape: variable.shape.clone(),
        });
        if first.is_none() {
            first = Some((variable, header.coords));
        }
    }

    let Some((reference, coord_headers)) = first else {
        return Err(ArrayError::NoFiles(first_path.display().to_string()));
    };

    let dims = reference.dims.clone();
    let mut shape = reference.shape.clone();
    shape[axis] = parts
        .iter()
        .try_fold(0usize, |n, p| n.checked_add(p.shape[axis]))
        .ok_or_else(|| {
            ArrayError::ShapeMismatch(format!("'{}' is too long to concatenate", concat_dim))
        })?;
    if shape_nbytes(&shape).is_none() {
        return Err(ArrayError::ShapeMismatch(format!(
            "concatenated shape {:?} overflows the address space",
            shape
        )));
    }

    let coords = dims
        .iter()
        .filter_map(|d| {
            let header = coord_headers.iter().find(|c| &c.name == d);
            if d == concat_dim {
                Some(Coordinate {
                    name: d.clone(),
                    values: concat_values.iter().copied().collect(),
                    units: header.and_then(|h| h.units.clone()),
                })
            } else {
                header.map(|h| Coordinate {
                    name: h.name.clone(),
                    values: h.values.iter().copied().collect(),
                    units: h.units.clone(),
                })
            }
        })
        .collect();

    let chunks = match chunking {
        Chunking::Auto => {
            let mut chunks: Vec<Vec<usize>> = shape.iter().map(|&n| vec![n]).collect();
            chunks[axis] = parts.iter().map(|p| p.shape[axis]).collect();
            chunks
        }
        explicit => explicit.normalize(&dims, &shape)?,
    };

    Ok(LazyArray::from_node(
        var.to_string(),
        dims,
        shape,
        chunks,
        coords,
        Node::Files { parts, axis },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(len: usize, origin: &str, seed: u64) -> LazyArray {
        let dims = vec!["time".to_string(), "lat".to_string()];
        let coords = vec![
            Coordinate::arange("time", len, Some(origin)),
            Coordinate::arange("lat", 3, None),
        ];
        LazyArray::random("tas", dims, vec![len, 3], coords, &Chunking::Auto, seed).unwrap()
    }

    #[test]
    fn should_round_trip_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.chnk");
        let a = sample(10, "days since 2001-01-01", 1);
        a.to_file(&path).unwrap();

        let b = open_mfdataset(&[path], "tas", "time", &Chunking::Auto).unwrap();
        assert_eq!(b.shape(), a.shape());
        assert_eq!(b.compute().unwrap(), a.compute().unwrap());
        assert_eq!(
            b.coord("time").and_then(|c| c.units.as_deref()),
            Some("days since 2001-01-01")
        );
    }

    #[test]
    fn should_concatenate_files_along_time() {
        let dir = tempfile::tempdir().unwrap();
        let first = sample(4, "days since 2001-01-01", 1);
        let second = sample(6, "days since 2001-01-01", 2);
        let p1 = dir.path().join("1.chnk");
        let p2 = dir.path().join("2.chnk");
        first.to_file(&p1).unwrap();
        second.to_file(&p2).unwrap();

        let joined = open_mfdataset(&[p1, p2], "tas", "time", &Chunking::Auto).unwrap();
        assert_eq!(joined.shape(), &[10, 3]);
        assert_eq!(joined.chunks()[0], vec![4, 6]);

        let mut expected = first.compute().unwrap();
        expected.extend(second.compute().unwrap());
        assert_eq!(joined.compute().unwrap(), expected);
    }

    #[test]
    fn should_fail_when_variable_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.chnk");
        sample(3, "days since 2001-01-01", 1).to_file(&path).unwrap();
        let err = open_mfdataset(&[path], "pr", "time", &Chunking::Auto).unwrap_err();
        assert!(matches!(err, ArrayError::MissingVariable { .. }));
    }

    #[test]
    fn should_reject_files_without_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.chnk");
        std::fs::write(&path, b"not an array file at all").unwrap();
        let err = open_mfdataset(&[path], "tas", "time", &Chunking::Auto).unwrap_err();
        assert!(matches!(err, ArrayError::Format { .. }));
    }

    fn write_raw(path: &Path, header_len: u64, header: &[u8], data: &[u8]) {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&header_len.to_le_bytes());
        bytes.extend_from_slice(header);
        bytes.extend_from_slice(data);
        std::fs::write(path, bytes).unwrap();
    }

    fn open_one(path: &Path) -> Result<LazyArray, ArrayError> {
        open_mfdataset(&[path.to_path_buf()], "tas", "time", &Chunking::Auto)
    }

    #[test]
    fn should_reject_header_longer_than_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.chnk");
        write_raw(&path, u64::MAX / 2, b"{}", &[]);
        assert!(matches!(open_one(&path), Err(ArrayError::Format { .. })));
    }

    const TAS_HEADER: &[u8] =
        br#"{"coords":[],"variables":[{"name":"tas","dims":["time"],"shape":[4],"offset":0}]}"#;

    #[test]
    fn should_reject_data_section_too_short() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.chnk");
        let header = TAS_HEADER;
        write_raw(&path, header.len() as u64, header, &[0u8; 3 * ITEMSIZE]);
        assert!(matches!(open_one(&path), Err(ArrayError::Format { .. })));
    }

    #[test]
    fn should_reject_coordinate_of_wrong_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coord.chnk");
        let header = concat!(
            r#"{"coords":[{"name":"time","values":[0.0,1.0]}],"#,
            r#""variables":[{"name":"tas","dims":["time"],"shape":[4],"offset":0}]}"#
        )
        .as_bytes();
        write_raw(&path, header.len() as u64, header, &[0u8; 4 * ITEMSIZE]);
        assert!(matches!(open_one(&path), Err(ArrayError::Format { .. })));
    }

    #[test]
    fn should_accept_well_formed_raw_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.chnk");
        let header = TAS_HEADER;
        write_raw(&path, header.len() as u64, header, &[0u8; 4 * ITEMSIZE]);
        let array = open_one(&path).unwrap();
        assert_eq!(array.compute().unwrap(), vec![0.0; 4]);
    }
}
