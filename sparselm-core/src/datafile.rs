//! Binary matrix files read through a memory map.
//!
//! File layout:
//! 1. Header: 1 byte storage layout (0 = columns, 1 = rows)
//! 2. Header: 1 byte value width in bytes (always 8, f64)
//! 3. Header: 6 reserved bytes
//! 4. Header: 8 bytes for number of rows (u64, little endian)
//! 5. Header: 8 bytes for number of columns (u64, little endian)
//! 6. Data: f64 little endian values in row or column major order

extern crate nalgebra as na;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::error::{Result, SparseLmError};

pub const HEADER_LEN: usize = 24;
const VALUE_WIDTH: usize = 8;
const WRITE_BATCH: usize = 1024;

/// Order in which matrix entries are stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    Columns = 0,
    Rows = 1,
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Layout::Columns => write!(f, "Columns"),
            Layout::Rows => write!(f, "Rows"),
        }
    }
}

fn header(layout: Layout, nrows: usize, ncols: usize) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[0] = layout as u8;
    header[1] = VALUE_WIDTH as u8;
    header[8..16].copy_from_slice(&(nrows as u64).to_le_bytes());
    header[16..24].copy_from_slice(&(ncols as u64).to_le_bytes());
    header
}

/// Writes `matrix` to `path` in the given layout.
pub fn write_matrix<P: AsRef<Path>>(matrix: &na::DMatrix<f64>, path: P, layout: Layout) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let line = match layout {
        Layout::Columns => matrix.nrows(),
        Layout::Rows => matrix.ncols(),
    };
    let mut writer = BufWriter::with_capacity((line * VALUE_WIDTH).max(HEADER_LEN), file);
    writer.write_all(&header(layout, matrix.nrows(), matrix.ncols()))?;

    match layout {
        Layout::Columns => {
            // nalgebra storage is column major already
            for chunk in matrix.as_slice().chunks(WRITE_BATCH * matrix.nrows().max(1)) {
                for v in chunk {
                    writer.write_all(&v.to_le_bytes())?;
                }
            }
        }
        Layout::Rows => {
            for start_row in (0..matrix.nrows()).step_by(WRITE_BATCH) {
                let n_rows = (start_row + WRITE_BATCH).min(matrix.nrows()) - start_row;
                let rows_t = matrix.rows(start_row, n_rows).transpose();
                for v in rows_t.as_slice() {
                    writer.write_all(&v.to_le_bytes())?;
                }
            }
        }
    }
    writer.flush()?;
    tracing::debug!(
        "wrote {}x{} matrix ({}) to {}",
        matrix.nrows(),
        matrix.ncols(),
        layout,
        path.as_ref().display()
    );
    Ok(())
}

/// Writes a vector as an `n x 1` matrix.
pub fn write_vector<P: AsRef<Path>>(vector: &na::DVector<f64>, path: P) -> Result<()> {
    let matrix = na::DMatrix::from_column_slice(vector.len(), 1, vector.as_slice());
    write_matrix(&matrix, path, Layout::Rows)
}

/// A memory-mapped matrix file with row and column slice access.
#[derive(Debug)]
pub struct DataMatrix {
    path: PathBuf,
    mmap: Mmap,
    layout: Layout,
    nrows: usize,
    ncols: usize,
}

impl DataMatrix {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let corrupt = |msg: String| SparseLmError::CorruptDataFile(format!("{}: {}", path.display(), msg));

        let file = File::open(&path)?;
        let len = file.metadata()?.len() as usize;
        if len < HEADER_LEN {
            return Err(corrupt(format!("file has {} bytes, shorter than the header", len)));
        }
        // SAFETY: the file is only read, and is not expected to be modified while mapped.
        let mmap = unsafe { Mmap::map(&file)? };

        let layout = match mmap[0] {
            0 => Layout::Columns,
            1 => Layout::Rows,
            other => return Err(corrupt(format!("invalid storage layout {}", other))),
        };
        if mmap[1] as usize != VALUE_WIDTH {
            return Err(corrupt(format!("unsupported value width {}", mmap[1])));
        }
        let nrows = read_u64(&mmap[8..16]) as usize;
        let ncols = read_u64(&mmap[16..24]) as usize;
        let expected = nrows
            .checked_mul(ncols)
            .and_then(|n| n.checked_mul(VALUE_WIDTH))
            .and_then(|n| n.checked_add(HEADER_LEN))
            .ok_or_else(|| corrupt(format!("dimensions {}x{} overflow", nrows, ncols)))?;
        if len != expected {
            return Err(corrupt(format!(
                "expected {} bytes for a {}x{} matrix, found {}",
                expected, nrows, ncols, len
            )));
        }

        Ok(DataMatrix {
            path,
            mmap,
            layout,
            nrows,
            ncols,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    fn value(&self, row: usize, col: usize) -> f64 {
        let index = match self.layout {
            Layout::Columns => col * self.nrows + row,
            Layout::Rows => row * self.ncols + col,
        };
        let start = HEADER_LEN + index * VALUE_WIDTH;
        read_f64(&self.mmap[start..start + VALUE_WIDTH])
    }

    /// Rows `start..start + count`.
    pub fn read_rows(&self, start: usize, count: usize) -> Result<na::DMatrix<f64>> {
        if start.checked_add(count).is_none_or(|end| end > self.nrows) {
            return Err(SparseLmError::InvalidParameter(format!(
                "Chunk index and size exceed number of rows: {} + {} > {}",
                start, count, self.nrows
            )));
        }
        if self.layout == Layout::Rows {
            let begin = HEADER_LEN + start * self.ncols * VALUE_WIDTH;
            let end = begin + count * self.ncols * VALUE_WIDTH;
            let values = decode(&self.mmap[begin..end]);
            return Ok(na::DMatrix::from_row_slice(count, self.ncols, &values));
        }
        Ok(na::DMatrix::from_fn(count, self.ncols, |i, j| self.value(start + i, j)))
    }

    /// Columns `start..start + count`.
    pub fn read_columns(&self, start: usize, count: usize) -> Result<na::DMatrix<f64>> {
        if start.checked_add(count).is_none_or(|end| end > self.ncols) {
            return Err(SparseLmError::InvalidParameter(format!(
                "Chunk index and size exceed number of columns: {} + {} > {}",
                start, count, self.ncols
            )));
        }
        if self.layout == Layout::Columns {
            let begin = HEADER_LEN + start * self.nrows * VALUE_WIDTH;
            let end = begin + count * self.nrows * VALUE_WIDTH;
            let values = decode(&self.mmap[begin..end]);
            return Ok(na::DMatrix::from_column_slice(self.nrows, count, &values));
        }
        Ok(na::DMatrix::from_fn(self.nrows, count, |i, j| self.value(i, start + j)))
    }

    pub fn to_matrix(&self) -> Result<na::DMatrix<f64>> {
        self.read_rows(0, self.nrows)
    }

    /// The file as a vector; it must hold a single row or a single column.
    pub fn to_vector(&self) -> Result<na::DVector<f64>> {
        if self.ncols != 1 && self.nrows != 1 {
            return Err(SparseLmError::DimensionMismatch(self.nrows, self.ncols, self.nrows * self.ncols, 1));
        }
        let values = decode(&self.mmap[HEADER_LEN..]);
        Ok(na::DVector::from_vec(values))
    }

    /// Splits the matrix along its storage axis into `n_chunks` pieces; the
    /// first `len % n_chunks` pieces get one extra line.
    pub fn chunks(&self, n_chunks: usize) -> Result<Vec<na::DMatrix<f64>>> {
        let len = match self.layout {
            Layout::Columns => self.ncols,
            Layout::Rows => self.nrows,
        };
        if n_chunks == 0 || n_chunks > len {
            return Err(SparseLmError::InvalidParameter(format!(
                "cannot split {} lines into {} chunks",
                len, n_chunks
            )));
        }
        let base_chunk_size = len / n_chunks;
        let remainder = len % n_chunks;
        let mut chunks = Vec::with_capacity(n_chunks);
        let mut start = 0;
        for i in 0..n_chunks {
            let chunk_size = if i < remainder {
                base_chunk_size + 1
            } else {
                base_chunk_size
            };
            chunks.push(match self.layout {
                Layout::Columns => self.read_columns(start, chunk_size)?,
                Layout::Rows => self.read_rows(start, chunk_size)?,
            });
            start += chunk_size;
        }
        Ok(chunks)
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

fn read_f64(bytes: &[u8]) -> f64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    f64::from_le_bytes(buf)
}

fn decode(bytes: &[u8]) -> Vec<f64> {
    bytes.chunks_exact(VALUE_WIDTH).map(read_f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn matrix() -> na::DMatrix<f64> {
        na::DMatrix::from_fn(5, 3, |i, j| (i * 10 + j) as f64 + 0.5)
    }

    #[test]
    fn round_trips_in_both_layouts() {
        let dir = tempdir().unwrap();
        for layout in [Layout::Rows, Layout::Columns] {
            let path = dir.path().join(format!("m-{}.bin", layout));
            write_matrix(&matrix(), &path, layout).unwrap();
            let data = DataMatrix::open(&path).unwrap();
            assert_eq!(data.layout(), layout);
            assert_eq!((data.nrows(), data.ncols()), (5, 3));
            assert_eq!(data.to_matrix().unwrap(), matrix());
            assert_eq!(data.read_rows(1, 2).unwrap(), matrix().rows(1, 2).clone_owned());
            assert_eq!(data.read_columns(2, 1).unwrap(), matrix().columns(2, 1).clone_owned());
        }
    }

    #[test]
    fn header_matches_the_documented_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.bin");
        write_matrix(&matrix(), &path, Layout::Rows).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 15 * 8);
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[1], 8);
        assert_eq!(read_u64(&bytes[8..16]), 5);
        assert_eq!(read_u64(&bytes[16..24]), 3);
        // second value in row-major order is (0, 1)
        assert_eq!(read_f64(&bytes[32..40]), 1.5);
    }

    #[test]
    fn out_of_range_reads_fail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.bin");
        write_matrix(&matrix(), &path, Layout::Columns).unwrap();
        let data = DataMatrix::open(&path).unwrap();
        assert!(data.read_rows(4, 2).is_err());
        assert!(data.read_columns(3, 1).is_err());
        assert!(data.read_rows(usize::MAX, 2).is_err());
        assert!(data.read_columns(usize::MAX, 2).is_err());
        assert!(data.to_vector().is_err());
    }

    #[test]
    fn corrupt_files_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.bin");
        write_matrix(&matrix(), &path, Layout::Rows).unwrap();
        let bytes = std::fs::read(&path).unwrap();

        let truncated = dir.path().join("truncated.bin");
        std::fs::write(&truncated, &bytes[..bytes.len() - 8]).unwrap();
        assert!(matches!(DataMatrix::open(&truncated), Err(SparseLmError::CorruptDataFile(_))));

        let mut bad_layout = bytes.clone();
        bad_layout[0] = 7;
        let bad = dir.path().join("bad.bin");
        std::fs::write(&bad, &bad_layout).unwrap();
        assert!(matches!(DataMatrix::open(&bad), Err(SparseLmError::CorruptDataFile(_))));

        let short = dir.path().join("short.bin");
        std::fs::write(&short, [1u8, 8, 0]).unwrap();
        assert!(matches!(DataMatrix::open(&short), Err(SparseLmError::CorruptDataFile(_))));
    }

    #[test]
    fn vectors_and_chunks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("v.bin");
        let v = na::DVector::from_vec(vec![1.0, -2.0, 3.5]);
        write_vector(&v, &path).unwrap();
        assert_eq!(DataMatrix::open(&path).unwrap().to_vector().unwrap(), v);

        let path = dir.path().join("m.bin");
        write_matrix(&matrix(), &path, Layout::Rows).unwrap();
        let chunks = DataMatrix::open(&path).unwrap().chunks(2).unwrap();
        assert_eq!(chunks[0].nrows(), 3);
        assert_eq!(chunks[1].nrows(), 2);
        assert_eq!(chunks[1].row(0), matrix().row(3));
    }
}
