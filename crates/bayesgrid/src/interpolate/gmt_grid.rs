//! GMT native binary float grids (`=bf`).
//!
//! # Layout
//!
//! A fixed 892-byte little-endian header followed by `n_rows * n_columns`
//! `f32` values, stored row by row from north to south:
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       12    n_columns, n_rows, registration (u32)
//! 12      32    west, east, south, north (f64)
//! 44      16    z_min, z_max (f64)
//! 60      16    x_inc, y_inc (f64)
//! 76      16    z_scale_factor, z_add_offset (f64)
//! 92      240   x_units, y_units, z_units (80 bytes each, NUL padded)
//! 332     80    title
//! 412     320   command
//! 732     160   remark
//! ```
//!
//! In memory the values are an `(n_rows, n_columns)` array with row 0 at
//! the south edge, so `values[[j, i]]` sits at `(x[i], y[j])`.

use std::path::Path;

use ndarray::Array2;

use crate::utils::nan_min_max;

/// Size of the grid header in bytes.
pub const HEADER_SIZE: usize = 892;

const TITLE_AT: usize = 332;
const TITLE_LEN: usize = 80;
const REMARK_AT: usize = 732;
const REMARK_LEN: usize = 160;

/// Errors reading or writing a native grid.
#[derive(Debug, thiserror::Error)]
pub enum GridFormatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("grid truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("invalid grid dimensions {n_columns}x{n_rows}")]
    InvalidDimensions { n_columns: u32, n_rows: u32 },

    #[error("unknown registration {0}")]
    UnknownRegistration(u32),
}

/// Whether nodes sit on grid lines or at cell centres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Registration {
    #[default]
    Gridline,
    Pixel,
}

impl Registration {
    fn code(self) -> u32 {
        match self {
            Registration::Gridline => 0,
            Registration::Pixel => 1,
        }
    }

    fn from_code(code: u32) -> Result<Self, GridFormatError> {
        match code {
            0 => Ok(Registration::Gridline),
            1 => Ok(Registration::Pixel),
            other => Err(GridFormatError::UnknownRegistration(other)),
        }
    }
}

/// A regular grid in GMT's native binary float format.
#[derive(Debug, Clone, PartialEq)]
pub struct GmtGrid {
    pub registration: Registration,
    /// `[west, east, south, north]`.
    pub region: [f64; 4],
    /// `[x_inc, y_inc]`.
    pub increment: [f64; 2],
    pub title: String,
    pub remark: String,
    /// Values with shape `(n_rows, n_columns)`, south row first.
    pub values: Array2<f64>,
}

impl GmtGrid {
    /// Gridline-registered grid with empty metadata.
    pub fn new(region: [f64; 4], increment: [f64; 2], values: Array2<f64>) -> Self {
        Self {
            registration: Registration::Gridline,
            region,
            increment,
            title: String::new(),
            remark: String::new(),
            values,
        }
    }

    #[inline]
    pub fn n_columns(&self) -> usize {
        self.values.ncols()
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    /// Node x coordinates.
    pub fn x(&self) -> Vec<f64> {
        self.axis(self.region[0], self.increment[0], self.n_columns())
    }

    /// Node y coordinates, ascending.
    pub fn y(&self) -> Vec<f64> {
        self.axis(self.region[2], self.increment[1], self.n_rows())
    }

    fn axis(&self, start: f64, inc: f64, n: usize) -> Vec<f64> {
        let shift = match self.registration {
            Registration::Gridline => 0.0,
            Registration::Pixel => 0.5,
        };
        (0..n).map(|i| start + (i as f64 + shift) * inc).collect()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GridFormatError> {
        let header: &[u8; HEADER_SIZE] = bytes
            .get(..HEADER_SIZE)
            .and_then(|h| h.try_into().ok())
            .ok_or(GridFormatError::Truncated {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            })?;

        let n_columns = u32_at(header, 0);
        let n_rows = u32_at(header, 4);
        if n_columns == 0 || n_rows == 0 {
            return Err(GridFormatError::InvalidDimensions { n_columns, n_rows });
        }
        let registration = Registration::from_code(u32_at(header, 8))?;
        let region = [f64_at(header, 12), f64_at(header, 20), f64_at(header, 28), f64_at(header, 36)];
        let increment = [f64_at(header, 60), f64_at(header, 68)];
        let scale = f64_at(header, 76);
        let offset = f64_at(header, 84);

        let (nx, ny) = (n_columns as usize, n_rows as usize);
        let expected = nx
            .checked_mul(ny)
            .and_then(|n| n.checked_mul(4))
            .and_then(|n| n.checked_add(HEADER_SIZE))
            .ok_or(GridFormatError::InvalidDimensions { n_columns, n_rows })?;
        let data = bytes.get(HEADER_SIZE..expected).ok_or(GridFormatError::Truncated {
            expected,
            actual: bytes.len(),
        })?;
        let raw: Vec<f64> = data
            .chunks_exact(4)
            .map(|c| f64::from(f32::from_le_bytes([c[0], c[1], c[2], c[3]])) * scale + offset)
            .collect();

        // file rows run north to south
        let values = Array2::from_shape_fn((ny, nx), |(j, i)| raw[(ny - 1 - j) * nx + i]);

        Ok(Self {
            registration,
            region,
            increment,
            title: text_at(header, TITLE_AT, TITLE_LEN),
            remark: text_at(header, REMARK_AT, REMARK_LEN),
            values,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let (ny, nx) = self.values.dim();
        let mut buf = vec![0u8; HEADER_SIZE + 4 * nx * ny];

        buf[0..4].copy_from_slice(&(nx as u32).to_le_bytes());
        buf[4..8].copy_from_slice(&(ny as u32).to_le_bytes());
        buf[8..12].copy_from_slice(&self.registration.code().to_le_bytes());

        let flat: Vec<f64> = self.values.iter().copied().collect();
        let (z_min, z_max) = nan_min_max(&flat).unwrap_or((f64::NAN, f64::NAN));
        let doubles = [
            self.region[0],
            self.region[1],
            self.region[2],
            self.region[3],
            z_min,
            z_max,
            self.increment[0],
            self.increment[1],
            1.0,
            0.0,
        ];
        for (k, v) in doubles.iter().enumerate() {
            buf[12 + 8 * k..20 + 8 * k].copy_from_slice(&v.to_le_bytes());
        }
        put_text(&mut buf, TITLE_AT, TITLE_LEN, &self.title);
        put_text(&mut buf, REMARK_AT, REMARK_LEN, &self.remark);

        let data = &mut buf[HEADER_SIZE..];
        for (j, row) in self.values.outer_iter().enumerate() {
            let file_row = ny - 1 - j;
            for (i, v) in row.iter().enumerate() {
                let at = 4 * (file_row * nx + i);
                data[at..at + 4].copy_from_slice(&(*v as f32).to_le_bytes());
            }
        }
        buf
    }

    /// Read a grid file.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, GridFormatError> {
        Self::from_bytes(&std::fs::read(path)?)
    }

    /// Write a grid file.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), GridFormatError> {
        std::fs::write(path, self.to_bytes())?;
        Ok(())
    }
}

fn u32_at(buf: &[u8; HEADER_SIZE], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn f64_at(buf: &[u8; HEADER_SIZE], at: usize) -> f64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[at..at + 8]);
    f64::from_le_bytes(b)
}

fn text_at(buf: &[u8; HEADER_SIZE], at: usize, len: usize) -> String {
    let field = &buf[at..at + len];
    let end = field.iter().position(|&b| b == 0).unwrap_or(len);
    String::from_utf8_lossy(&field[..end]).trim().to_owned()
}

fn put_text(buf: &mut [u8], at: usize, len: usize, text: &str) {
    // keep one NUL terminator
    let bytes = text.as_bytes();
    let n = bytes.len().min(len - 1);
    buf[at..at + n].copy_from_slice(&bytes[..n]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn reader_flips_rows_to_south_first() {
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&2u32.to_le_bytes());
        bytes[4..8].copy_from_slice(&3u32.to_le_bytes());
        for (k, v) in [0.0f64, 1.0, 0.0, 2.0, 0.0, 0.0, 1.0, 1.0, 2.0, 10.0].iter().enumerate() {
            bytes[12 + 8 * k..20 + 8 * k].copy_from_slice(&v.to_le_bytes());
        }
        // north row first
        for v in [5.0f32, 6.0, 3.0, 4.0, 1.0, 2.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }

        let grid = GmtGrid::from_bytes(&bytes).unwrap();
        assert_eq!(grid.values.dim(), (3, 2));
        // scale 2, offset 10
        assert_eq!(grid.values, array![[12.0, 14.0], [16.0, 18.0], [20.0, 22.0]]);
        assert_eq!(grid.x(), vec![0.0, 1.0]);
        assert_eq!(grid.y(), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn write_then_read_preserves_orientation_and_nan() {
        let mut grid = GmtGrid::new(
            [-0.5, 1.5, -0.5, 0.5],
            [1.0, 1.0],
            array![[1.0, f64::NAN, 3.0], [4.0, 5.0, 6.0]],
        );
        grid.title = "conductivity".into();
        let bytes = grid.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE + 6 * 4);

        let back = GmtGrid::from_bytes(&bytes).unwrap();
        assert_eq!(back.title, "conductivity");
        assert_eq!(back.region, grid.region);
        assert_eq!(back.values[[0, 0]], 1.0);
        assert!(back.values[[0, 1]].is_nan());
        assert_eq!(back.values[[1, 2]], 6.0);
    }

    #[test]
    fn pixel_registration_shifts_nodes() {
        let mut grid = GmtGrid::new([0.0, 2.0, 0.0, 1.0], [1.0, 1.0], Array2::zeros((1, 2)));
        grid.registration = Registration::Pixel;
        assert_eq!(grid.x(), vec![0.5, 1.5]);
        let back = GmtGrid::from_bytes(&grid.to_bytes()).unwrap();
        assert_eq!(back.registration, Registration::Pixel);
    }

    #[test]
    fn rejects_short_or_malformed_input() {
        assert!(matches!(
            GmtGrid::from_bytes(&[0u8; 100]),
            Err(GridFormatError::Truncated { expected: HEADER_SIZE, actual: 100 })
        ));

        let mut bytes = GmtGrid::new([0.0, 1.0, 0.0, 1.0], [1.0, 1.0], Array2::zeros((2, 2))).to_bytes();
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(GmtGrid::from_bytes(&bytes), Err(GridFormatError::Truncated { .. })));

        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&1u32.to_le_bytes());
        assert!(matches!(
            GmtGrid::from_bytes(&bytes),
            Err(GridFormatError::InvalidDimensions { n_columns: 1, n_rows: 0 })
        ));

        bytes[4..8].copy_from_slice(&1u32.to_le_bytes());
        bytes[8..12].copy_from_slice(&7u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 4]);
        assert!(matches!(
            GmtGrid::from_bytes(&bytes),
            Err(GridFormatError::UnknownRegistration(7))
        ));
    }

    #[test]
    fn oversized_dimensions_are_rejected() {
        let mut bytes = vec![0u8; HEADER_SIZE + 16];
        bytes[0..4].copy_from_slice(&u32::MAX.to_le_bytes());
        bytes[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            GmtGrid::from_bytes(&bytes),
            Err(GridFormatError::InvalidDimensions {
                n_columns: u32::MAX,
                n_rows: u32::MAX
            })
        ));
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.bf");
        let grid = GmtGrid::new([0.0, 1.0, 0.0, 1.0], [1.0, 1.0], array![[0.25, 0.5], [0.75, 1.0]]);
        grid.write(&path).unwrap();
        assert_eq!(GmtGrid::read(&path).unwrap(), grid);
    }
}
