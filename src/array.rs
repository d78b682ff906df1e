//! Row-major 2-D buffer used at every batch boundary.

use std::fmt;

use crate::error::{IppoError, Result};

/// A `(rows, cols)` row-major array.
#[derive(Debug, Clone, PartialEq)]
pub struct Array2<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Clone> Array2<T> {
    /// Wraps `data` as a `(rows, cols)` array.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Result<Self> {
        if rows * cols != data.len() {
            return Err(IppoError::shape(
                "Array2::from_vec",
                format!("{} elements for ({}, {})", rows * cols, rows, cols),
                data.len(),
            ));
        }
        Ok(Self { rows, cols, data })
    }

    /// Array filled with `value`.
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Stacks equally sized rows.
    pub fn from_rows(rows: &[Vec<T>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(IppoError::shape("Array2::from_rows", cols, row.len()));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// Single-column array.
    pub fn column(values: Vec<T>) -> Self {
        Self {
            rows: values.len(),
            cols: 1,
            data: values,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn row(&self, i: usize) -> &[T] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// New array made of the listed rows, in order.
    pub fn gather_rows(&self, indices: &[usize]) -> Self {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        Self {
            rows: indices.len(),
            cols: self.cols,
            data,
        }
    }

    /// Contiguous block of rows `[start, end)`.
    pub fn slice_rows(&self, start: usize, end: usize) -> Self {
        Self {
            rows: end - start,
            cols: self.cols,
            data: self.data[start * self.cols..end * self.cols].to_vec(),
        }
    }

    /// Concatenates arrays along the row axis.
    pub fn concat_rows(parts: &[Array2<T>]) -> Result<Self> {
        let cols = parts.first().map_or(0, |p| p.cols);
        let mut data = Vec::with_capacity(parts.iter().map(|p| p.data.len()).sum());
        let mut rows = 0;
        for part in parts {
            if part.cols != cols {
                return Err(IppoError::shape("Array2::concat_rows", cols, part.cols));
            }
            rows += part.rows;
            data.extend_from_slice(&part.data);
        }
        Ok(Self { rows, cols, data })
    }
}

impl<T> std::ops::Index<(usize, usize)> for Array2<T> {
    type Output = T;

    fn index(&self, (r, c): (usize, usize)) -> &T {
        &self.data[r * self.cols + c]
    }
}

impl<T> std::ops::IndexMut<(usize, usize)> for Array2<T> {
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut T {
        &mut self.data[r * self.cols + c]
    }
}

impl<T> fmt::Display for Array2<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Array2({}, {})", self.rows, self.cols)
    }
}
