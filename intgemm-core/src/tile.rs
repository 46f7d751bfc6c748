//! Tile geometry and the layout walks that do not depend on register width.
//!
//! A prepared B matrix is a sequence of registers. For a B with `rows` rows and
//! `T` integers per register, register number
//!
//! ```text
//! ((c / 8) * (rows / T) + r / T) * 8 + c % 8
//! ```
//!
//! holds rows `r..r + T` of column `c` in natural order (`r` a multiple of `T`).
//! Column groups of eight are outermost, row blocks next, then the eight columns.

/// Columns of B consumed per kernel pass.
pub const B_TILE_COLS: usize = 8;

/// Shape of a GEMM or of the unit a kernel works in: `A` is `a_rows x inner`,
/// `B` is `inner x b_cols`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Tile {
    pub a_rows: usize,
    pub inner: usize,
    pub b_cols: usize,
}

impl Tile {
    pub const fn new(a_rows: usize, inner: usize, b_cols: usize) -> Self {
        Self {
            a_rows,
            inner,
            b_cols,
        }
    }

    /// Whether `shape` is a whole number of these tiles in every dimension.
    pub fn divides(&self, shape: Tile) -> bool {
        shape.a_rows % self.a_rows == 0
            && shape.inner % self.inner == 0
            && shape.b_cols % self.b_cols == 0
    }
}

/// Offset, relative to the top-left corner of a B tile, of `element` within
/// row-slot register `slot_row` (`0..8`).
///
/// Row-slot register `i` holds 8 consecutive columns of rows `i`, `i + 8`,
/// `i + 16`, ... packed back to back. Transposing the eight row-slot registers
/// yields the prepared column registers.
#[inline(always)]
pub fn slot_offset(cols: usize, slot_row: usize, element: usize) -> usize {
    (slot_row + B_TILE_COLS * (element / B_TILE_COLS)) * cols + element % B_TILE_COLS
}

/// Register index of rows `block * tile_rows..` of column `col` in a prepared
/// B with `rows` rows.
#[inline]
pub fn register_index(rows: usize, tile_rows: usize, col: usize, block: usize) -> usize {
    ((col / B_TILE_COLS) * (rows / tile_rows) + block) * B_TILE_COLS + col % B_TILE_COLS
}

/// Lay out an already quantized, column-major B (`input[c * rows + r]`).
///
/// Every register is a straight copy of `tile_rows` consecutive values.
pub fn rearrange_transposed<T: Copy>(
    input: &[T],
    output: &mut [T],
    rows: usize,
    cols: usize,
    tile_rows: usize,
) {
    let mut out = output.chunks_exact_mut(tile_rows);
    for c in (0..cols).step_by(B_TILE_COLS) {
        for r in (0..rows).step_by(tile_rows) {
            for j in 0..B_TILE_COLS {
                let src = (c + j) * rows + r;
                if let Some(dst) = out.next() {
                    dst.copy_from_slice(&input[src..src + tile_rows]);
                }
            }
        }
    }
}

/// Copy the prepared registers of the listed columns into a new prepared B.
///
/// `cols` may name any columns of `input`, in any order; the result has
/// `cols.len()` columns in the listed order.
pub fn select_columns<T: Copy>(
    input: &[T],
    output: &mut [T],
    rows: usize,
    tile_rows: usize,
    cols: &[usize],
) {
    let mut out = output.chunks_exact_mut(tile_rows);
    for group in cols.chunks_exact(B_TILE_COLS) {
        for block in 0..rows / tile_rows {
            for &col in group {
                let src = register_index(rows, tile_rows, col, block) * tile_rows;
                if let Some(dst) = out.next() {
                    dst.copy_from_slice(&input[src..src + tile_rows]);
                }
            }
        }
    }
}

/// Walks register-sized groups of a row-major matrix, reading only every
/// `row_step`-th row.
///
/// Logical row `r` starts at `r * row_step * cols`. Groups never straddle rows,
/// so `cols` must be a multiple of the group length.
#[derive(Clone, Debug)]
pub struct WrappingCursor {
    offset: usize,
    left_in_row: usize,
    cols: usize,
    row_step: usize,
    group: usize,
}

impl WrappingCursor {
    pub fn new(cols: usize, row_step: usize, group: usize) -> Self {
        assert!(group > 0 && cols % group == 0, "cols {cols} not a multiple of {group}");
        assert!(row_step > 0, "row_step must be at least 1");
        Self {
            offset: 0,
            left_in_row: cols,
            cols,
            row_step,
            group,
        }
    }

    /// Offset of the next group, then step past it.
    #[inline(always)]
    pub fn advance(&mut self) -> usize {
        if self.left_in_row == 0 {
            self.offset += self.cols * (self.row_step - 1);
            self.left_in_row = self.cols;
        }
        let at = self.offset;
        self.offset += self.group;
        self.left_in_row -= self.group;
        at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reference layout built straight from the register formula.
    fn layout(b: &[i32], rows: usize, cols: usize, tile_rows: usize) -> Vec<i32> {
        let mut out = vec![0; rows * cols];
        for c in 0..cols {
            for block in 0..rows / tile_rows {
                let reg = register_index(rows, tile_rows, c, block);
                for e in 0..tile_rows {
                    out[reg * tile_rows + e] = b[(block * tile_rows + e) * cols + c];
                }
            }
        }
        out
    }

    fn matrix(rows: usize, cols: usize) -> Vec<i32> {
        (0..(rows * cols) as i32).collect()
    }

    #[test]
    fn test_tile_divides() {
        let unit = Tile::new(1, 16, 8);
        assert!(unit.divides(Tile::new(3, 64, 24)));
        assert!(!unit.divides(Tile::new(3, 40, 24)));
        assert!(!unit.divides(Tile::new(3, 64, 12)));
    }

    #[test]
    fn test_slot_offset() {
        // 16-row tile, 8 elements per slot: element 8 is the first of row i + 8.
        assert_eq!(slot_offset(40, 2, 0), 80);
        assert_eq!(slot_offset(40, 2, 5), 85);
        assert_eq!(slot_offset(40, 2, 8), 400);
        assert_eq!(slot_offset(40, 2, 13), 405);
        assert_eq!(slot_offset(40, 0, 24), 24 * 40);
    }

    #[test]
    fn test_rearrange_transposed_matches_layout() {
        let (rows, cols, tile_rows) = (32, 16, 16);
        let b = matrix(rows, cols);
        let mut bt = vec![0; rows * cols];
        for r in 0..rows {
            for c in 0..cols {
                bt[c * rows + r] = b[r * cols + c];
            }
        }
        let mut out = vec![0; rows * cols];
        rearrange_transposed(&bt, &mut out, rows, cols, tile_rows);
        assert_eq!(out, layout(&b, rows, cols, tile_rows));
    }

    #[test]
    fn test_select_columns_matches_layout_of_selection() {
        let (rows, cols, tile_rows) = (16, 24, 8);
        let b = matrix(rows, cols);
        let prepared = layout(&b, rows, cols, tile_rows);

        let picked = [0, 2, 3, 5, 9, 13, 17, 23];
        let mut out = vec![0; rows * picked.len()];
        select_columns(&prepared, &mut out, rows, tile_rows, &picked);

        let mut sub = vec![0; rows * picked.len()];
        for r in 0..rows {
            for (k, &c) in picked.iter().enumerate() {
                sub[r * picked.len() + k] = b[r * cols + c];
            }
        }
        assert_eq!(out, layout(&sub, rows, picked.len(), tile_rows));
    }

    #[test]
    fn test_wrapping_cursor_skips_rows() {
        let mut cursor = WrappingCursor::new(8, 3, 4);
        let offsets: Vec<usize> = (0..6).map(|_| cursor.advance()).collect();
        assert_eq!(offsets, vec![0, 4, 24, 28, 48, 52]);

        let mut dense = WrappingCursor::new(8, 1, 4);
        let offsets: Vec<usize> = (0..4).map(|_| dense.advance()).collect();
        assert_eq!(offsets, vec![0, 4, 8, 12]);
    }

    #[test]
    #[should_panic(expected = "not a multiple")]
    fn test_wrapping_cursor_rejects_ragged_rows() {
        WrappingCursor::new(10, 2, 4);
    }
}
