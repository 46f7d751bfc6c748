//! The kernel contract every instruction-set variant implements.
//!
//! A variant owns one integer width and one register width. Matrices handed to
//! it must be divisible by its [`Capability`] geometry and start on a register
//! boundary; violations panic rather than produce garbage.

use intgemm_core::tile::{self, Tile, B_TILE_COLS};
use intgemm_core::{AlignedVec, CpuType, Element};

/// Static description of a variant: name, tier and tiling constants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capability {
    pub name: &'static str,
    pub cpu: CpuType,
    pub register_bytes: usize,
    pub integer_bytes: usize,
    /// Rows of B per prepared register.
    pub b_tile_rows: usize,
    /// Columns of B per kernel pass.
    pub b_tile_cols: usize,
    /// Unit of work of the multiply kernel.
    pub tile: Tile,
}

impl Capability {
    pub const fn new(
        name: &'static str,
        cpu: CpuType,
        register_bytes: usize,
        integer_bytes: usize,
    ) -> Self {
        let b_tile_rows = register_bytes / integer_bytes;
        Self {
            name,
            cpu,
            register_bytes,
            integer_bytes,
            b_tile_rows,
            b_tile_cols: B_TILE_COLS,
            tile: Tile::new(1, b_tile_rows, B_TILE_COLS),
        }
    }

    /// f32 values per register.
    pub const fn float_lanes(&self) -> usize {
        self.register_bytes / 4
    }

    fn debug_assert_aligned<T>(&self, what: &str, data: &[T]) {
        debug_assert!(
            data.as_ptr() as usize % self.register_bytes == 0,
            "{}: {what} is not aligned to {} bytes",
            self.name,
            self.register_bytes
        );
    }

    pub(crate) fn check_quantize(&self, input: usize, output: usize, quant_mult: f32) {
        assert!(
            input % self.b_tile_rows == 0,
            "{}: quantize length {input} is not a multiple of {}",
            self.name,
            self.b_tile_rows
        );
        assert!(output >= input, "{}: output holds {output} < {input}", self.name);
        assert!(quant_mult > 0.0, "{}: quant_mult must be positive", self.name);
    }

    pub(crate) fn check_quantize_buffers<T, U>(&self, input: &[T], output: &[U], quant_mult: f32) {
        self.check_quantize(input.len(), output.len(), quant_mult);
        self.debug_assert_aligned("input", input);
        self.debug_assert_aligned("output", output);
    }

    pub(crate) fn check_wrapping<T>(
        &self,
        input: &[f32],
        output: &[T],
        quant_mult: f32,
        rows: usize,
        cols: usize,
        row_step: usize,
    ) {
        assert!(row_step >= 1, "{}: row_step must be at least 1", self.name);
        assert!(
            cols % self.float_lanes() == 0,
            "{}: cols {cols} is not a multiple of {}",
            self.name,
            self.float_lanes()
        );
        self.check_quantize(rows * cols, output.len(), quant_mult);
        if rows > 0 {
            let needed = ((rows - 1) * row_step + 1) * cols;
            assert!(
                input.len() >= needed,
                "{}: wrapping input holds {} < {needed}",
                self.name,
                input.len()
            );
        }
        self.debug_assert_aligned("input", input);
        self.debug_assert_aligned("output", output);
    }

    pub(crate) fn check_prepare_b<T, U>(&self, input: &[T], output: &[U], rows: usize, cols: usize) {
        assert!(
            rows % self.b_tile_rows == 0,
            "{}: B rows {rows} is not a multiple of {}",
            self.name,
            self.b_tile_rows
        );
        assert!(
            cols % self.b_tile_cols == 0,
            "{}: B cols {cols} is not a multiple of {}",
            self.name,
            self.b_tile_cols
        );
        assert!(input.len() >= rows * cols, "{}: B input too short", self.name);
        assert!(output.len() >= rows * cols, "{}: B output too short", self.name);
        self.debug_assert_aligned("B input", input);
        self.debug_assert_aligned("B output", output);
    }

    pub(crate) fn check_select<T>(&self, input: &[T], output: &[T], rows: usize, cols: &[usize]) {
        assert!(
            rows > 0 && rows % self.b_tile_rows == 0,
            "{}: B rows {rows} is not a positive multiple of {}",
            self.name,
            self.b_tile_rows
        );
        assert!(
            cols.len() % self.b_tile_cols == 0,
            "{}: selecting {} columns, not a multiple of {}",
            self.name,
            cols.len(),
            self.b_tile_cols
        );
        let available = input.len() / rows;
        if let Some(&bad) = cols.iter().find(|&&c| c >= available) {
            panic!("{}: column {bad} out of range for {available} columns", self.name);
        }
        assert!(output.len() >= rows * cols.len(), "{}: selection output too short", self.name);
        self.debug_assert_aligned("B input", input);
        self.debug_assert_aligned("B output", output);
    }

    pub(crate) fn check_multiply<A, B>(
        &self,
        a: &[A],
        b: &[B],
        c: &[f32],
        a_rows: usize,
        width: usize,
        b_cols: usize,
    ) {
        let tile = self.tile;
        assert!(
            tile.divides(Tile::new(a_rows, width, b_cols)),
            "{}: {a_rows}x{width} by {width}x{b_cols} is not a multiple of the {}x{}x{} tile",
            self.name,
            tile.a_rows,
            tile.inner,
            tile.b_cols
        );
        assert!(a.len() >= a_rows * width, "{}: A too short", self.name);
        assert!(b.len() >= width * b_cols, "{}: B too short", self.name);
        assert!(c.len() >= a_rows * b_cols, "{}: C too short", self.name);
        self.debug_assert_aligned("A", a);
        self.debug_assert_aligned("B", b);
        self.debug_assert_aligned("C", c);
    }
}

/// Mean and population standard deviation of a float buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MeanStd {
    pub mean: f32,
    pub stddev: f32,
}

impl MeanStd {
    /// From a running sum and sum of squares over `len` values.
    pub(crate) fn from_sums(sum: f32, squares: f32, len: usize) -> Self {
        if len == 0 {
            return Self::default();
        }
        let mean = sum / len as f32;
        let variance = (squares / len as f32 - mean * mean).max(0.0);
        Self {
            mean,
            stddev: variance.sqrt(),
        }
    }
}

/// One instruction-set variant of the quantize / prepare / multiply pipeline.
///
/// Variants are obtained from the dispatcher, which only hands out variants
/// the host can execute.
pub trait Kernel: Send + Sync + 'static {
    type Integer: Element;

    fn capability(&self) -> &'static Capability;

    /// `output[i] = round(input[i] * quant_mult)`, saturated to the integer range.
    /// For 8-bit, `-128` is never produced.
    fn quantize(&self, input: &[f32], output: &mut [Self::Integer], quant_mult: f32);

    /// Quantize a row-major `rows x cols` A.
    fn prepare_a(
        &self,
        input: &[f32],
        output: &mut [Self::Integer],
        quant_mult: f32,
        rows: usize,
        cols: usize,
    ) {
        let n = rows * cols;
        assert!(input.len() >= n, "{}: A input too short", self.capability().name);
        self.quantize(&input[..n], output, quant_mult);
    }

    /// Quantize `rows` logical rows taken from every `row_step`-th row of `input`.
    fn prepare_a_wrapping(
        &self,
        input: &[f32],
        output: &mut [Self::Integer],
        quant_mult: f32,
        rows: usize,
        cols: usize,
        row_step: usize,
    );

    /// Quantize a row-major `rows x cols` B and lay it out for the kernel.
    fn prepare_b(
        &self,
        input: &[f32],
        output: &mut [Self::Integer],
        quant_mult: f32,
        rows: usize,
        cols: usize,
    );

    /// Lay out an already quantized row-major B.
    fn prepare_b_quantized(
        &self,
        input: &[Self::Integer],
        output: &mut [Self::Integer],
        rows: usize,
        cols: usize,
    );

    /// Quantize and lay out a B given column-major (`input[c * rows + r]`).
    fn prepare_b_transposed(
        &self,
        input: &[f32],
        output: &mut [Self::Integer],
        quant_mult: f32,
        rows: usize,
        cols: usize,
    );

    /// Lay out an already quantized column-major B.
    fn prepare_b_quantized_transposed(
        &self,
        input: &[Self::Integer],
        output: &mut [Self::Integer],
        rows: usize,
        cols: usize,
    ) {
        let cap = self.capability();
        cap.check_prepare_b(input, output, rows, cols);
        tile::rearrange_transposed(input, output, rows, cols, cap.b_tile_rows);
    }

    /// Extract the listed columns of a prepared B into a new prepared B.
    fn select_columns_b(
        &self,
        input: &[Self::Integer],
        output: &mut [Self::Integer],
        rows: usize,
        cols: &[usize],
    ) {
        let cap = self.capability();
        cap.check_select(input, output, rows, cols);
        tile::select_columns(input, output, rows, cap.b_tile_rows, cols);
    }

    /// `C = (A * B) * unquant_mult` with A from `prepare_a` and B from a prepare-B op.
    ///
    /// Sums are kept in 32 bits. The 16-bit variants wrap silently once a dot
    /// product leaves the i32 range, which `width * 32767 * 32767` can exceed;
    /// keep `quant_mult` small enough for the width in use. The signed 8-bit
    /// variants cannot overflow at any practical width.
    fn multiply(
        &self,
        a: &[Self::Integer],
        b: &[Self::Integer],
        c: &mut [f32],
        unquant_mult: f32,
        a_rows: usize,
        width: usize,
        b_cols: usize,
    );

    /// Largest `|x|` over `input`. Empty input yields `0.0`.
    fn max_absolute(&self, input: &[f32]) -> f32;

    /// Mean and standard deviation of `input`, or of `|input|` when
    /// `absolute` is set. Empty input yields zeros.
    fn vector_mean_std(&self, input: &[f32], absolute: bool) -> MeanStd;
}

/// 8-bit variants add the shifted path: A is quantized to `u8` around +127 so
/// the kernel can skip the sign fixup, and a bias computed from B cancels the
/// shift.
///
/// The shifted path multiplies unsigned A (up to 254) by signed B and sums each
/// adjacent pair of products in 16 bits with saturation. It is exact only while
/// every quantized `|B| <= 64`; past that a pair can clamp to `i16::MAX` and the
/// result silently drifts from the signed multiply.
pub trait Kernel8: Kernel<Integer = i8> {
    /// Signed quantization plus 127, so values land in `0..=254`.
    ///
    /// Values this large only multiply exactly against B quantized within
    /// `-64..=64`; see [`multiply8_shift`](Self::multiply8_shift).
    fn quantize_u(&self, input: &[f32], output: &mut [u8], quant_mult: f32);

    fn prepare_a_u(&self, input: &[f32], output: &mut [u8], quant_mult: f32, rows: usize, cols: usize) {
        let n = rows * cols;
        assert!(input.len() >= n, "{}: A input too short", self.capability().name);
        self.quantize_u(&input[..n], output, quant_mult);
    }

    /// `C = (A_u * B) * unquant_mult + bias[col]`.
    ///
    /// Each pair `a[2k] * b[2k] + a[2k+1] * b[2k+1]` saturates to the i16
    /// range before widening. With `a` up to 254 that stays exact for
    /// `|b| <= 64` only; larger B values clamp silently.
    fn multiply8_shift(
        &self,
        a: &[u8],
        b: &[i8],
        c: &mut [f32],
        unquant_mult: f32,
        bias: &[f32],
        a_rows: usize,
        width: usize,
        b_cols: usize,
    );

    /// `bias_out[j] = bias_in[j] - 127 * unquant_mult * sum_k B[k][j]`.
    ///
    /// Feeding `bias_out` to [`multiply8_shift`](Self::multiply8_shift)
    /// reproduces the signed multiply plus `bias_in` as long as every
    /// quantized `|B| <= 64`. Beyond that the shifted products saturate while
    /// the bias does not, and the two paths disagree.
    ///
    /// `bias_out` is written like a row of C and has the same alignment requirement.
    fn prepare_bias(
        &self,
        b: &[i8],
        width: usize,
        b_cols: usize,
        unquant_mult: f32,
        bias_in: &[f32],
        bias_out: &mut [f32],
    ) {
        let mut ones = AlignedVec::<u8>::zeroed(width);
        ones.fill(1);
        self.multiply8_shift(
            &ones,
            b,
            bias_out,
            -127.0 * unquant_mult,
            bias_in,
            1,
            width,
            b_cols,
        );
    }
}

pub(crate) fn check_bias(cap: &Capability, bias: &[f32], b_cols: usize) {
    assert!(
        bias.len() >= b_cols,
        "{}: bias holds {} < {b_cols} columns",
        cap.name,
        bias.len()
    );
}
