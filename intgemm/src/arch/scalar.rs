//! Portable variants. They emulate 128-bit registers: same tile sizes, same
//! prepared layout, same rounding, and the same saturation inside the 8-bit
//! multiply-add, so results match the SSE variants bit for bit.

use intgemm_core::tile::B_TILE_COLS;
use intgemm_core::CpuType;

use crate::kernel::{check_bias, Capability, Kernel, Kernel8, MeanStd};

const BYTES: usize = 16;

pub(crate) struct ScalarInt16;
pub(crate) struct ScalarInt8;

pub(crate) static INT16: ScalarInt16 = ScalarInt16;
pub(crate) static INT8: ScalarInt8 = ScalarInt8;

static CAP16: Capability = Capability::new("16-bit scalar", CpuType::Scalar, BYTES, 2);
static CAP8: Capability = Capability::new("8-bit scalar", CpuType::Scalar, BYTES, 1);

/// Scale, saturate to the i16 range, round half to even.
#[inline]
fn round_saturate(x: f32, quant_mult: f32) -> i32 {
    // max before min so NaN lands on the lower bound, like maxps/minps.
    (x * quant_mult).max(-32768.0).min(32767.0).round_ties_even() as i32
}

#[inline]
fn quantize_i16(x: f32, quant_mult: f32) -> i16 {
    round_saturate(x, quant_mult) as i16
}

#[inline]
fn quantize_i8(x: f32, quant_mult: f32) -> i8 {
    round_saturate(x, quant_mult).clamp(-127, 127) as i8
}

#[inline]
fn saturate_i16(x: i32) -> i32 {
    x.clamp(i16::MIN as i32, i16::MAX as i32)
}

/// Fill `output` in prepared-B order with `value(row, col)`.
fn rearrange<T: Copy>(
    output: &mut [T],
    rows: usize,
    cols: usize,
    tile_rows: usize,
    value: impl Fn(usize, usize) -> T,
) {
    let mut at = 0;
    for c in (0..cols).step_by(B_TILE_COLS) {
        for r in (0..rows).step_by(tile_rows) {
            for j in 0..B_TILE_COLS {
                for e in 0..tile_rows {
                    output[at] = value(r + e, c + j);
                    at += 1;
                }
            }
        }
    }
}

fn wrapping<T>(
    input: &[f32],
    output: &mut [T],
    rows: usize,
    cols: usize,
    row_step: usize,
    quantize: impl Fn(f32) -> T,
) {
    for r in 0..rows {
        let src = &input[r * row_step * cols..][..cols];
        for (dst, &x) in output[r * cols..][..cols].iter_mut().zip(src) {
            *dst = quantize(x);
        }
    }
}

/// Register-at-a-time multiply. `dot` returns the i32 contribution of one
/// A register against one prepared B register.
fn multiply_tiles<A: Copy, B: Copy>(
    a: &[A],
    b: &[B],
    c: &mut [f32],
    unquant_mult: f32,
    bias: Option<&[f32]>,
    a_rows: usize,
    width: usize,
    b_cols: usize,
    tile_rows: usize,
    dot: impl Fn(&[A], &[B]) -> i32,
) {
    for col in (0..b_cols).step_by(B_TILE_COLS) {
        let group = &b[col * width..][..B_TILE_COLS * width];
        for row in 0..a_rows {
            let a_row = &a[row * width..][..width];
            for j in 0..B_TILE_COLS {
                let mut sum = 0i32;
                for (block, a_reg) in a_row.chunks_exact(tile_rows).enumerate() {
                    let b_reg = &group[(block * B_TILE_COLS + j) * tile_rows..][..tile_rows];
                    sum = sum.wrapping_add(dot(a_reg, b_reg));
                }
                let mut value = sum as f32 * unquant_mult;
                if let Some(bias) = bias {
                    value += bias[col + j];
                }
                c[row * b_cols + col + j] = value;
            }
        }
    }
}

/// `pmaddwd`: adjacent products summed in 32 bits, wrapping.
fn dot16(a: &[i16], b: &[i16]) -> i32 {
    a.chunks_exact(2)
        .zip(b.chunks_exact(2))
        .map(|(x, y)| (x[0] as i32 * y[0] as i32).wrapping_add(x[1] as i32 * y[1] as i32))
        .fold(0i32, i32::wrapping_add)
}

/// `psignb`: `b` negated where `a < 0`, zeroed where `a == 0`.
#[inline]
fn sign(b: i8, a: i8) -> i8 {
    match a {
        0 => 0,
        a if a < 0 => b.wrapping_neg(),
        _ => b,
    }
}

/// `pmaddubsw` then `pmaddwd` with ones: unsigned-by-signed pairs saturated to
/// i16, then widened and summed.
fn dot_unsigned(a: impl Iterator<Item = u8>, b: impl Iterator<Item = i8>) -> i32 {
    let mut products = a.zip(b).map(|(x, y)| x as i32 * y as i32);
    let mut sum = 0;
    while let (Some(p0), Some(p1)) = (products.next(), products.next()) {
        sum += saturate_i16(p0 + p1);
    }
    sum
}

fn dot8(a: &[i8], b: &[i8]) -> i32 {
    dot_unsigned(
        a.iter().map(|x| x.unsigned_abs()),
        a.iter().zip(b).map(|(&x, &y)| sign(y, x)),
    )
}

fn dot8_shift(a: &[u8], b: &[i8]) -> i32 {
    dot_unsigned(a.iter().copied(), b.iter().copied())
}

fn max_absolute(input: &[f32]) -> f32 {
    input.iter().fold(0.0, |acc, x| acc.max(x.abs()))
}

fn vector_mean_std(input: &[f32], absolute: bool) -> MeanStd {
    let (sum, squares) = input
        .iter()
        .map(|&x| if absolute { x.abs() } else { x })
        .fold((0.0f32, 0.0f32), |(sum, squares), x| (sum + x, squares + x * x));
    MeanStd::from_sums(sum, squares, input.len())
}

impl Kernel for ScalarInt16 {
    type Integer = i16;

    fn capability(&self) -> &'static Capability {
        &CAP16
    }

    fn quantize(&self, input: &[f32], output: &mut [i16], quant_mult: f32) {
        CAP16.check_quantize_buffers(input, output, quant_mult);
        for (dst, &x) in output.iter_mut().zip(input) {
            *dst = quantize_i16(x, quant_mult);
        }
    }

    fn prepare_a_wrapping(
        &self,
        input: &[f32],
        output: &mut [i16],
        quant_mult: f32,
        rows: usize,
        cols: usize,
        row_step: usize,
    ) {
        CAP16.check_wrapping(input, output, quant_mult, rows, cols, row_step);
        wrapping(input, output, rows, cols, row_step, |x| quantize_i16(x, quant_mult));
    }

    fn prepare_b(&self, input: &[f32], output: &mut [i16], quant_mult: f32, rows: usize, cols: usize) {
        CAP16.check_prepare_b(input, output, rows, cols);
        assert!(quant_mult > 0.0, "{}: quant_mult must be positive", CAP16.name);
        rearrange(output, rows, cols, CAP16.b_tile_rows, |r, c| {
            quantize_i16(input[r * cols + c], quant_mult)
        });
    }

    fn prepare_b_quantized(&self, input: &[i16], output: &mut [i16], rows: usize, cols: usize) {
        CAP16.check_prepare_b(input, output, rows, cols);
        rearrange(output, rows, cols, CAP16.b_tile_rows, |r, c| input[r * cols + c]);
    }

    fn prepare_b_transposed(
        &self,
        input: &[f32],
        output: &mut [i16],
        quant_mult: f32,
        rows: usize,
        cols: usize,
    ) {
        CAP16.check_prepare_b(input, output, rows, cols);
        assert!(quant_mult > 0.0, "{}: quant_mult must be positive", CAP16.name);
        rearrange(output, rows, cols, CAP16.b_tile_rows, |r, c| {
            quantize_i16(input[c * rows + r], quant_mult)
        });
    }

    fn multiply(
        &self,
        a: &[i16],
        b: &[i16],
        c: &mut [f32],
        unquant_mult: f32,
        a_rows: usize,
        width: usize,
        b_cols: usize,
    ) {
        CAP16.check_multiply(a, b, c, a_rows, width, b_cols);
        multiply_tiles(a, b, c, unquant_mult, None, a_rows, width, b_cols, CAP16.b_tile_rows, dot16);
    }

    fn max_absolute(&self, input: &[f32]) -> f32 {
        max_absolute(input)
    }

    fn vector_mean_std(&self, input: &[f32], absolute: bool) -> MeanStd {
        vector_mean_std(input, absolute)
    }
}

impl Kernel for ScalarInt8 {
    type Integer = i8;

    fn capability(&self) -> &'static Capability {
        &CAP8
    }

    fn quantize(&self, input: &[f32], output: &mut [i8], quant_mult: f32) {
        CAP8.check_quantize_buffers(input, output, quant_mult);
        for (dst, &x) in output.iter_mut().zip(input) {
            *dst = quantize_i8(x, quant_mult);
        }
    }

    fn prepare_a_wrapping(
        &self,
        input: &[f32],
        output: &mut [i8],
        quant_mult: f32,
        rows: usize,
        cols: usize,
        row_step: usize,
    ) {
        CAP8.check_wrapping(input, output, quant_mult, rows, cols, row_step);
        wrapping(input, output, rows, cols, row_step, |x| quantize_i8(x, quant_mult));
    }

    fn prepare_b(&self, input: &[f32], output: &mut [i8], quant_mult: f32, rows: usize, cols: usize) {
        CAP8.check_prepare_b(input, output, rows, cols);
        assert!(quant_mult > 0.0, "{}: quant_mult must be positive", CAP8.name);
        rearrange(output, rows, cols, CAP8.b_tile_rows, |r, c| {
            quantize_i8(input[r * cols + c], quant_mult)
        });
    }

    fn prepare_b_quantized(&self, input: &[i8], output: &mut [i8], rows: usize, cols: usize) {
        CAP8.check_prepare_b(input, output, rows, cols);
        rearrange(output, rows, cols, CAP8.b_tile_rows, |r, c| input[r * cols + c]);
    }

    fn prepare_b_transposed(
        &self,
        input: &[f32],
        output: &mut [i8],
        quant_mult: f32,
        rows: usize,
        cols: usize,
    ) {
        CAP8.check_prepare_b(input, output, rows, cols);
        assert!(quant_mult > 0.0, "{}: quant_mult must be positive", CAP8.name);
        rearrange(output, rows, cols, CAP8.b_tile_rows, |r, c| {
            quantize_i8(input[c * rows + r], quant_mult)
        });
    }

    fn multiply(
        &self,
        a: &[i8],
        b: &[i8],
        c: &mut [f32],
        unquant_mult: f32,
        a_rows: usize,
        width: usize,
        b_cols: usize,
    ) {
        CAP8.check_multiply(a, b, c, a_rows, width, b_cols);
        multiply_tiles(a, b, c, unquant_mult, None, a_rows, width, b_cols, CAP8.b_tile_rows, dot8);
    }

    fn max_absolute(&self, input: &[f32]) -> f32 {
        max_absolute(input)
    }

    fn vector_mean_std(&self, input: &[f32], absolute: bool) -> MeanStd {
        vector_mean_std(input, absolute)
    }
}

impl Kernel8 for ScalarInt8 {
    fn quantize_u(&self, input: &[f32], output: &mut [u8], quant_mult: f32) {
        CAP8.check_quantize_buffers(input, output, quant_mult);
        for (dst, &x) in output.iter_mut().zip(input) {
            *dst = (quantize_i8(x, quant_mult) as i16 + 127) as u8;
        }
    }

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
    ) {
        CAP8.check_multiply(a, b, c, a_rows, width, b_cols);
        check_bias(&CAP8, bias, b_cols);
        multiply_tiles(
            a,
            b,
            c,
            unquant_mult,
            Some(bias),
            a_rows,
            width,
            b_cols,
            CAP8.b_tile_rows,
            dot8_shift,
        );
    }
}
