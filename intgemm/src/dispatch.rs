//! Runtime selection of the variant used for each integer width.
//!
//! The first call through [`Int16`] or [`Int8`] resolves the compute tier
//! (host probe capped by `INTGEMM_CPU`) and binds the most capable variant at
//! or below it. The binding never changes afterwards.

use std::sync::OnceLock;

use intgemm_core::{compute, CpuType, Error, Result, Tile};

use crate::arch::scalar;
#[cfg(target_arch = "x86_64")]
use crate::arch::{avx2, sse2};
use crate::kernel::{Capability, Kernel, Kernel8, MeanStd};
use crate::prepared::PreparedB;

/// The 16-bit variant for tier `cpu`: the most capable one not above it.
///
/// Fails when the host cannot run `cpu` at all.
pub fn int16_for(cpu: CpuType) -> Result<&'static dyn Kernel<Integer = i16>> {
    if !compute::detect().supports(cpu) {
        return Err(Error::Unsupported { cpu });
    }
    Ok(match cpu {
        #[cfg(target_arch = "x86_64")]
        CpuType::Avx2 => &avx2::INT16,
        #[cfg(target_arch = "x86_64")]
        CpuType::Ssse3 | CpuType::Sse2 => &sse2::INT16,
        _ => &scalar::INT16,
    })
}

/// The 8-bit variant for tier `cpu`. SSE2 alone has no 8-bit kernel and
/// falls back to scalar.
pub fn int8_for(cpu: CpuType) -> Result<&'static dyn Kernel8> {
    if !compute::detect().supports(cpu) {
        return Err(Error::Unsupported { cpu });
    }
    Ok(match cpu {
        #[cfg(target_arch = "x86_64")]
        CpuType::Avx2 => &avx2::INT8,
        #[cfg(target_arch = "x86_64")]
        CpuType::Ssse3 => &sse2::INT8,
        _ => &scalar::INT8,
    })
}

static INT16: OnceLock<&'static dyn Kernel<Integer = i16>> = OnceLock::new();
static INT8: OnceLock<&'static dyn Kernel8> = OnceLock::new();

/// 16-bit integer GEMM on the selected variant.
pub struct Int16;

/// 8-bit integer GEMM on the selected variant, including the shifted path.
pub struct Int8;

impl Int16 {
    pub fn kernel() -> &'static dyn Kernel<Integer = i16> {
        *INT16.get_or_init(|| {
            let kernel = int16_for(compute::selected()).unwrap_or(&scalar::INT16);
            log::debug!("16-bit integer GEMM bound to {}", kernel.capability().name);
            kernel
        })
    }

    /// Variant for an explicit tier, bypassing the process-wide binding.
    pub fn for_cpu(cpu: CpuType) -> Result<&'static dyn Kernel<Integer = i16>> {
        int16_for(cpu)
    }
}

impl Int8 {
    pub fn kernel() -> &'static dyn Kernel8 {
        *INT8.get_or_init(|| {
            let kernel = int8_for(compute::selected()).unwrap_or(&scalar::INT8);
            log::debug!("8-bit integer GEMM bound to {}", kernel.capability().name);
            kernel
        })
    }

    pub fn for_cpu(cpu: CpuType) -> Result<&'static dyn Kernel8> {
        int8_for(cpu)
    }

    pub fn quantize_u(input: &[f32], output: &mut [u8], quant_mult: f32) {
        Self::kernel().quantize_u(input, output, quant_mult)
    }

    pub fn prepare_a_u(input: &[f32], output: &mut [u8], quant_mult: f32, rows: usize, cols: usize) {
        Self::kernel().prepare_a_u(input, output, quant_mult, rows, cols)
    }

    /// Shifted multiply on the bound variant. Exact only for B quantized
    /// within `-64..=64`; see [`Kernel8::multiply8_shift`].
    pub fn multiply8_shift(
        a: &[u8],
        b: &[i8],
        c: &mut [f32],
        unquant_mult: f32,
        bias: &[f32],
        a_rows: usize,
        width: usize,
        b_cols: usize,
    ) {
        Self::kernel().multiply8_shift(a, b, c, unquant_mult, bias, a_rows, width, b_cols)
    }

    pub fn prepare_bias(
        b: &[i8],
        width: usize,
        b_cols: usize,
        unquant_mult: f32,
        bias_in: &[f32],
        bias_out: &mut [f32],
    ) {
        Self::kernel().prepare_bias(b, width, b_cols, unquant_mult, bias_in, bias_out)
    }

    pub fn multiply_shift_prepared(
        a: &[u8],
        b: &PreparedB<i8>,
        c: &mut [f32],
        unquant_mult: f32,
        bias: &[f32],
        a_rows: usize,
    ) {
        b.multiply_shift(Self::kernel(), a, c, unquant_mult, bias, a_rows)
    }
}

/// Operations both widths expose with the same signatures.
macro_rules! width_facade {
    ($Facade:ident, $int:ty) => {
        impl $Facade {
            pub fn name() -> &'static str {
                Self::kernel().capability().name
            }

            pub fn capability() -> &'static Capability {
                Self::kernel().capability()
            }

            pub fn tile() -> Tile {
                Self::kernel().capability().tile
            }

            pub fn quantize(input: &[f32], output: &mut [$int], quant_mult: f32) {
                Self::kernel().quantize(input, output, quant_mult)
            }

            pub fn prepare_a(input: &[f32], output: &mut [$int], quant_mult: f32, rows: usize, cols: usize) {
                Self::kernel().prepare_a(input, output, quant_mult, rows, cols)
            }

            pub fn prepare_a_wrapping(
                input: &[f32],
                output: &mut [$int],
                quant_mult: f32,
                rows: usize,
                cols: usize,
                row_step: usize,
            ) {
                Self::kernel().prepare_a_wrapping(input, output, quant_mult, rows, cols, row_step)
            }

            pub fn prepare_b(input: &[f32], output: &mut [$int], quant_mult: f32, rows: usize, cols: usize) {
                Self::kernel().prepare_b(input, output, quant_mult, rows, cols)
            }

            pub fn prepare_b_quantized(input: &[$int], output: &mut [$int], rows: usize, cols: usize) {
                Self::kernel().prepare_b_quantized(input, output, rows, cols)
            }

            pub fn prepare_b_transposed(
                input: &[f32],
                output: &mut [$int],
                quant_mult: f32,
                rows: usize,
                cols: usize,
            ) {
                Self::kernel().prepare_b_transposed(input, output, quant_mult, rows, cols)
            }

            pub fn prepare_b_quantized_transposed(
                input: &[$int],
                output: &mut [$int],
                rows: usize,
                cols: usize,
            ) {
                Self::kernel().prepare_b_quantized_transposed(input, output, rows, cols)
            }

            pub fn select_columns_b(input: &[$int], output: &mut [$int], rows: usize, cols: &[usize]) {
                Self::kernel().select_columns_b(input, output, rows, cols)
            }

            pub fn multiply(
                a: &[$int],
                b: &[$int],
                c: &mut [f32],
                unquant_mult: f32,
                a_rows: usize,
                width: usize,
                b_cols: usize,
            ) {
                Self::kernel().multiply(a, b, c, unquant_mult, a_rows, width, b_cols)
            }

            /// Quantize and lay out B into a freshly allocated [`PreparedB`].
            pub fn prepare_b_owned(input: &[f32], quant_mult: f32, rows: usize, cols: usize) -> PreparedB<$int> {
                PreparedB::prepare(Self::kernel(), input, quant_mult, rows, cols)
            }

            pub fn multiply_prepared(
                a: &[$int],
                b: &PreparedB<$int>,
                c: &mut [f32],
                unquant_mult: f32,
                a_rows: usize,
            ) {
                b.multiply(Self::kernel(), a, c, unquant_mult, a_rows)
            }
        }
    };
}

width_facade!(Int16, i16);
width_facade!(Int8, i8);

/// Largest `|x|` over `input`, using the selected tier's float registers.
pub fn max_absolute(input: &[f32]) -> f32 {
    Int16::kernel().max_absolute(input)
}

/// Mean and standard deviation of `input` (of `|input|` when `absolute`),
/// for deriving a quantization scale from the spread instead of the maximum.
pub fn vector_mean_std(input: &[f32], absolute: bool) -> MeanStd {
    Int16::kernel().vector_mean_std(input, absolute)
}
