// GEMM entry points carry the full matrix shape plus scales; the parameter count is inherent.
#![allow(clippy::too_many_arguments)]

//! # intgemm
//!
//! Low-precision matrix multiply for inference: quantize float A and B to
//! 16-bit or 8-bit integers, multiply with SIMD integer kernels, and scale
//! the 32-bit sums back to float.
//!
//! ## Pipeline
//!
//! - **Quantize / Prepare-A**: `round(x * quant_mult)` saturated to the integer
//!   range, row-major. 8-bit never produces `-128`.
//! - **Prepare-B**: quantize and rearrange B so that one register holds
//!   consecutive rows of one column. Done once per weight matrix.
//! - **Multiply**: `C = (A * B) * unquant_mult`, 8 columns of B per pass.
//! - **Shifted 8-bit**: A quantized to `u8` around +127 with a bias computed
//!   from B that cancels the shift. Unsigned-by-signed pairs saturate at 16
//!   bits, so this matches the signed multiply only while quantized `|B| <= 64`.
//! - **Overflow**: 16-bit dot products accumulate in 32 bits and wrap silently
//!   when a row is long and `quant_mult` large. Saturation in quantization is
//!   silent too.
//! - **Scale helpers**: [`max_absolute`] and [`vector_mean_std`].
//!
//! ## Variants
//!
//! | Variant        | Tier   | Register | B tile rows |
//! |----------------|--------|----------|-------------|
//! | 16-bit AVX2    | avx2   | 256-bit  | 16          |
//! | 8-bit AVX2     | avx2   | 256-bit  | 32          |
//! | 16-bit SSE2    | sse2   | 128-bit  | 8           |
//! | 8-bit SSSE3    | ssse3  | 128-bit  | 16          |
//! | 16-bit scalar  | scalar | emulated | 8           |
//! | 8-bit scalar   | scalar | emulated | 16          |
//!
//! [`Int16`] and [`Int8`] bind the best variant the host supports on first
//! use. Set `INTGEMM_CPU=sse2` (or `scalar`, `ssse3`, `avx2`) to cap it.
//!
//! ## Example
//!
//! ```
//! use intgemm::{AlignedVec, Int16};
//!
//! let a: AlignedVec<f32> = (0..16).map(|i| i as f32).collect();
//! let b = AlignedVec::from_slice(&[1.0f32; 16 * 8]);
//!
//! let mut a_q = AlignedVec::<i16>::zeroed(16);
//! Int16::prepare_a(&a, &mut a_q, 1.0, 1, 16);
//! let b_q = Int16::prepare_b_owned(&b, 1.0, 16, 8);
//!
//! let mut c = AlignedVec::<f32>::zeroed(8);
//! Int16::multiply_prepared(&a_q, &b_q, &mut c, 1.0, 1);
//! assert!(c.iter().all(|&x| x == 120.0));
//! ```

mod arch;
pub mod dispatch;
pub mod kernel;
pub mod prepared;

pub use dispatch::{int16_for, int8_for, max_absolute, vector_mean_std, Int16, Int8};
pub use kernel::{Capability, Kernel, Kernel8, MeanStd};
pub use prepared::PreparedB;

// Re-export core types for convenience
pub use intgemm_core::{compute, AlignedVec, CpuType, Error, Result, Tile};
