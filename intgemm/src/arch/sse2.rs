//! 128-bit variants: 16-bit on SSE2, 8-bit on SSSE3 (which adds `abs`, `sign`
//! and the unsigned-by-signed multiply-add).

use std::arch::x86_64::*;

use intgemm_core::CpuType;

use crate::kernel::{Capability, MeanStd};

type Register = __m128i;

const BYTES: usize = 16;
const FLOATS: usize = 4;

pub(crate) struct Sse2Int16;
pub(crate) struct Ssse3Int8;

pub(crate) static INT16: Sse2Int16 = Sse2Int16;
pub(crate) static INT8: Ssse3Int8 = Ssse3Int8;

static CAP16: Capability = Capability::new("16-bit SSE2", CpuType::Sse2, BYTES, 2);
static CAP8: Capability = Capability::new("8-bit SSSE3", CpuType::Ssse3, BYTES, 1);

#[target_feature(enable = "sse2")]
#[inline]
unsafe fn setzero() -> Register {
    _mm_setzero_si128()
}

#[target_feature(enable = "sse2")]
#[inline]
unsafe fn loadu(p: *const u8) -> Register {
    _mm_loadu_si128(p as *const __m128i)
}

#[target_feature(enable = "sse2")]
#[inline]
unsafe fn storeu(p: *mut u8, r: Register) {
    _mm_storeu_si128(p as *mut __m128i, r)
}

#[target_feature(enable = "sse2")]
#[inline]
unsafe fn set1_epi8(v: i8) -> Register {
    _mm_set1_epi8(v)
}

#[target_feature(enable = "sse2")]
#[inline]
unsafe fn set1_epi16(v: i16) -> Register {
    _mm_set1_epi16(v)
}

macro_rules! binary {
    ($($name:ident => $intrinsic:ident),* $(,)?) => {
        $(
            #[target_feature(enable = "sse2")]
            #[inline]
            unsafe fn $name(a: Register, b: Register) -> Register {
                $intrinsic(a, b)
            }
        )*
    };
}

binary! {
    unpacklo_epi8 => _mm_unpacklo_epi8,
    unpackhi_epi8 => _mm_unpackhi_epi8,
    unpacklo_epi16 => _mm_unpacklo_epi16,
    unpackhi_epi16 => _mm_unpackhi_epi16,
    unpacklo_epi32 => _mm_unpacklo_epi32,
    unpackhi_epi32 => _mm_unpackhi_epi32,
    unpacklo_epi64 => _mm_unpacklo_epi64,
    unpackhi_epi64 => _mm_unpackhi_epi64,
    add_epi8 => _mm_add_epi8,
    add_epi32 => _mm_add_epi32,
    madd_epi16 => _mm_madd_epi16,
}

#[target_feature(enable = "ssse3")]
#[inline]
unsafe fn maddubs_epi16(unsigned: Register, signed: Register) -> Register {
    _mm_maddubs_epi16(unsigned, signed)
}

/// `b` with the sign of `a` applied (zeroed where `a` is zero).
#[target_feature(enable = "ssse3")]
#[inline]
unsafe fn sign_epi8(b: Register, a: Register) -> Register {
    _mm_sign_epi8(b, a)
}

#[target_feature(enable = "ssse3")]
#[inline]
unsafe fn abs_epi8(a: Register) -> Register {
    _mm_abs_epi8(a)
}

/// Scale, saturate to the i16 range, and round to nearest-even.
#[target_feature(enable = "sse2")]
#[inline]
unsafe fn quantize_floats(p: *const f32, mult: __m128) -> Register {
    let scaled = _mm_mul_ps(_mm_loadu_ps(p), mult);
    let clamped = _mm_min_ps(_mm_max_ps(scaled, _mm_set1_ps(-32768.0)), _mm_set1_ps(32767.0));
    _mm_cvtps_epi32(clamped)
}

#[target_feature(enable = "sse2")]
#[inline]
unsafe fn quantize_tile16(p0: *const f32, p1: *const f32, quant_mult: f32) -> Register {
    let mult = _mm_set1_ps(quant_mult);
    _mm_packs_epi32(quantize_floats(p0, mult), quantize_floats(p1, mult))
}

#[target_feature(enable = "sse2")]
#[inline]
unsafe fn quantize_tile8(
    p0: *const f32,
    p1: *const f32,
    p2: *const f32,
    p3: *const f32,
    quant_mult: f32,
) -> Register {
    let mult = _mm_set1_ps(quant_mult);
    let lo = _mm_packs_epi32(quantize_floats(p0, mult), quantize_floats(p1, mult));
    let hi = _mm_packs_epi32(quantize_floats(p2, mult), quantize_floats(p3, mult));
    let packed = _mm_packs_epi16(lo, hi);
    // No signed byte max before SSE4.1: -128 becomes -127 by subtracting the all-ones mask.
    let banned = _mm_cmpeq_epi8(packed, _mm_set1_epi8(-128));
    _mm_sub_epi8(packed, banned)
}

/// Reduce eight registers of i32 partial sums to `[S0..S3]` and `[S4..S7]`.
#[target_feature(enable = "sse2")]
#[inline]
unsafe fn reduce32(sums: &[Register; 8]) -> [Register; 2] {
    [
        pack1234(sums[0], sums[1], sums[2], sums[3]),
        pack1234(sums[4], sums[5], sums[6], sums[7]),
    ]
}

#[target_feature(enable = "sse2")]
#[inline]
unsafe fn write_c(sums: &[Register; 8], unquant_mult: f32, bias: Option<*const f32>, out: *mut f32) {
    let mult = _mm_set1_ps(unquant_mult);
    for (half, total) in reduce32(sums).into_iter().enumerate() {
        let mut scaled = _mm_mul_ps(_mm_cvtepi32_ps(total), mult);
        if let Some(bias) = bias {
            scaled = _mm_add_ps(scaled, _mm_loadu_ps(bias.add(half * FLOATS)));
        }
        _mm_storeu_ps(out.add(half * FLOATS), scaled);
    }
}

#[target_feature(enable = "sse2")]
unsafe fn max_absolute(input: &[f32]) -> f32 {
    let sign = _mm_set1_ps(-0.0);
    let mut acc = _mm_setzero_ps();
    let chunks = input.chunks_exact(FLOATS);
    let tail = chunks.remainder();
    for chunk in chunks {
        acc = _mm_max_ps(acc, _mm_andnot_ps(sign, _mm_loadu_ps(chunk.as_ptr())));
    }
    let mut lanes = [0.0f32; FLOATS];
    _mm_storeu_ps(lanes.as_mut_ptr(), acc);
    lanes
        .into_iter()
        .chain(tail.iter().map(|x| x.abs()))
        .fold(0.0, f32::max)
}

/// Sum and sum of squares in float lanes, folded with the tail at the end.
#[target_feature(enable = "sse2")]
unsafe fn vector_mean_std(input: &[f32], absolute: bool) -> MeanStd {
    let sign = _mm_set1_ps(-0.0);
    let mut sum = _mm_setzero_ps();
    let mut squares = _mm_setzero_ps();
    let chunks = input.chunks_exact(FLOATS);
    let tail = chunks.remainder();
    for chunk in chunks {
        let mut v = _mm_loadu_ps(chunk.as_ptr());
        if absolute {
            v = _mm_andnot_ps(sign, v);
        }
        sum = _mm_add_ps(sum, v);
        squares = _mm_add_ps(squares, _mm_mul_ps(v, v));
    }
    let mut sum_lanes = [0.0f32; FLOATS];
    let mut square_lanes = [0.0f32; FLOATS];
    _mm_storeu_ps(sum_lanes.as_mut_ptr(), sum);
    _mm_storeu_ps(square_lanes.as_mut_ptr(), squares);
    let (mut total, mut total_squares) = (sum_lanes.iter().sum::<f32>(), square_lanes.iter().sum::<f32>());
    for &x in tail {
        let x = if absolute { x.abs() } else { x };
        total += x;
        total_squares += x * x;
    }
    MeanStd::from_sums(total, total_squares, input.len())
}

crate::arch::tiled_kernels! {
    int16: Sse2Int16, CAP16, "sse2";
    int8: Ssse3Int8, CAP8, "ssse3";
}
