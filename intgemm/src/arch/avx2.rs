//! 256-bit variants. Unpack and pack instructions work per 128-bit lane, so
//! quantization permutes back to natural order and the reduction folds the two
//! lanes together at the end.

use std::arch::x86_64::*;

use intgemm_core::CpuType;

use crate::kernel::{Capability, MeanStd};

type Register = __m256i;

const BYTES: usize = 32;
const FLOATS: usize = 8;

pub(crate) struct Avx2Int16;
pub(crate) struct Avx2Int8;

pub(crate) static INT16: Avx2Int16 = Avx2Int16;
pub(crate) static INT8: Avx2Int8 = Avx2Int8;

static CAP16: Capability = Capability::new("16-bit AVX2", CpuType::Avx2, BYTES, 2);
static CAP8: Capability = Capability::new("8-bit AVX2", CpuType::Avx2, BYTES, 1);

#[target_feature(enable = "avx2")]
#[inline]
unsafe fn setzero() -> Register {
    _mm256_setzero_si256()
}

#[target_feature(enable = "avx2")]
#[inline]
unsafe fn loadu(p: *const u8) -> Register {
    _mm256_loadu_si256(p as *const __m256i)
}

#[target_feature(enable = "avx2")]
#[inline]
unsafe fn storeu(p: *mut u8, r: Register) {
    _mm256_storeu_si256(p as *mut __m256i, r)
}

#[target_feature(enable = "avx2")]
#[inline]
unsafe fn set1_epi8(v: i8) -> Register {
    _mm256_set1_epi8(v)
}

#[target_feature(enable = "avx2")]
#[inline]
unsafe fn set1_epi16(v: i16) -> Register {
    _mm256_set1_epi16(v)
}

macro_rules! binary {
    ($($name:ident => $intrinsic:ident),* $(,)?) => {
        $(
            #[target_feature(enable = "avx2")]
            #[inline]
            unsafe fn $name(a: Register, b: Register) -> Register {
                $intrinsic(a, b)
            }
        )*
    };
}

binary! {
    unpacklo_epi8 => _mm256_unpacklo_epi8,
    unpackhi_epi8 => _mm256_unpackhi_epi8,
    unpacklo_epi16 => _mm256_unpacklo_epi16,
    unpackhi_epi16 => _mm256_unpackhi_epi16,
    unpacklo_epi32 => _mm256_unpacklo_epi32,
    unpackhi_epi32 => _mm256_unpackhi_epi32,
    unpacklo_epi64 => _mm256_unpacklo_epi64,
    unpackhi_epi64 => _mm256_unpackhi_epi64,
    add_epi8 => _mm256_add_epi8,
    add_epi32 => _mm256_add_epi32,
    madd_epi16 => _mm256_madd_epi16,
    maddubs_epi16 => _mm256_maddubs_epi16,
    sign_epi8 => _mm256_sign_epi8,
}

#[target_feature(enable = "avx2")]
#[inline]
unsafe fn abs_epi8(a: Register) -> Register {
    _mm256_abs_epi8(a)
}

#[target_feature(enable = "avx2")]
#[inline]
unsafe fn quantize_floats(p: *const f32, mult: __m256) -> Register {
    let scaled = _mm256_mul_ps(_mm256_loadu_ps(p), mult);
    let clamped = _mm256_min_ps(
        _mm256_max_ps(scaled, _mm256_set1_ps(-32768.0)),
        _mm256_set1_ps(32767.0),
    );
    _mm256_cvtps_epi32(clamped)
}

#[target_feature(enable = "avx2")]
#[inline]
unsafe fn quantize_tile16(p0: *const f32, p1: *const f32, quant_mult: f32) -> Register {
    let mult = _mm256_set1_ps(quant_mult);
    let packed = _mm256_packs_epi32(quantize_floats(p0, mult), quantize_floats(p1, mult));
    // Packing interleaved the 64-bit quarters as [p0 lo, p1 lo, p0 hi, p1 hi].
    _mm256_permute4x64_epi64(packed, 0xd8)
}

#[target_feature(enable = "avx2")]
#[inline]
unsafe fn quantize_tile8(
    p0: *const f32,
    p1: *const f32,
    p2: *const f32,
    p3: *const f32,
    quant_mult: f32,
) -> Register {
    let mult = _mm256_set1_ps(quant_mult);
    let lo = _mm256_packs_epi32(quantize_floats(p0, mult), quantize_floats(p1, mult));
    let hi = _mm256_packs_epi32(quantize_floats(p2, mult), quantize_floats(p3, mult));
    let packed = _mm256_max_epi8(_mm256_packs_epi16(lo, hi), _mm256_set1_epi8(-127));
    _mm256_permutevar8x32_epi32(packed, _mm256_set_epi32(7, 3, 6, 2, 5, 1, 4, 0))
}

/// Reduce eight registers of i32 partial sums to one register `[S0..S7]`.
#[target_feature(enable = "avx2")]
#[inline]
unsafe fn reduce32(sums: &[Register; 8]) -> Register {
    let pack0123 = pack1234(sums[0], sums[1], sums[2], sums[3]);
    let pack4567 = pack1234(sums[4], sums[5], sums[6], sums[7]);
    // [0123 hi, 4567 lo] + [0123 lo, 4567 hi]
    let rev = _mm256_permute2x128_si256(pack0123, pack4567, 0x21);
    let blended = _mm256_blend_epi32(pack0123, pack4567, 0xf0);
    _mm256_add_epi32(rev, blended)
}

#[target_feature(enable = "avx2")]
#[inline]
unsafe fn write_c(sums: &[Register; 8], unquant_mult: f32, bias: Option<*const f32>, out: *mut f32) {
    let mut scaled = _mm256_mul_ps(
        _mm256_cvtepi32_ps(reduce32(sums)),
        _mm256_set1_ps(unquant_mult),
    );
    if let Some(bias) = bias {
        scaled = _mm256_add_ps(scaled, _mm256_loadu_ps(bias));
    }
    _mm256_storeu_ps(out, scaled);
}

#[target_feature(enable = "avx2")]
unsafe fn max_absolute(input: &[f32]) -> f32 {
    let sign = _mm256_set1_ps(-0.0);
    let mut acc = _mm256_setzero_ps();
    let chunks = input.chunks_exact(FLOATS);
    let tail = chunks.remainder();
    for chunk in chunks {
        acc = _mm256_max_ps(acc, _mm256_andnot_ps(sign, _mm256_loadu_ps(chunk.as_ptr())));
    }
    let mut lanes = [0.0f32; FLOATS];
    _mm256_storeu_ps(lanes.as_mut_ptr(), acc);
    lanes
        .into_iter()
        .chain(tail.iter().map(|x| x.abs()))
        .fold(0.0, f32::max)
}

/// Sum and sum of squares in float lanes, folded with the tail at the end.
#[target_feature(enable = "avx2")]
unsafe fn vector_mean_std(input: &[f32], absolute: bool) -> MeanStd {
    let sign = _mm256_set1_ps(-0.0);
    let mut sum = _mm256_setzero_ps();
    let mut squares = _mm256_setzero_ps();
    let chunks = input.chunks_exact(FLOATS);
    let tail = chunks.remainder();
    for chunk in chunks {
        let mut v = _mm256_loadu_ps(chunk.as_ptr());
        if absolute {
            v = _mm256_andnot_ps(sign, v);
        }
        sum = _mm256_add_ps(sum, v);
        squares = _mm256_add_ps(squares, _mm256_mul_ps(v, v));
    }
    let mut sum_lanes = [0.0f32; FLOATS];
    let mut square_lanes = [0.0f32; FLOATS];
    _mm256_storeu_ps(sum_lanes.as_mut_ptr(), sum);
    _mm256_storeu_ps(square_lanes.as_mut_ptr(), squares);
    let (mut total, mut total_squares) = (sum_lanes.iter().sum::<f32>(), square_lanes.iter().sum::<f32>());
    for &x in tail {
        let x = if absolute { x.abs() } else { x };
        total += x;
        total_squares += x * x;
    }
    MeanStd::from_sums(total, total_squares, input.len())
}

crate::arch::tiled_kernels! {
    int16: Avx2Int16, CAP16, "avx2";
    int8: Avx2Int8, CAP8, "avx2";
}
