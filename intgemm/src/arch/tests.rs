//! Every variant the host can run is checked against plain-loop references
//! and against the scalar variant, which must agree bit for bit.

use std::fmt::Debug;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use intgemm_core::tile::register_index;
use intgemm_core::{AlignedVec, CpuType, Element};

use crate::dispatch::{int16_for, int8_for};
use crate::kernel::{Kernel, Kernel8, MeanStd};

const A_ROWS: usize = 5;
const WIDTH: usize = 64;
const B_COLS: usize = 24;

fn kernels16() -> Vec<&'static dyn Kernel<Integer = i16>> {
    let mut kernels: Vec<_> = CpuType::ALL.into_iter().filter_map(|cpu| int16_for(cpu).ok()).collect();
    kernels.dedup_by_key(|k| k.capability().name);
    kernels
}

fn kernels8() -> Vec<&'static dyn Kernel8> {
    let mut kernels: Vec<_> = CpuType::ALL.into_iter().filter_map(|cpu| int8_for(cpu).ok()).collect();
    kernels.dedup_by_key(|k| k.capability().name);
    kernels
}

fn random(rng: &mut StdRng, len: usize, range: f32) -> AlignedVec<f32> {
    (0..len).map(|_| rng.gen_range(-range..range)).collect()
}

fn q16(x: f32, quant_mult: f32) -> i16 {
    (x * quant_mult).clamp(-32768.0, 32767.0).round_ties_even() as i16
}

fn q8(x: f32, quant_mult: f32) -> i8 {
    (x * quant_mult).round_ties_even().clamp(-127.0, 127.0) as i8
}

/// Prepared layout built from the register formula.
fn reference_layout<T: Element>(b: &[T], rows: usize, cols: usize, tile_rows: usize) -> Vec<T> {
    let mut out = vec![T::default(); rows * cols];
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

fn transpose(b: &[f32], rows: usize, cols: usize) -> AlignedVec<f32> {
    let mut out = AlignedVec::zeroed(rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            out[c * rows + r] = b[r * cols + c];
        }
    }
    out
}

fn naive(a: &[f32], b: &[f32], a_rows: usize, width: usize, b_cols: usize) -> Vec<f32> {
    let mut c = vec![0.0; a_rows * b_cols];
    for i in 0..a_rows {
        for j in 0..b_cols {
            let dot: f64 = (0..width).map(|k| a[i * width + k] as f64 * b[k * b_cols + j] as f64).sum();
            c[i * b_cols + j] = dot as f32;
        }
    }
    c
}

/// All four Prepare-B entry points agree with the reference layout.
fn check_prepare_b<T, K>(kernel: &K, quantize: fn(f32, f32) -> T, quant_mult: f32)
where
    T: Element + PartialEq + Debug,
    K: Kernel<Integer = T> + ?Sized,
{
    let name = kernel.capability().name;
    let tile_rows = kernel.capability().b_tile_rows;
    let mut rng = StdRng::seed_from_u64(7);
    let b = random(&mut rng, WIDTH * B_COLS, 1.0);
    let quantized: AlignedVec<T> = b.iter().map(|&x| quantize(x, quant_mult)).collect();
    let expect = reference_layout(&quantized, WIDTH, B_COLS, tile_rows);

    let mut out = AlignedVec::<T>::zeroed(WIDTH * B_COLS);
    kernel.prepare_b(&b, &mut out, quant_mult, WIDTH, B_COLS);
    assert_eq!(&out[..], &expect[..], "{name}: prepare_b");

    let mut out = AlignedVec::<T>::zeroed(WIDTH * B_COLS);
    kernel.prepare_b_quantized(&quantized, &mut out, WIDTH, B_COLS);
    assert_eq!(&out[..], &expect[..], "{name}: prepare_b_quantized");

    let bt = transpose(&b, WIDTH, B_COLS);
    let mut out = AlignedVec::<T>::zeroed(WIDTH * B_COLS);
    kernel.prepare_b_transposed(&bt, &mut out, quant_mult, WIDTH, B_COLS);
    assert_eq!(&out[..], &expect[..], "{name}: prepare_b_transposed");

    let qt: AlignedVec<T> = bt.iter().map(|&x| quantize(x, quant_mult)).collect();
    let mut out = AlignedVec::<T>::zeroed(WIDTH * B_COLS);
    kernel.prepare_b_quantized_transposed(&qt, &mut out, WIDTH, B_COLS);
    assert_eq!(&out[..], &expect[..], "{name}: prepare_b_quantized_transposed");
}

fn check_quantize<T, K>(kernel: &K, quantize: fn(f32, f32) -> T, quant_mult: f32)
where
    T: Element + PartialEq + Debug,
    K: Kernel<Integer = T> + ?Sized,
{
    let mut rng = StdRng::seed_from_u64(11);
    let mut input = random(&mut rng, 128, 2.0);
    // Exact halves and out-of-range values.
    for (i, x) in [0.5, 1.5, 2.5, -2.5, 1e9, -1e9, -127.5, 126.5].into_iter().enumerate() {
        input[i * 3] = x / quant_mult;
    }
    let mut out = AlignedVec::<T>::zeroed(input.len());
    kernel.quantize(&input, &mut out, quant_mult);
    let expect: Vec<T> = input.iter().map(|&x| quantize(x, quant_mult)).collect();
    assert_eq!(&out[..], &expect[..], "{}: quantize", kernel.capability().name);

    let mut again = AlignedVec::<T>::zeroed(input.len());
    kernel.quantize(&input, &mut again, quant_mult);
    assert_eq!(out, again, "{}: quantize is not repeatable", kernel.capability().name);
}

/// In-range values come back within half a quantization step.
fn check_round_trip<T, K>(kernel: &K, to_f32: fn(T) -> f32, quant_mult: f32)
where
    T: Element,
    K: Kernel<Integer = T> + ?Sized,
{
    let mut rng = StdRng::seed_from_u64(31);
    let input = random(&mut rng, 256, 1.0);
    let mut out = AlignedVec::<T>::zeroed(input.len());
    kernel.quantize(&input, &mut out, quant_mult);
    for (&x, &q) in input.iter().zip(out.iter()) {
        let back = to_f32(q) / quant_mult;
        assert!(
            (x - back).abs() <= 1.0 / quant_mult,
            "{}: {x} came back as {back}",
            kernel.capability().name
        );
    }
}

/// Multiply agrees with the scalar variant exactly and with a float product
/// within quantization error.
fn check_multiply<T, K, S>(kernel: &K, scalar: &S, quant_mult: f32, tolerance: f32)
where
    T: Element + PartialEq + Debug,
    K: Kernel<Integer = T> + ?Sized,
    S: Kernel<Integer = T> + ?Sized,
{
    let name = kernel.capability().name;
    let mut rng = StdRng::seed_from_u64(13);
    let a = random(&mut rng, A_ROWS * WIDTH, 1.0);
    let b = random(&mut rng, WIDTH * B_COLS, 1.0);
    let unquant = 1.0 / (quant_mult * quant_mult);

    let mut a_q = AlignedVec::<T>::zeroed(a.len());
    let mut b_q = AlignedVec::<T>::zeroed(b.len());
    let mut c = AlignedVec::<f32>::zeroed(A_ROWS * B_COLS);
    kernel.prepare_a(&a, &mut a_q, quant_mult, A_ROWS, WIDTH);
    kernel.prepare_b(&b, &mut b_q, quant_mult, WIDTH, B_COLS);
    kernel.multiply(&a_q, &b_q, &mut c, unquant, A_ROWS, WIDTH, B_COLS);

    let mut a_s = AlignedVec::<T>::zeroed(a.len());
    let mut b_s = AlignedVec::<T>::zeroed(b.len());
    let mut c_s = AlignedVec::<f32>::zeroed(A_ROWS * B_COLS);
    scalar.prepare_a(&a, &mut a_s, quant_mult, A_ROWS, WIDTH);
    scalar.prepare_b(&b, &mut b_s, quant_mult, WIDTH, B_COLS);
    scalar.multiply(&a_s, &b_s, &mut c_s, unquant, A_ROWS, WIDTH, B_COLS);
    assert_eq!(&c[..], &c_s[..], "{name}: differs from scalar");

    let mut again = AlignedVec::<f32>::zeroed(A_ROWS * B_COLS);
    kernel.multiply(&a_q, &b_q, &mut again, unquant, A_ROWS, WIDTH, B_COLS);
    assert_eq!(c, again, "{name}: multiply is not repeatable");

    let expect = naive(&a, &b, A_ROWS, WIDTH, B_COLS);
    for (i, (&got, &want)) in c.iter().zip(&expect).enumerate() {
        assert!((got - want).abs() <= tolerance, "{name}: C[{i}] = {got}, expected {want}");
    }
}

/// Selecting columns of a prepared B then multiplying picks the same columns of C.
fn check_select_columns<T, K>(kernel: &K, quant_mult: f32)
where
    T: Element + PartialEq + Debug,
    K: Kernel<Integer = T> + ?Sized,
{
    let name = kernel.capability().name;
    let picked = [1, 4, 5, 9, 12, 17, 20, 23];
    let mut rng = StdRng::seed_from_u64(17);
    let a = random(&mut rng, A_ROWS * WIDTH, 1.0);
    let b = random(&mut rng, WIDTH * B_COLS, 1.0);

    let mut a_q = AlignedVec::<T>::zeroed(a.len());
    let mut b_q = AlignedVec::<T>::zeroed(b.len());
    kernel.prepare_a(&a, &mut a_q, quant_mult, A_ROWS, WIDTH);
    kernel.prepare_b(&b, &mut b_q, quant_mult, WIDTH, B_COLS);

    let mut full = AlignedVec::<f32>::zeroed(A_ROWS * B_COLS);
    kernel.multiply(&a_q, &b_q, &mut full, 0.5, A_ROWS, WIDTH, B_COLS);

    let mut b_sel = AlignedVec::<T>::zeroed(WIDTH * picked.len());
    kernel.select_columns_b(&b_q, &mut b_sel, WIDTH, &picked);
    let mut c = AlignedVec::<f32>::zeroed(A_ROWS * picked.len());
    kernel.multiply(&a_q, &b_sel, &mut c, 0.5, A_ROWS, WIDTH, picked.len());

    for row in 0..A_ROWS {
        for (k, &col) in picked.iter().enumerate() {
            assert_eq!(c[row * picked.len() + k], full[row * B_COLS + col], "{name}: column {col}");
        }
    }
}

fn check_wrapping<T, K>(kernel: &K, quant_mult: f32)
where
    T: Element + PartialEq + Debug,
    K: Kernel<Integer = T> + ?Sized,
{
    // With 8 columns every integer register spans several rows, so reads
    // have to jump over the skipped rows mid-register.
    for (rows, cols, row_step) in [(3, 32, 2), (8, 8, 3), (4, 16, 1)] {
        let mut rng = StdRng::seed_from_u64(19);
        let input = random(&mut rng, ((rows - 1) * row_step + 1) * cols, 1.0);
        let mut dense = AlignedVec::<f32>::zeroed(rows * cols);
        for r in 0..rows {
            dense[r * cols..(r + 1) * cols].copy_from_slice(&input[r * row_step * cols..][..cols]);
        }

        let mut wrapped = AlignedVec::<T>::zeroed(rows * cols);
        kernel.prepare_a_wrapping(&input, &mut wrapped, quant_mult, rows, cols, row_step);
        let mut expect = AlignedVec::<T>::zeroed(rows * cols);
        kernel.prepare_a(&dense, &mut expect, quant_mult, rows, cols);
        assert_eq!(
            wrapped,
            expect,
            "{}: prepare_a_wrapping {rows}x{cols} step {row_step}",
            kernel.capability().name
        );
    }
}

#[test]
fn test_prepare_b_layout_all_variants() {
    for kernel in kernels16() {
        check_prepare_b(kernel, q16, 1000.0);
    }
    for kernel in kernels8() {
        check_prepare_b(kernel, q8, 127.0);
    }
}

#[test]
fn test_quantize_all_variants() {
    for kernel in kernels16() {
        check_quantize(kernel, q16, 1000.0);
    }
    for kernel in kernels8() {
        check_quantize(kernel, q8, 64.0);
    }
}

#[test]
fn test_quantize_round_trip_all_variants() {
    for kernel in kernels16() {
        check_round_trip(kernel, |q: i16| q as f32, 1000.0);
    }
    for kernel in kernels8() {
        check_round_trip(kernel, |q: i8| q as f32, 127.0);
    }
}

#[test]
fn test_multiply_all_variants() {
    let scalar16 = &super::scalar::INT16;
    let scalar8 = &super::scalar::INT8;
    for kernel in kernels16() {
        check_multiply(kernel, scalar16, 1000.0, 0.07);
    }
    for kernel in kernels8() {
        check_multiply(kernel, scalar8, 127.0, 0.51);
    }
}

#[test]
fn test_select_columns_all_variants() {
    for kernel in kernels16() {
        check_select_columns(kernel, 1000.0);
    }
    for kernel in kernels8() {
        check_select_columns(kernel, 127.0);
    }
}

#[test]
fn test_prepare_a_wrapping_all_variants() {
    for kernel in kernels16() {
        check_wrapping(kernel, 1000.0);
    }
    for kernel in kernels8() {
        check_wrapping(kernel, 127.0);
    }
}

#[test]
fn test_shifted_multiply_with_bias_matches_signed() {
    let mut rng = StdRng::seed_from_u64(23);
    let a = random(&mut rng, A_ROWS * WIDTH, 1.0);
    let b = random(&mut rng, WIDTH * B_COLS, 1.0);
    let bias_in = random(&mut rng, B_COLS, 2.0);
    // |B| <= 64 keeps every unsigned-by-signed pair below i16 saturation.
    let (a_mult, b_mult) = (127.0, 64.0);
    let unquant = 1.0 / (a_mult * b_mult);

    for kernel in kernels8() {
        let name = kernel.capability().name;
        let mut a_q = AlignedVec::<i8>::zeroed(a.len());
        let mut a_u = AlignedVec::<u8>::zeroed(a.len());
        let mut b_q = AlignedVec::<i8>::zeroed(b.len());
        kernel.prepare_a(&a, &mut a_q, a_mult, A_ROWS, WIDTH);
        kernel.prepare_a_u(&a, &mut a_u, a_mult, A_ROWS, WIDTH);
        kernel.prepare_b(&b, &mut b_q, b_mult, WIDTH, B_COLS);
        for (&s, &u) in a_q.iter().zip(a_u.iter()) {
            assert_eq!(s as i16 + 127, u as i16, "{name}: shifted quantize");
        }

        let mut signed = AlignedVec::<f32>::zeroed(A_ROWS * B_COLS);
        kernel.multiply(&a_q, &b_q, &mut signed, unquant, A_ROWS, WIDTH, B_COLS);

        let mut bias = AlignedVec::<f32>::zeroed(B_COLS);
        kernel.prepare_bias(&b_q, WIDTH, B_COLS, unquant, &bias_in, &mut bias);
        let mut shifted = AlignedVec::<f32>::zeroed(A_ROWS * B_COLS);
        kernel.multiply8_shift(&a_u, &b_q, &mut shifted, unquant, &bias, A_ROWS, WIDTH, B_COLS);

        for i in 0..A_ROWS * B_COLS {
            let want = signed[i] + bias_in[i % B_COLS];
            assert!((shifted[i] - want).abs() < 1e-3, "{name}: C[{i}] = {}, expected {want}", shifted[i]);
        }
    }
}

#[test]
fn test_shifted_multiply_saturates_past_64() {
    // A = B = 1.0 at scale 127: A_u = 254 and B = 127, so every pair
    // 254 * 127 * 2 clamps to 32767 while the bias row of ones does not.
    let (width, b_cols) = (64, 8);
    let a = AlignedVec::from_slice(&[1.0f32; 64]);
    let b = AlignedVec::from_slice(&[1.0f32; 64 * 8]);
    let unquant = 1.0 / (127.0f32 * 127.0);
    let zero_bias = AlignedVec::<f32>::zeroed(b_cols);
    let clamped = (width / 2) as f64 * 32767.0 / (127.0 * 127.0) - 64.0;

    for kernel in kernels8() {
        let name = kernel.capability().name;
        let mut a_q = AlignedVec::<i8>::zeroed(width);
        let mut a_u = AlignedVec::<u8>::zeroed(width);
        let mut b_q = AlignedVec::<i8>::zeroed(width * b_cols);
        kernel.prepare_a(&a, &mut a_q, 127.0, 1, width);
        kernel.prepare_a_u(&a, &mut a_u, 127.0, 1, width);
        kernel.prepare_b(&b, &mut b_q, 127.0, width, b_cols);

        let mut signed = AlignedVec::<f32>::zeroed(b_cols);
        kernel.multiply(&a_q, &b_q, &mut signed, unquant, 1, width, b_cols);
        assert!(signed.iter().all(|&x| (x - 64.0).abs() < 1e-3), "{name}: {signed:?}");

        let mut bias = AlignedVec::<f32>::zeroed(b_cols);
        kernel.prepare_bias(&b_q, width, b_cols, unquant, &zero_bias, &mut bias);
        assert!(bias.iter().all(|&x| (x + 64.0).abs() < 1e-3), "{name}: bias {bias:?}");
        let mut shifted = AlignedVec::<f32>::zeroed(b_cols);
        kernel.multiply8_shift(&a_u, &b_q, &mut shifted, unquant, &bias, 1, width, b_cols);
        for &x in shifted.iter() {
            assert!((x as f64 - clamped).abs() < 1e-3, "{name}: shifted {x}, expected {clamped}");
        }
    }
}

#[test]
fn test_concrete_single_row() {
    // A = [0, 1, ..., 15], B = ones: every output is 120.
    let a: AlignedVec<f32> = (0..16).map(|i| i as f32).collect();
    let b = AlignedVec::from_slice(&[1.0f32; 16 * 8]);
    for kernel in kernels16() {
        let mut a_q = AlignedVec::<i16>::zeroed(16);
        let mut b_q = AlignedVec::<i16>::zeroed(16 * 8);
        let mut c = AlignedVec::<f32>::zeroed(8);
        kernel.prepare_a(&a, &mut a_q, 1.0, 1, 16);
        kernel.prepare_b(&b, &mut b_q, 1.0, 16, 8);
        kernel.multiply(&a_q, &b_q, &mut c, 1.0, 1, 16, 8);
        assert!(c.iter().all(|&x| x == 120.0), "{}: {c:?}", kernel.capability().name);
    }
}

#[test]
fn test_max_absolute_all_variants() {
    let mut rng = StdRng::seed_from_u64(29);
    for len in [0, 3, 8, 37, 100] {
        let input = random(&mut rng, len, 5.0);
        let expect = input.iter().fold(0.0f32, |m, x| m.max(x.abs()));
        for kernel in kernels16() {
            assert_eq!(kernel.max_absolute(&input), expect, "{}", kernel.capability().name);
        }
        for kernel in kernels8() {
            assert_eq!(kernel.max_absolute(&input), expect, "{}", kernel.capability().name);
        }
    }
}

#[test]
fn test_vector_mean_std_all_variants() {
    let mut rng = StdRng::seed_from_u64(37);
    for len in [0, 5, 16, 37, 200] {
        let input: AlignedVec<f32> = (0..len).map(|_| rng.gen_range(-3.0f32..5.0)).collect();
        for absolute in [false, true] {
            let values: Vec<f64> = input.iter().map(|&x| if absolute { x.abs() as f64 } else { x as f64 }).collect();
            let n = values.len().max(1) as f64;
            let mean = values.iter().sum::<f64>() / n;
            let variance = values.iter().map(|x| x * x).sum::<f64>() / n - mean * mean;
            let stddev = variance.max(0.0).sqrt();

            let mut stats: Vec<(&str, MeanStd)> = kernels16()
                .into_iter()
                .map(|k| (k.capability().name, k.vector_mean_std(&input, absolute)))
                .collect();
            stats.extend(kernels8().into_iter().map(|k| (k.capability().name, k.vector_mean_std(&input, absolute))));
            for (name, got) in stats {
                assert!((got.mean as f64 - mean).abs() < 1e-4, "{name}: mean {} vs {mean}", got.mean);
                assert!((got.stddev as f64 - stddev).abs() < 1e-3, "{name}: stddev {} vs {stddev}", got.stddev);
            }
        }
    }
}
