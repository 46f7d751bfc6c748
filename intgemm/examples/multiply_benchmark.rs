use std::time::Instant;

use intgemm::{compute, AlignedVec, CpuType, Kernel, PreparedB};

fn matrix(len: usize, seed: usize) -> AlignedVec<f32> {
    (0..len)
        .map(|i| ((i * seed + 3) % 1000) as f32 * 0.002 - 1.0)
        .collect()
}

fn naive(a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Vec<f32> {
    let mut c = vec![0.0f32; m * n];
    for i in 0..m {
        for p in 0..k {
            let a_ip = a[i * k + p];
            for j in 0..n {
                c[i * n + j] += a_ip * b[p * n + j];
            }
        }
    }
    c
}

fn bench_one<K>(kernel: &K, quant_mult: f32, m: usize, k: usize, n: usize, iters: usize)
where
    K: Kernel + ?Sized,
{
    let a = matrix(m * k, 7);
    let b = matrix(k * n, 11);
    let reference = naive(&a, &b, m, k, n);

    let mut a_q = AlignedVec::<K::Integer>::zeroed(m * k);
    kernel.prepare_a(&a, &mut a_q, quant_mult, m, k);
    let t0 = Instant::now();
    let b_q = PreparedB::prepare(kernel, &b, quant_mult, k, n);
    let prepare_time = t0.elapsed().as_secs_f64();

    let mut c = AlignedVec::<f32>::zeroed(m * n);
    let unquant = 1.0 / (quant_mult * quant_mult);
    b_q.multiply(kernel, &a_q, &mut c, unquant, m);

    let t1 = Instant::now();
    for _ in 0..iters {
        b_q.multiply(kernel, &a_q, &mut c, unquant, m);
    }
    let time = t1.elapsed().as_secs_f64() / iters as f64;
    let gops = 2.0 * m as f64 * n as f64 * k as f64 / time / 1e9;

    let max_err = c
        .iter()
        .zip(&reference)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0f32, f32::max);

    println!(
        "  {:14} | {:>14} | prepare B: {:8.3} ms | multiply: {:8.3} ms ({:7.2} GOPS) | max err: {:.2e}",
        kernel.capability().name,
        format!("{m}x{k}x{n}"),
        prepare_time * 1000.0,
        time * 1000.0,
        gops,
        max_err
    );
}

fn main() {
    compute::print_caps();
    println!();
    println!("=== Integer GEMM: every variant this host can run ===");

    let shapes = [(1, 256, 256, 2000), (8, 512, 512, 200), (64, 1024, 1024, 10)];
    for cpu in CpuType::ALL {
        let (Ok(k16), Ok(k8)) = (intgemm::int16_for(cpu), intgemm::int8_for(cpu)) else {
            continue;
        };
        // Lower tiers fall back to the same variant; show each once.
        if k16.capability().cpu != cpu && k8.capability().cpu != cpu {
            continue;
        }
        for &(m, k, n, iters) in &shapes {
            if k16.capability().cpu == cpu {
                bench_one(k16, 1024.0, m, k, n, iters);
            }
            if k8.capability().cpu == cpu {
                bench_one(k8, 127.0, m, k, n, iters);
            }
        }
    }
}
