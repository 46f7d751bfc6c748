//! Instruction-set variants.
//!
//! Each SIMD module exposes the same primitive surface under the same names
//! (`Register`, `BYTES`, `FLOATS`, `loadu`, `unpacklo_epi8`, `madd_epi16`,
//! `quantize_tile16`, `write_c`, ...) and then expands [`tiled_kernels!`], which
//! builds quantize, Prepare-B, and the multiply kernels on top of them.
//! Everything that touches a register is a `#[target_feature]` function, so
//! vectors never cross a boundary compiled without the feature.
//!
//! The scalar module implements the same contract with plain loops, emulating
//! 128-bit registers so its layouts and results are bit-identical to SSE.

pub(crate) mod scalar;

#[cfg(target_arch = "x86_64")]
pub(crate) mod avx2;
#[cfg(target_arch = "x86_64")]
pub(crate) mod sse2;

/// The multiply walk every SIMD kernel shares: column groups of eight, then
/// rows of A, then `steps` registers along the inner dimension.
///
/// `|av| load` turns one register of A into the step operand, computed once
/// per step. `|op, bv| product` gives the i32 pair sums of that operand
/// against one prepared B register; they accumulate per column and go through
/// `write_c`, with `bias` offset to the current column group.
#[cfg(target_arch = "x86_64")]
macro_rules! walk_tiles {
    (
        a: $a:expr, a_row_bytes: $a_row_bytes:expr,
        b: $b:expr, c: $c:expr, bias: $bias:expr,
        unquant_mult: $unquant_mult:expr, a_rows: $a_rows:expr, steps: $steps:expr, b_cols: $b_cols:expr,
        |$av:ident| $load:expr,
        |$op:ident, $bv:ident| $product:expr
    ) => {{
        let a_ptr: *const u8 = $a;
        let b_ptr: *const u8 = $b;
        let c_ptr: *mut f32 = $c;
        let bias: Option<*const f32> = $bias;
        let (a_row_bytes, steps, b_cols): (usize, usize, usize) = ($a_row_bytes, $steps, $b_cols);
        for col in (0..b_cols).step_by(::intgemm_core::B_TILE_COLS) {
            let b_group = b_ptr.add(col * steps * BYTES);
            let bias_group = bias.map(|p| p.wrapping_add(col));
            for row in 0..$a_rows {
                let a_row = a_ptr.add(row * a_row_bytes);
                let mut sums = [setzero(); 8];
                for k in 0..steps {
                    let $av = loadu(a_row.add(k * BYTES));
                    let $op = $load;
                    let b_regs = b_group.add(k * ::intgemm_core::B_TILE_COLS * BYTES);
                    for (j, sum) in sums.iter_mut().enumerate() {
                        let $bv = loadu(b_regs.add(j * BYTES));
                        *sum = add_epi32(*sum, $product);
                    }
                }
                write_c(&sums, $unquant_mult, bias_group, c_ptr.add(row * b_cols + col));
            }
        }
    }};
}

#[cfg(target_arch = "x86_64")]
pub(crate) use walk_tiles;

/// Builds the width-generic part of a SIMD module.
///
/// `int16:` and `int8:` name the variant type, its `Capability` static, and the
/// target feature its code needs.
#[cfg(target_arch = "x86_64")]
macro_rules! tiled_kernels {
    (
        int16: $Int16:ident, $cap16:ident, $f16:literal;
        int8: $Int8:ident, $cap8:ident, $f8:literal;
    ) => {
        /// Horizontal sums of four registers of i32 lanes. Within each 128-bit
        /// lane, 32-bit slot `i` of the result is the sum of that lane of `s[i]`.
        #[target_feature(enable = $f16)]
        #[inline]
        unsafe fn pack1234(s1: Register, s2: Register, s3: Register, s4: Register) -> Register {
            let pack12 = add_epi32(unpacklo_epi32(s1, s2), unpackhi_epi32(s1, s2));
            let pack34 = add_epi32(unpacklo_epi32(s3, s4), unpackhi_epi32(s3, s4));
            add_epi32(unpacklo_epi64(pack12, pack34), unpackhi_epi64(pack12, pack34))
        }

        /// 8x8 transpose of 16-bit values, per 128-bit lane.
        #[target_feature(enable = $f16)]
        #[inline]
        unsafe fn transpose16(r: &mut [Register; 8]) {
            let a0 = unpacklo_epi16(r[0], r[1]);
            let a1 = unpackhi_epi16(r[0], r[1]);
            let a2 = unpacklo_epi16(r[2], r[3]);
            let a3 = unpackhi_epi16(r[2], r[3]);
            let a4 = unpacklo_epi16(r[4], r[5]);
            let a5 = unpackhi_epi16(r[4], r[5]);
            let a6 = unpacklo_epi16(r[6], r[7]);
            let a7 = unpackhi_epi16(r[6], r[7]);

            let b0 = unpacklo_epi32(a0, a2);
            let b1 = unpackhi_epi32(a0, a2);
            let b2 = unpacklo_epi32(a4, a6);
            let b3 = unpackhi_epi32(a4, a6);
            let b4 = unpacklo_epi32(a1, a3);
            let b5 = unpackhi_epi32(a1, a3);
            let b6 = unpacklo_epi32(a5, a7);
            let b7 = unpackhi_epi32(a5, a7);

            *r = [
                unpacklo_epi64(b0, b2),
                unpackhi_epi64(b0, b2),
                unpacklo_epi64(b1, b3),
                unpackhi_epi64(b1, b3),
                unpacklo_epi64(b4, b6),
                unpackhi_epi64(b4, b6),
                unpacklo_epi64(b5, b7),
                unpackhi_epi64(b5, b7),
            ];
        }

        /// 16x8 transpose of 8-bit values, per 128-bit lane. Register `i` holds
        /// rows `i` and `i + 8` of the lane's 16 rows, 8 columns each.
        #[target_feature(enable = $f8)]
        #[inline]
        unsafe fn transpose8(r: &mut [Register; 8]) {
            let a0 = unpacklo_epi8(r[0], r[1]);
            let a1 = unpackhi_epi8(r[0], r[1]);
            let a2 = unpacklo_epi8(r[2], r[3]);
            let a3 = unpackhi_epi8(r[2], r[3]);
            let a4 = unpacklo_epi8(r[4], r[5]);
            let a5 = unpackhi_epi8(r[4], r[5]);
            let a6 = unpacklo_epi8(r[6], r[7]);
            let a7 = unpackhi_epi8(r[6], r[7]);

            let b0 = unpacklo_epi16(a0, a2);
            let b1 = unpackhi_epi16(a0, a2);
            let b2 = unpacklo_epi16(a4, a6);
            let b3 = unpackhi_epi16(a4, a6);
            let b4 = unpacklo_epi16(a1, a3);
            let b5 = unpackhi_epi16(a1, a3);
            let b6 = unpacklo_epi16(a5, a7);
            let b7 = unpackhi_epi16(a5, a7);

            let c0 = unpacklo_epi32(b0, b2);
            let c1 = unpackhi_epi32(b0, b2);
            let c2 = unpacklo_epi32(b1, b3);
            let c3 = unpackhi_epi32(b1, b3);
            let c4 = unpacklo_epi32(b4, b6);
            let c5 = unpackhi_epi32(b4, b6);
            let c6 = unpacklo_epi32(b5, b7);
            let c7 = unpackhi_epi32(b5, b7);

            *r = [
                unpacklo_epi64(c0, c4),
                unpackhi_epi64(c0, c4),
                unpacklo_epi64(c1, c5),
                unpackhi_epi64(c1, c5),
                unpacklo_epi64(c2, c6),
                unpackhi_epi64(c2, c6),
                unpacklo_epi64(c3, c7),
                unpackhi_epi64(c3, c7),
            ];
        }

        /// Row-slot register `slot_row` of the tile starting at `tile`, copied
        /// from already quantized values of `elem` bytes each.
        #[target_feature(enable = $f16)]
        #[inline]
        unsafe fn gather_slots(tile: *const u8, elem: usize, cols: usize, slot_row: usize) -> Register {
            let mut buf = [0u8; BYTES];
            let slot_bytes = ::intgemm_core::B_TILE_COLS * elem;
            for (s, chunk) in buf.chunks_exact_mut(slot_bytes).enumerate() {
                let src = tile.add((slot_row + ::intgemm_core::B_TILE_COLS * s) * cols * elem);
                ::std::ptr::copy_nonoverlapping(src, chunk.as_mut_ptr(), slot_bytes);
            }
            loadu(buf.as_ptr())
        }

        #[target_feature(enable = $f16)]
        unsafe fn quantize16(input: &[f32], output: &mut [i16], quant_mult: f32) {
            let src = input.as_ptr();
            let dst = output.as_mut_ptr() as *mut u8;
            for i in (0..input.len()).step_by(BYTES / 2) {
                let p = src.add(i);
                storeu(dst.add(i * 2), quantize_tile16(p, p.add(FLOATS), quant_mult));
            }
        }

        #[target_feature(enable = $f8)]
        unsafe fn quantize8(input: &[f32], output: *mut u8, quant_mult: f32, shift: bool) {
            let src = input.as_ptr();
            let midpoint = set1_epi8(127);
            for i in (0..input.len()).step_by(BYTES) {
                let p = src.add(i);
                let mut reg = quantize_tile8(p, p.add(FLOATS), p.add(2 * FLOATS), p.add(3 * FLOATS), quant_mult);
                if shift {
                    reg = add_epi8(reg, midpoint);
                }
                storeu(output.add(i), reg);
            }
        }

        #[target_feature(enable = $f16)]
        unsafe fn quantize16_wrapping(
            input: &[f32],
            output: &mut [i16],
            quant_mult: f32,
            len: usize,
            cols: usize,
            row_step: usize,
        ) {
            let src = input.as_ptr();
            let dst = output.as_mut_ptr() as *mut u8;
            let mut cursor = ::intgemm_core::WrappingCursor::new(cols, row_step, FLOATS);
            for i in (0..len).step_by(BYTES / 2) {
                let p0 = src.add(cursor.advance());
                let p1 = src.add(cursor.advance());
                storeu(dst.add(i * 2), quantize_tile16(p0, p1, quant_mult));
            }
        }

        #[target_feature(enable = $f8)]
        unsafe fn quantize8_wrapping(
            input: &[f32],
            output: &mut [i8],
            quant_mult: f32,
            len: usize,
            cols: usize,
            row_step: usize,
        ) {
            let src = input.as_ptr();
            let dst = output.as_mut_ptr() as *mut u8;
            let mut cursor = ::intgemm_core::WrappingCursor::new(cols, row_step, FLOATS);
            for i in (0..len).step_by(BYTES) {
                let p0 = src.add(cursor.advance());
                let p1 = src.add(cursor.advance());
                let p2 = src.add(cursor.advance());
                let p3 = src.add(cursor.advance());
                storeu(dst.add(i), quantize_tile8(p0, p1, p2, p3, quant_mult));
            }
        }

        #[target_feature(enable = $f16)]
        unsafe fn prepare_b16(input: &[f32], output: &mut [i16], quant_mult: f32, rows: usize, cols: usize) {
            use ::intgemm_core::tile::slot_offset;
            let src = input.as_ptr();
            let mut dst = output.as_mut_ptr() as *mut u8;
            let mut regs = [setzero(); 8];
            for c in (0..cols).step_by(::intgemm_core::B_TILE_COLS) {
                for r in (0..rows).step_by(BYTES / 2) {
                    let tile = src.add(r * cols + c);
                    for (i, reg) in regs.iter_mut().enumerate() {
                        *reg = quantize_tile16(
                            tile.add(slot_offset(cols, i, 0)),
                            tile.add(slot_offset(cols, i, FLOATS)),
                            quant_mult,
                        );
                    }
                    transpose16(&mut regs);
                    for reg in &regs {
                        storeu(dst, *reg);
                        dst = dst.add(BYTES);
                    }
                }
            }
        }

        #[target_feature(enable = $f8)]
        unsafe fn prepare_b8(input: &[f32], output: &mut [i8], quant_mult: f32, rows: usize, cols: usize) {
            use ::intgemm_core::tile::slot_offset;
            let src = input.as_ptr();
            let mut dst = output.as_mut_ptr() as *mut u8;
            let mut regs = [setzero(); 8];
            for c in (0..cols).step_by(::intgemm_core::B_TILE_COLS) {
                for r in (0..rows).step_by(BYTES) {
                    let tile = src.add(r * cols + c);
                    for (i, reg) in regs.iter_mut().enumerate() {
                        *reg = quantize_tile8(
                            tile.add(slot_offset(cols, i, 0)),
                            tile.add(slot_offset(cols, i, FLOATS)),
                            tile.add(slot_offset(cols, i, 2 * FLOATS)),
                            tile.add(slot_offset(cols, i, 3 * FLOATS)),
                            quant_mult,
                        );
                    }
                    transpose8(&mut regs);
                    for reg in &regs {
                        storeu(dst, *reg);
                        dst = dst.add(BYTES);
                    }
                }
            }
        }

        #[target_feature(enable = $f16)]
        unsafe fn prepare_b16_quantized(input: &[i16], output: &mut [i16], rows: usize, cols: usize) {
            let src = input.as_ptr() as *const u8;
            let mut dst = output.as_mut_ptr() as *mut u8;
            let mut regs = [setzero(); 8];
            for c in (0..cols).step_by(::intgemm_core::B_TILE_COLS) {
                for r in (0..rows).step_by(BYTES / 2) {
                    let tile = src.add((r * cols + c) * 2);
                    for (i, reg) in regs.iter_mut().enumerate() {
                        *reg = gather_slots(tile, 2, cols, i);
                    }
                    transpose16(&mut regs);
                    for reg in &regs {
                        storeu(dst, *reg);
                        dst = dst.add(BYTES);
                    }
                }
            }
        }

        #[target_feature(enable = $f8)]
        unsafe fn prepare_b8_quantized(input: &[i8], output: &mut [i8], rows: usize, cols: usize) {
            let src = input.as_ptr() as *const u8;
            let mut dst = output.as_mut_ptr() as *mut u8;
            let mut regs = [setzero(); 8];
            for c in (0..cols).step_by(::intgemm_core::B_TILE_COLS) {
                for r in (0..rows).step_by(BYTES) {
                    let tile = src.add(r * cols + c);
                    for (i, reg) in regs.iter_mut().enumerate() {
                        *reg = gather_slots(tile, 1, cols, i);
                    }
                    transpose8(&mut regs);
                    for reg in &regs {
                        storeu(dst, *reg);
                        dst = dst.add(BYTES);
                    }
                }
            }
        }

        /// Column-major input: every register is one contiguous run of a column.
        #[target_feature(enable = $f16)]
        unsafe fn prepare_b16_transposed(
            input: &[f32],
            output: &mut [i16],
            quant_mult: f32,
            rows: usize,
            cols: usize,
        ) {
            let src = input.as_ptr();
            let mut dst = output.as_mut_ptr() as *mut u8;
            for c in (0..cols).step_by(::intgemm_core::B_TILE_COLS) {
                for r in (0..rows).step_by(BYTES / 2) {
                    for j in 0..::intgemm_core::B_TILE_COLS {
                        let p = src.add((c + j) * rows + r);
                        storeu(dst, quantize_tile16(p, p.add(FLOATS), quant_mult));
                        dst = dst.add(BYTES);
                    }
                }
            }
        }

        #[target_feature(enable = $f8)]
        unsafe fn prepare_b8_transposed(
            input: &[f32],
            output: &mut [i8],
            quant_mult: f32,
            rows: usize,
            cols: usize,
        ) {
            let src = input.as_ptr();
            let mut dst = output.as_mut_ptr() as *mut u8;
            for c in (0..cols).step_by(::intgemm_core::B_TILE_COLS) {
                for r in (0..rows).step_by(BYTES) {
                    for j in 0..::intgemm_core::B_TILE_COLS {
                        let p = src.add((c + j) * rows + r);
                        let reg = quantize_tile8(p, p.add(FLOATS), p.add(2 * FLOATS), p.add(3 * FLOATS), quant_mult);
                        storeu(dst, reg);
                        dst = dst.add(BYTES);
                    }
                }
            }
        }

        #[target_feature(enable = $f16)]
        unsafe fn multiply16(
            a: &[i16],
            b: &[i16],
            c: &mut [f32],
            unquant_mult: f32,
            a_rows: usize,
            width: usize,
            b_cols: usize,
        ) {
            $crate::arch::walk_tiles! {
                a: a.as_ptr() as *const u8, a_row_bytes: width * 2,
                b: b.as_ptr() as *const u8, c: c.as_mut_ptr(), bias: None,
                unquant_mult: unquant_mult, a_rows: a_rows, steps: width * 2 / BYTES, b_cols: b_cols,
                |av| av,
                |av, bv| madd_epi16(av, bv)
            }
        }

        /// Signed 8-bit kernel: `|a| * sign(b, a)` feeds the unsigned-by-signed
        /// multiply-add, and every pair sum is widened to 32 bits right away.
        #[target_feature(enable = $f8)]
        unsafe fn multiply8(
            a: &[i8],
            b: &[i8],
            c: &mut [f32],
            unquant_mult: f32,
            a_rows: usize,
            width: usize,
            b_cols: usize,
        ) {
            let ones = set1_epi16(1);
            $crate::arch::walk_tiles! {
                a: a.as_ptr() as *const u8, a_row_bytes: width,
                b: b.as_ptr() as *const u8, c: c.as_mut_ptr(), bias: None,
                unquant_mult: unquant_mult, a_rows: a_rows, steps: width / BYTES, b_cols: b_cols,
                |av| (av, abs_epi8(av)),
                |signs, bv| madd_epi16(maddubs_epi16(signs.1, sign_epi8(bv, signs.0)), ones)
            }
        }

        #[target_feature(enable = $f8)]
        unsafe fn multiply8_shift(
            a: &[u8],
            b: &[i8],
            c: &mut [f32],
            unquant_mult: f32,
            bias: &[f32],
            a_rows: usize,
            width: usize,
            b_cols: usize,
        ) {
            let ones = set1_epi16(1);
            $crate::arch::walk_tiles! {
                a: a.as_ptr(), a_row_bytes: width,
                b: b.as_ptr() as *const u8, c: c.as_mut_ptr(), bias: Some(bias.as_ptr()),
                unquant_mult: unquant_mult, a_rows: a_rows, steps: width / BYTES, b_cols: b_cols,
                |av| av,
                |av, bv| madd_epi16(maddubs_epi16(av, bv), ones)
            }
        }

        impl $crate::kernel::Kernel for $Int16 {
            type Integer = i16;

            fn capability(&self) -> &'static $crate::kernel::Capability {
                &$cap16
            }

            fn quantize(&self, input: &[f32], output: &mut [i16], quant_mult: f32) {
                $cap16.check_quantize_buffers(input, output, quant_mult);
                // SAFETY: this variant is only handed out once the host probe
                // reported the feature; lengths were checked above.
                unsafe { quantize16(input, output, quant_mult) }
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
                $cap16.check_wrapping(input, output, quant_mult, rows, cols, row_step);
                unsafe { quantize16_wrapping(input, output, quant_mult, rows * cols, cols, row_step) }
            }

            fn prepare_b(&self, input: &[f32], output: &mut [i16], quant_mult: f32, rows: usize, cols: usize) {
                $cap16.check_prepare_b(input, output, rows, cols);
                assert!(quant_mult > 0.0, "{}: quant_mult must be positive", $cap16.name);
                unsafe { prepare_b16(input, output, quant_mult, rows, cols) }
            }

            fn prepare_b_quantized(&self, input: &[i16], output: &mut [i16], rows: usize, cols: usize) {
                $cap16.check_prepare_b(input, output, rows, cols);
                unsafe { prepare_b16_quantized(input, output, rows, cols) }
            }

            fn prepare_b_transposed(
                &self,
                input: &[f32],
                output: &mut [i16],
                quant_mult: f32,
                rows: usize,
                cols: usize,
            ) {
                $cap16.check_prepare_b(input, output, rows, cols);
                assert!(quant_mult > 0.0, "{}: quant_mult must be positive", $cap16.name);
                unsafe { prepare_b16_transposed(input, output, quant_mult, rows, cols) }
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
                $cap16.check_multiply(a, b, c, a_rows, width, b_cols);
                unsafe { multiply16(a, b, c, unquant_mult, a_rows, width, b_cols) }
            }

            fn max_absolute(&self, input: &[f32]) -> f32 {
                unsafe { max_absolute(input) }
            }

            fn vector_mean_std(&self, input: &[f32], absolute: bool) -> $crate::kernel::MeanStd {
                unsafe { vector_mean_std(input, absolute) }
            }
        }

        impl $crate::kernel::Kernel for $Int8 {
            type Integer = i8;

            fn capability(&self) -> &'static $crate::kernel::Capability {
                &$cap8
            }

            fn quantize(&self, input: &[f32], output: &mut [i8], quant_mult: f32) {
                $cap8.check_quantize_buffers(input, output, quant_mult);
                // SAFETY: as for the 16-bit variant.
                unsafe { quantize8(input, output.as_mut_ptr() as *mut u8, quant_mult, false) }
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
                $cap8.check_wrapping(input, output, quant_mult, rows, cols, row_step);
                unsafe { quantize8_wrapping(input, output, quant_mult, rows * cols, cols, row_step) }
            }

            fn prepare_b(&self, input: &[f32], output: &mut [i8], quant_mult: f32, rows: usize, cols: usize) {
                $cap8.check_prepare_b(input, output, rows, cols);
                assert!(quant_mult > 0.0, "{}: quant_mult must be positive", $cap8.name);
                unsafe { prepare_b8(input, output, quant_mult, rows, cols) }
            }

            fn prepare_b_quantized(&self, input: &[i8], output: &mut [i8], rows: usize, cols: usize) {
                $cap8.check_prepare_b(input, output, rows, cols);
                unsafe { prepare_b8_quantized(input, output, rows, cols) }
            }

            fn prepare_b_transposed(
                &self,
                input: &[f32],
                output: &mut [i8],
                quant_mult: f32,
                rows: usize,
                cols: usize,
            ) {
                $cap8.check_prepare_b(input, output, rows, cols);
                assert!(quant_mult > 0.0, "{}: quant_mult must be positive", $cap8.name);
                unsafe { prepare_b8_transposed(input, output, quant_mult, rows, cols) }
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
                $cap8.check_multiply(a, b, c, a_rows, width, b_cols);
                unsafe { multiply8(a, b, c, unquant_mult, a_rows, width, b_cols) }
            }

            fn max_absolute(&self, input: &[f32]) -> f32 {
                unsafe { max_absolute(input) }
            }

            fn vector_mean_std(&self, input: &[f32], absolute: bool) -> $crate::kernel::MeanStd {
                unsafe { vector_mean_std(input, absolute) }
            }
        }

        impl $crate::kernel::Kernel8 for $Int8 {
            fn quantize_u(&self, input: &[f32], output: &mut [u8], quant_mult: f32) {
                $cap8.check_quantize_buffers(input, output, quant_mult);
                unsafe { quantize8(input, output.as_mut_ptr(), quant_mult, true) }
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
                $cap8.check_multiply(a, b, c, a_rows, width, b_cols);
                $crate::kernel::check_bias(&$cap8, bias, b_cols);
                unsafe { multiply8_shift(a, b, c, unquant_mult, bias, a_rows, width, b_cols) }
            }
        }
    };
}

#[cfg(target_arch = "x86_64")]
pub(crate) use tiled_kernels;

#[cfg(test)]
mod tests;
