//! Owned prepared-B matrices.
//!
//! The prepared layout depends on the register width, so a `PreparedB`
//! remembers which tier built it and refuses to feed a different one.

use intgemm_core::{AlignedVec, CpuType, Element};

use crate::kernel::{Kernel, Kernel8};

/// A B matrix laid out for one kernel variant, `rows x cols` logical shape.
#[derive(Clone, Debug)]
pub struct PreparedB<T: Element> {
    data: AlignedVec<T>,
    rows: usize,
    cols: usize,
    cpu: CpuType,
}

impl<T: Element> PreparedB<T> {
    fn built_by<K: Kernel<Integer = T> + ?Sized>(kernel: &K, data: AlignedVec<T>, rows: usize, cols: usize) -> Self {
        Self {
            data,
            rows,
            cols,
            cpu: kernel.capability().cpu,
        }
    }

    /// Quantize a row-major float B.
    pub fn prepare<K: Kernel<Integer = T> + ?Sized>(
        kernel: &K,
        input: &[f32],
        quant_mult: f32,
        rows: usize,
        cols: usize,
    ) -> Self {
        let mut data = AlignedVec::zeroed(rows * cols);
        kernel.prepare_b(input, &mut data, quant_mult, rows, cols);
        Self::built_by(kernel, data, rows, cols)
    }

    /// Quantize a column-major float B.
    pub fn prepare_transposed<K: Kernel<Integer = T> + ?Sized>(
        kernel: &K,
        input: &[f32],
        quant_mult: f32,
        rows: usize,
        cols: usize,
    ) -> Self {
        let mut data = AlignedVec::zeroed(rows * cols);
        kernel.prepare_b_transposed(input, &mut data, quant_mult, rows, cols);
        Self::built_by(kernel, data, rows, cols)
    }

    /// Lay out an already quantized row-major B.
    pub fn from_quantized<K: Kernel<Integer = T> + ?Sized>(
        kernel: &K,
        input: &[T],
        rows: usize,
        cols: usize,
    ) -> Self {
        let mut data = AlignedVec::zeroed(rows * cols);
        kernel.prepare_b_quantized(input, &mut data, rows, cols);
        Self::built_by(kernel, data, rows, cols)
    }

    /// Lay out an already quantized column-major B.
    pub fn from_quantized_transposed<K: Kernel<Integer = T> + ?Sized>(
        kernel: &K,
        input: &[T],
        rows: usize,
        cols: usize,
    ) -> Self {
        let mut data = AlignedVec::zeroed(rows * cols);
        kernel.prepare_b_quantized_transposed(input, &mut data, rows, cols);
        Self::built_by(kernel, data, rows, cols)
    }

    /// Keep only the listed columns, in the listed order.
    pub fn select_columns<K: Kernel<Integer = T> + ?Sized>(&self, kernel: &K, cols: &[usize]) -> Self {
        self.check_kernel(kernel);
        let mut data = AlignedVec::zeroed(self.rows * cols.len());
        kernel.select_columns_b(&self.data, &mut data, self.rows, cols);
        Self {
            data,
            rows: self.rows,
            cols: cols.len(),
            cpu: self.cpu,
        }
    }

    /// `C = (A * self) * unquant_mult`; A is `a_rows x rows`, C is `a_rows x cols`.
    pub fn multiply<K: Kernel<Integer = T> + ?Sized>(
        &self,
        kernel: &K,
        a: &[T],
        c: &mut [f32],
        unquant_mult: f32,
        a_rows: usize,
    ) {
        self.check_kernel(kernel);
        kernel.multiply(a, &self.data, c, unquant_mult, a_rows, self.rows, self.cols);
    }

    fn check_kernel<K: Kernel<Integer = T> + ?Sized>(&self, kernel: &K) {
        let cap = kernel.capability();
        assert_eq!(
            self.cpu, cap.cpu,
            "B prepared by the {} variant cannot be used by {}",
            self.cpu, cap.name
        );
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Tier whose layout this matrix uses.
    pub fn cpu(&self) -> CpuType {
        self.cpu
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
}

impl PreparedB<i8> {
    /// Shifted multiply: `C = (A_u * self) * unquant_mult + bias[col]`.
    pub fn multiply_shift<K: Kernel8 + ?Sized>(
        &self,
        kernel: &K,
        a: &[u8],
        c: &mut [f32],
        unquant_mult: f32,
        bias: &[f32],
        a_rows: usize,
    ) {
        self.check_kernel(kernel);
        kernel.multiply8_shift(a, &self.data, c, unquant_mult, bias, a_rows, self.rows, self.cols);
    }

    /// Bias that cancels the +127 shift of A, on top of `bias_in`.
    pub fn shift_bias<K: Kernel8 + ?Sized>(&self, kernel: &K, unquant_mult: f32, bias_in: &[f32]) -> AlignedVec<f32> {
        self.check_kernel(kernel);
        let mut bias_out = AlignedVec::zeroed(self.cols);
        kernel.prepare_bias(&self.data, self.rows, self.cols, unquant_mult, bias_in, &mut bias_out);
        bias_out
    }
}
