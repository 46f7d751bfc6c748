//! # intgemm core
//!
//! Host-facing pieces shared by the integer GEMM kernels.
//!
//! This crate provides:
//! - **Compute dispatch**: one-time probe of SSE2/SSSE3/AVX2 support and the
//!   tier selection (with the `INTGEMM_CPU` override).
//! - **AlignedVec**: 64-byte aligned operand buffers.
//! - **Tile geometry**: the prepared-B register layout and the width-independent
//!   walks over it (column selection, transposed copy, wrapping row access).

pub mod aligned;
pub mod compute;
pub mod error;
pub mod tile;

pub use aligned::{AlignedVec, Element, ALIGNMENT};
pub use compute::{ComputeCaps, CpuType};
pub use error::{Error, Result};
pub use tile::{Tile, WrappingCursor, B_TILE_COLS};
