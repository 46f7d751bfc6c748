//! Compute dispatch layer: probe the host once, then pick the most capable tier.
//!
//! Tiers (least to most capable):
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Avx2:   256-bit registers, 16-bit and 8-bit kernels        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Ssse3:  128-bit registers, adds the signed 8-bit kernel    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Sse2:   128-bit registers, 16-bit kernel only              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scalar: portable loops, same tiling and rounding as SSE    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The tier used at runtime can be capped with the `INTGEMM_CPU` environment
//! variable (`scalar`, `sse2`, `ssse3`, `avx2`). Asking for a tier the host
//! cannot run is logged and ignored.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::{Error, Result};

/// Environment variable read by [`selected`] to cap the tier.
pub const CPU_ENV_VAR: &str = "INTGEMM_CPU";

/// Instruction-set tier. Ordered so that `a < b` means `b` can do everything `a` can.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum CpuType {
    #[default]
    Scalar,
    Sse2,
    Ssse3,
    Avx2,
}

impl CpuType {
    /// Every tier, most capable first.
    pub const ALL: [CpuType; 4] = [CpuType::Avx2, CpuType::Ssse3, CpuType::Sse2, CpuType::Scalar];

    pub fn name(self) -> &'static str {
        match self {
            CpuType::Scalar => "scalar",
            CpuType::Sse2 => "sse2",
            CpuType::Ssse3 => "ssse3",
            CpuType::Avx2 => "avx2",
        }
    }

    /// Width in bytes of one register at this tier. Scalar emulates 128 bits.
    pub fn register_bytes(self) -> usize {
        match self {
            CpuType::Scalar | CpuType::Sse2 | CpuType::Ssse3 => 16,
            CpuType::Avx2 => 32,
        }
    }
}

impl fmt::Display for CpuType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CpuType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        CpuType::ALL
            .into_iter()
            .find(|cpu| cpu.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| Error::InvalidCpu(trimmed.to_string()))
    }
}

/// Detected instruction-set support of the current host.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComputeCaps {
    pub sse2: bool,
    pub ssse3: bool,
    pub avx2: bool,
}

impl ComputeCaps {
    /// Whether kernels of tier `cpu` can run here. Scalar always can.
    pub fn supports(&self, cpu: CpuType) -> bool {
        match cpu {
            CpuType::Scalar => true,
            CpuType::Sse2 => self.sse2,
            CpuType::Ssse3 => self.ssse3,
            CpuType::Avx2 => self.avx2,
        }
    }

    /// The most capable supported tier.
    pub fn best(&self) -> CpuType {
        CpuType::ALL
            .into_iter()
            .find(|&cpu| self.supports(cpu))
            .unwrap_or(CpuType::Scalar)
    }

    /// Resolve an optional override against these capabilities.
    ///
    /// `None` yields [`best`](Self::best). A named tier must parse and be supported.
    pub fn resolve(&self, requested: Option<&str>) -> Result<CpuType> {
        match requested {
            None => Ok(self.best()),
            Some(value) => {
                let cpu: CpuType = value.parse()?;
                if self.supports(cpu) {
                    Ok(cpu)
                } else {
                    Err(Error::Unsupported { cpu })
                }
            }
        }
    }
}

static CAPS: OnceLock<ComputeCaps> = OnceLock::new();
static SELECTED: OnceLock<CpuType> = OnceLock::new();

/// Detect hardware capabilities (cached after first call).
pub fn detect() -> &'static ComputeCaps {
    CAPS.get_or_init(|| {
        #[cfg(target_arch = "x86_64")]
        {
            ComputeCaps {
                sse2: is_x86_feature_detected!("sse2"),
                ssse3: is_x86_feature_detected!("ssse3"),
                avx2: is_x86_feature_detected!("avx2"),
            }
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            ComputeCaps::default()
        }
    })
}

/// Tier used by the dispatcher: the best detected one, capped by `INTGEMM_CPU`.
///
/// Decided once per process.
pub fn selected() -> CpuType {
    *SELECTED.get_or_init(|| {
        let caps = detect();
        let requested = std::env::var(CPU_ENV_VAR).ok();
        match caps.resolve(requested.as_deref()) {
            Ok(cpu) => {
                log::debug!("compute tier {cpu} selected (detected {caps:?})");
                cpu
            }
            Err(err) => {
                let best = caps.best();
                log::warn!("ignoring {CPU_ENV_VAR}: {err}; falling back to {best}");
                best
            }
        }
    })
}

/// Print detected capabilities summary.
pub fn print_caps() {
    let caps = detect();
    println!("=== Compute Capabilities ===");
    println!("  SSE2:          {}", caps.sse2);
    println!("  SSSE3:         {}", caps.ssse3);
    println!("  AVX2:          {}", caps.avx2);
    println!("  Best tier:     {}", caps.best());
    println!("  Selected tier: {}", selected());
}
