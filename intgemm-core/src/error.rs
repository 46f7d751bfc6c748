use thiserror::Error;

use crate::compute::CpuType;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("{cpu} kernels cannot run on this host")]
    Unsupported { cpu: CpuType },
    #[error("unknown cpu type: {0:?}")]
    InvalidCpu(String),
}
