//! Error types for model construction and input checks

use thiserror::Error;

/// Errors raised while wiring or feeding a CrystalNet.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CrystalError {
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("{tensor} has {actual} channels, expected {expected}")]
    ChannelMismatch {
        tensor: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{tensor} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        tensor: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

impl CrystalError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

pub type CrystalResult<T> = Result<T, CrystalError>;
