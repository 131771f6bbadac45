//! CrystalNet model built on Burn
//!
//! Predicts per-pixel surface normal, index (oi) and uv coordinates of a
//! refractive object from a feature image and any number of glass layers.
//! Supports WGPU, CPU (NdArray) and CUDA backends.

pub mod backend;
pub mod crystal;
pub mod error;

pub use backend::{DefaultBackend, DefaultCrystalNet};
pub use crystal::{CrystalNet, CrystalNetConfig, CrystalOutput, UpsampleMode};
pub use error::{CrystalError, CrystalResult};
