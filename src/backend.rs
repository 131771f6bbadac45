//! Backend picked by cargo feature; cuda wins over wgpu, wgpu over cpu.

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn::backend::Cuda;

#[cfg(all(feature = "wgpu", not(feature = "cuda")))]
pub type DefaultBackend = burn::backend::wgpu::Wgpu;

#[cfg(not(any(feature = "wgpu", feature = "cuda")))]
pub type DefaultBackend = burn::backend::ndarray::NdArray;

pub type DefaultCrystalNet = crate::crystal::CrystalNet<DefaultBackend>;
