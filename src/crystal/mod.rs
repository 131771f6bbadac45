pub mod blocks;
pub mod model;
pub mod rnet;
pub mod tnet;
pub mod unet;

pub use blocks::{DoubleConv, Down, OutConv, Up, UpsampleMode};
pub use model::{CNet, CrystalNet, CrystalNetConfig, CrystalOutput, PositionalEncoding};
pub use rnet::RNet;
pub use tnet::{TNet, TNetBackBone};
pub use unet::{ThreeWayUNet, UNet};
