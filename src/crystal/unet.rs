//! UNet and its three-headed variant sharing a single encoder ladder

use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use tracing::debug;

use super::blocks::{DoubleConv, Down, OutConv, Up, UpsampleMode};

/// Channel widths of the five encoder levels before the bilinear factor.
const WIDTHS: [usize; 5] = [32, 64, 128, 256, 512];

/// Number of 2x2 poolings in the encoder ladder.
const ENCODER_DEPTH: u32 = 4;

/// Smallest height or width that survives every encoder pooling.
pub const MIN_SPATIAL: usize = 1 << ENCODER_DEPTH;

/// Skip features produced by the encoder, shallowest first.
#[derive(Debug, Clone)]
pub struct EncoderFeatures<B: Backend> {
    pub x1: Tensor<B, 4>,
    pub x2: Tensor<B, 4>,
    pub x3: Tensor<B, 4>,
    pub x4: Tensor<B, 4>,
    pub x5: Tensor<B, 4>,
}

/// Input DoubleConv followed by four downsampling stages
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    inc: DoubleConv<B>,
    down1: Down<B>,
    down2: Down<B>,
    down3: Down<B>,
    down4: Down<B>,
}

impl<B: Backend> Encoder<B> {
    pub fn new(n_channels: usize, mode: UpsampleMode, device: &B::Device) -> Self {
        let f = mode.factor();
        let [w1, w2, w3, w4, w5] = WIDTHS;
        Self {
            inc: DoubleConv::new(n_channels, w1, None, device),
            down1: Down::new(w1, w2, device),
            down2: Down::new(w2, w3, device),
            down3: Down::new(w3, w4, device),
            down4: Down::new(w4, w5 / f, device),
        }
    }

    pub fn forward(&self, xs: Tensor<B, 4>) -> EncoderFeatures<B> {
        let x1 = self.inc.forward(xs);
        let x2 = self.down1.forward(x1.clone());
        let x3 = self.down2.forward(x2.clone());
        let x4 = self.down3.forward(x3.clone());
        let x5 = self.down4.forward(x4.clone());
        EncoderFeatures { x1, x2, x3, x4, x5 }
    }
}

/// One decoder group: four Up stages and a 1x1 projection
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    up1: Up<B>,
    up2: Up<B>,
    up3: Up<B>,
    up4: Up<B>,
    outc: OutConv<B>,
}

impl<B: Backend> Decoder<B> {
    pub fn new(n_classes: usize, mode: UpsampleMode, device: &B::Device) -> Self {
        let f = mode.factor();
        let [w1, w2, w3, w4, w5] = WIDTHS;
        Self {
            up1: Up::new(w5, w4 / f, mode, device),
            up2: Up::new(w4, w3 / f, mode, device),
            up3: Up::new(w3, w2 / f, mode, device),
            up4: Up::new(w2, w1, mode, device),
            outc: OutConv::new(w1, n_classes, device),
        }
    }

    pub fn forward(&self, feats: &EncoderFeatures<B>) -> Tensor<B, 4> {
        let xs = self.up1.forward(feats.x5.clone(), feats.x4.clone());
        let xs = self.up2.forward(xs, feats.x3.clone());
        let xs = self.up3.forward(xs, feats.x2.clone());
        let xs = self.up4.forward(xs, feats.x1.clone());
        self.outc.forward(xs)
    }
}

/// Single-output encoder/decoder
#[derive(Module, Debug)]
pub struct UNet<B: Backend> {
    encoder: Encoder<B>,
    decoder: Decoder<B>,
}

impl<B: Backend> UNet<B> {
    pub fn new(n_channels: usize, n_classes: usize, mode: UpsampleMode, device: &B::Device) -> Self {
        debug!(n_channels, n_classes, ?mode, "building UNet");
        Self {
            encoder: Encoder::new(n_channels, mode, device),
            decoder: Decoder::new(n_classes, mode, device),
        }
    }

    pub fn forward(&self, xs: Tensor<B, 4>) -> Tensor<B, 4> {
        let feats = self.encoder.forward(xs);
        self.decoder.forward(&feats)
    }
}

/// Shared encoder with three parameter-independent decoder groups.
///
/// The groups produce the normal (3 channels), index (`n_oi` channels) and
/// uv (2 channels) heads, in that order.
#[derive(Module, Debug)]
pub struct ThreeWayUNet<B: Backend> {
    encoder: Encoder<B>,
    normal: Decoder<B>,
    oi: Decoder<B>,
    uv: Decoder<B>,
}

impl<B: Backend> ThreeWayUNet<B> {
    pub fn new(n_channels: usize, n_oi: usize, mode: UpsampleMode, device: &B::Device) -> Self {
        debug!(n_channels, n_oi, ?mode, "building ThreeWayUNet");
        Self {
            encoder: Encoder::new(n_channels, mode, device),
            normal: Decoder::new(3, mode, device),
            oi: Decoder::new(n_oi, mode, device),
            uv: Decoder::new(2, mode, device),
        }
    }

    /// Returns `(normal, oi, uv)`.
    pub fn forward(&self, xs: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 4>, Tensor<B, 4>) {
        let feats = self.encoder.forward(xs);
        let normal = self.normal.forward(&feats);
        let oi = self.oi.forward(&feats);
        let uv = self.uv.forward(&feats);
        (normal, oi, uv)
    }
}
