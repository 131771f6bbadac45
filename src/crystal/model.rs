//! CrystalNet: positional encoding, UNet, glass aggregation and a
//! three-headed decoder with per-head refinement
//!
//! Reference wiring: 21 feature channels + 16 positional features enter the
//! UNet, whose 8 channels condition the TNet over 17-channel glass layers;
//! the 8 + 16 channel concatenation feeds the ThreeWayUNet.

use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::backend::Backend;
use burn::tensor::{activation, Tensor};
use tracing::{debug, info};

use super::blocks::UpsampleMode;
use super::rnet::{RNet, LEAKY_SLOPE};
use super::tnet::TNet;
use super::unet::{ThreeWayUNet, UNet, MIN_SPATIAL};
use crate::error::{CrystalError, CrystalResult};

/// Channels read from the feature tensor as a per-pixel position.
const POSITION_CHANNELS: usize = 3;

/// Wiring of a [`CrystalNet`].
#[derive(Config, Debug)]
pub struct CrystalNetConfig {
    /// Width of the index (oi) head.
    pub n_oi: usize,
    /// Channels of the main feature tensor before positional augmentation.
    #[config(default = 21)]
    pub feature_channels: usize,
    /// Channels of a single glass layer.
    #[config(default = 17)]
    pub glass_channels: usize,
    /// First of the three position channels inside the feature tensor.
    #[config(default = 4)]
    pub position_offset: usize,
    #[config(default = 16)]
    pub position_features: usize,
    /// Output width of the first UNet.
    #[config(default = 8)]
    pub unet_channels: usize,
    #[config(default = 32)]
    pub tnet_hidden: usize,
    /// Output width of the glass aggregation.
    #[config(default = 16)]
    pub tnet_channels: usize,
    #[config(default = "UpsampleMode::Bilinear")]
    pub upsample: UpsampleMode,
}

impl CrystalNetConfig {
    /// Reference wiring: 21 feature channels, 17 glass channels, bilinear decoders.
    pub fn reference(n_oi: usize) -> Self {
        Self::new(n_oi)
    }

    pub fn unet_in_channels(&self) -> usize {
        self.feature_channels + self.position_features
    }

    pub fn tnet_in_channels(&self) -> usize {
        self.unet_channels + self.glass_channels
    }

    pub fn decoder_in_channels(&self) -> usize {
        self.unet_channels + self.tnet_channels
    }

    /// Rejects wiring that could only fail later inside a forward pass.
    pub fn validate(&self) -> CrystalResult<()> {
        let widths = [
            ("n_oi", self.n_oi),
            ("feature_channels", self.feature_channels),
            ("glass_channels", self.glass_channels),
            ("position_features", self.position_features),
            ("unet_channels", self.unet_channels),
            ("tnet_hidden", self.tnet_hidden),
            ("tnet_channels", self.tnet_channels),
        ];
        if let Some((name, _)) = widths.iter().find(|(_, width)| *width == 0) {
            return Err(CrystalError::config(format!("{name} must be non-zero")));
        }

        if self.position_offset + POSITION_CHANNELS > self.feature_channels {
            return Err(CrystalError::config(format!(
                "position channels [{}, {}) fall outside {} feature channels",
                self.position_offset,
                self.position_offset + POSITION_CHANNELS,
                self.feature_channels
            )));
        }

        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> CrystalResult<CrystalNet<B>> {
        self.validate()?;

        let model = CrystalNet {
            cnet: CNet::new(self, device),
            feature_channels: self.feature_channels,
            glass_channels: self.glass_channels,
        };
        info!(
            n_oi = self.n_oi,
            params = model.num_params(),
            "initialized CrystalNet"
        );
        Ok(model)
    }
}

/// Learned per-pixel embedding of the position channels: Linear + LeakyReLU
#[derive(Module, Debug)]
pub struct PositionalEncoding<B: Backend> {
    fc: Linear<B>,
    offset: usize,
}

impl<B: Backend> PositionalEncoding<B> {
    pub fn new(offset: usize, features: usize, device: &B::Device) -> Self {
        Self {
            fc: LinearConfig::new(POSITION_CHANNELS, features).init(device),
            offset,
        }
    }

    /// Maps `[b, c, h, w]` features to a `[b, features, h, w]` embedding.
    pub fn forward(&self, xs: Tensor<B, 4>) -> Tensor<B, 4> {
        // Channels last so the linear layer acts on each pixel's position.
        let position = xs.narrow(1, self.offset, POSITION_CHANNELS).swap_dims(1, 3);
        let pe = activation::leaky_relu(self.fc.forward(position), LEAKY_SLOPE);
        pe.swap_dims(1, 3)
    }
}

#[derive(Module, Debug)]
pub struct CNet<B: Backend> {
    inner_pos: PositionalEncoding<B>,
    unet: UNet<B>,
    tnet: TNet<B>,
    r_unet: ThreeWayUNet<B>,
    rnet_uv: RNet<B>,
    rnet_normal: RNet<B>,
}

impl<B: Backend> CNet<B> {
    pub fn new(config: &CrystalNetConfig, device: &B::Device) -> Self {
        debug!(
            unet_in = config.unet_in_channels(),
            tnet_in = config.tnet_in_channels(),
            decoder_in = config.decoder_in_channels(),
            "wiring CNet"
        );

        let mode = config.upsample;
        Self {
            inner_pos: PositionalEncoding::new(
                config.position_offset,
                config.position_features,
                device,
            ),
            unet: UNet::new(config.unet_in_channels(), config.unet_channels, mode, device),
            tnet: TNet::new(
                config.tnet_in_channels(),
                config.tnet_hidden,
                config.tnet_channels,
                device,
            ),
            r_unet: ThreeWayUNet::new(config.decoder_in_channels(), config.n_oi, mode, device),
            rnet_uv: RNet::new(2, 2, device),
            rnet_normal: RNet::new(3, 3, device),
        }
    }

    /// Returns `(normal, oi, uv)`.
    pub fn forward(
        &self,
        xs: Tensor<B, 4>,
        glass: Tensor<B, 5>,
    ) -> (Tensor<B, 4>, Tensor<B, 4>, Tensor<B, 4>) {
        let pe = self.inner_pos.forward(xs.clone());
        let rx = self.unet.forward(Tensor::cat(vec![xs, pe], 1));
        let tx = self.tnet.forward(glass, rx.clone());

        let (normal, oi, uv) = self.r_unet.forward(Tensor::cat(vec![rx, tx], 1));
        let uv = self.rnet_uv.forward(uv);
        let normal = self.rnet_normal.forward(normal);
        (normal, oi, uv)
    }
}

/// The three predicted surface properties.
#[derive(Debug, Clone)]
pub struct CrystalOutput<B: Backend> {
    /// `[b, 3, h, w]`
    pub normal: Tensor<B, 4>,
    /// `[b, n_oi, h, w]`
    pub oi: Tensor<B, 4>,
    /// `[b, 2, h, w]`
    pub uv: Tensor<B, 4>,
}

impl<B: Backend> CrystalOutput<B> {
    pub fn into_tuple(self) -> (Tensor<B, 4>, Tensor<B, 4>, Tensor<B, 4>) {
        (self.normal, self.oi, self.uv)
    }
}

/// Public model interface. Build one with [`CrystalNetConfig::init`].
#[derive(Module, Debug)]
pub struct CrystalNet<B: Backend> {
    cnet: CNet<B>,
    feature_channels: usize,
    glass_channels: usize,
}

impl<B: Backend> CrystalNet<B> {
    /// `xs` is `[b, feature_channels, h, w]`, `glass` is
    /// `[b, num_glass, glass_channels, h, w]` with any `num_glass`.
    ///
    /// Mismatched shapes panic inside the tensor engine; use
    /// [`CrystalNet::try_forward`] to get an error instead.
    pub fn forward(&self, xs: Tensor<B, 4>, glass: Tensor<B, 5>) -> CrystalOutput<B> {
        let (normal, oi, uv) = self.cnet.forward(xs, glass);
        CrystalOutput { normal, oi, uv }
    }

    /// Runs [`CrystalNet::check_inputs`] first, so bad shapes come back as errors.
    pub fn try_forward(
        &self,
        xs: Tensor<B, 4>,
        glass: Tensor<B, 5>,
    ) -> CrystalResult<CrystalOutput<B>> {
        self.check_inputs(&xs, &glass)?;
        Ok(self.forward(xs, glass))
    }

    /// Checks channel widths, the minimum size the encoder can pool, and
    /// that the glass layers line up with the features.
    pub fn check_inputs(&self, xs: &Tensor<B, 4>, glass: &Tensor<B, 5>) -> CrystalResult<()> {
        let [b, c, h, w] = xs.dims();
        if c != self.feature_channels {
            return Err(CrystalError::ChannelMismatch {
                tensor: "features",
                expected: self.feature_channels,
                actual: c,
            });
        }
        if h < MIN_SPATIAL || w < MIN_SPATIAL {
            return Err(CrystalError::ShapeMismatch {
                tensor: "features",
                expected: vec![b, c, h.max(MIN_SPATIAL), w.max(MIN_SPATIAL)],
                actual: vec![b, c, h, w],
            });
        }

        let [gb, num_glass, gc, gh, gw] = glass.dims();
        if gc != self.glass_channels {
            return Err(CrystalError::ChannelMismatch {
                tensor: "glass",
                expected: self.glass_channels,
                actual: gc,
            });
        }
        if (gb, gh, gw) != (b, h, w) {
            return Err(CrystalError::ShapeMismatch {
                tensor: "glass",
                expected: vec![b, num_glass, gc, h, w],
                actual: vec![gb, num_glass, gc, gh, gw],
            });
        }

        Ok(())
    }
}
