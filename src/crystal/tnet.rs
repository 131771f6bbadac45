//! Order-invariant aggregation over a variable number of glass layers

use burn::module::Module;
use burn::nn::conv::Conv2d;
use burn::tensor::backend::Backend;
use burn::tensor::{activation, Tensor};
use tracing::trace;

use super::blocks::conv2d;

/// in -> 64 -> 128 -> 64 -> out, every stage followed by ReLU
#[derive(Module, Debug)]
pub struct TNetBackBone<B: Backend> {
    layer1: Conv2d<B>,
    layer2: Conv2d<B>,
    layer3: Conv2d<B>,
    layer4: Conv2d<B>,
}

impl<B: Backend> TNetBackBone<B> {
    pub fn new(c1: usize, c2: usize, device: &B::Device) -> Self {
        Self {
            layer1: conv2d(c1, 64, 3, true, device),
            layer2: conv2d(64, 128, 3, true, device),
            layer3: conv2d(128, 64, 3, true, device),
            layer4: conv2d(64, c2, 1, true, device),
        }
    }

    pub fn forward(&self, xs: Tensor<B, 4>) -> Tensor<B, 4> {
        let xs = activation::relu(self.layer1.forward(xs));
        let xs = activation::relu(self.layer2.forward(xs));
        let xs = activation::relu(self.layer3.forward(xs));
        activation::relu(self.layer4.forward(xs))
    }
}

/// Sums `tnet_f([rx, g_i])` over every glass index, then applies `tnet_b`.
///
/// `tnet_f` is a single parameter set reused for every index, so the result
/// does not depend on the order of the glass axis and any count works,
/// including none at all.
#[derive(Module, Debug)]
pub struct TNet<B: Backend> {
    tnet_f: TNetBackBone<B>,
    tnet_b: TNetBackBone<B>,
    hidden: usize,
}

impl<B: Backend> TNet<B> {
    /// `c1` is the width of `rx` plus the width of one glass slice.
    pub fn new(c1: usize, hidden: usize, c2: usize, device: &B::Device) -> Self {
        Self {
            tnet_f: TNetBackBone::new(c1, hidden, device),
            tnet_b: TNetBackBone::new(hidden, c2, device),
            hidden,
        }
    }

    /// `glass` is `[batch, num_glass, channels, height, width]`.
    pub fn forward(&self, glass: Tensor<B, 5>, rx: Tensor<B, 4>) -> Tensor<B, 4> {
        let [b, num_glass, _c, h, w] = glass.dims();
        trace!(num_glass, "aggregating glass layers");

        let identity = Tensor::zeros([b, self.hidden, h, w], &rx.device());
        let sum = (0..num_glass)
            .map(|i| glass.clone().narrow(1, i, 1).squeeze_dim::<4>(1))
            .map(|g| self.tnet_f.forward(Tensor::cat(vec![rx.clone(), g], 1)))
            .fold(identity, |acc, ys| acc + ys);

        self.tnet_b.forward(sum)
    }
}
