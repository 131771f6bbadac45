//! Plain convolutional refinement stack applied to individual output heads

use burn::module::Module;
use burn::nn::conv::Conv2d;
use burn::tensor::backend::Backend;
use burn::tensor::{activation, Tensor};

use super::blocks::conv2d;

/// Negative slope shared by every LeakyReLU in the network.
pub(crate) const LEAKY_SLOPE: f64 = 0.01;

/// 5x5 -> 3x3 -> 3x3 -> 1x1, leaky activations on all but the last stage
#[derive(Module, Debug)]
pub struct RNet<B: Backend> {
    layer0: Conv2d<B>,
    layer1: Conv2d<B>,
    layer2: Conv2d<B>,
    layer3: Conv2d<B>,
}

impl<B: Backend> RNet<B> {
    pub fn new(c1: usize, c2: usize, device: &B::Device) -> Self {
        Self {
            layer0: conv2d(c1, 32, 5, true, device),
            layer1: conv2d(32, 64, 3, true, device),
            layer2: conv2d(64, 32, 3, true, device),
            layer3: conv2d(32, c2, 1, true, device),
        }
    }

    pub fn forward(&self, xs: Tensor<B, 4>) -> Tensor<B, 4> {
        let xs = activation::leaky_relu(self.layer0.forward(xs), LEAKY_SLOPE);
        let xs = activation::leaky_relu(self.layer1.forward(xs), LEAKY_SLOPE);
        let xs = activation::leaky_relu(self.layer2.forward(xs), LEAKY_SLOPE);
        self.layer3.forward(xs)
    }
}
