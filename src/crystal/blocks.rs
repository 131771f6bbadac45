//! U-Net building blocks: DoubleConv, Down, Up and OutConv
//!
//! Shapes follow the burn convention `[batch, channels, height, width]`.

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::PaddingConfig2d;
use burn::tensor::backend::Backend;
use burn::tensor::module::{interpolate, max_pool2d};
use burn::tensor::ops::{InterpolateMode, InterpolateOptions, PadMode};
use burn::tensor::{activation, Tensor};
use serde::{Deserialize, Serialize};

/// How the decoder doubles spatial resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpsampleMode {
    /// Bilinear interpolation with aligned corners, no parameters.
    #[default]
    Bilinear,
    /// Learned 2x2 transposed convolution that halves the channel count.
    Transposed,
}

impl UpsampleMode {
    /// Channel divisor applied to the deepest encoder level and the decoder outputs.
    pub fn factor(&self) -> usize {
        match self {
            UpsampleMode::Bilinear => 2,
            UpsampleMode::Transposed => 1,
        }
    }
}

/// Square convolution with "same" padding for odd kernels.
pub(crate) fn conv2d<B: Backend>(
    c1: usize,
    c2: usize,
    k: usize,
    bias: bool,
    device: &B::Device,
) -> Conv2d<B> {
    let padding = k / 2;
    Conv2dConfig::new([c1, c2], [k, k])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_bias(bias)
        .init(device)
}

/// (3x3 conv => ReLU) * 2, bias-free
#[derive(Module, Debug)]
pub struct DoubleConv<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
}

impl<B: Backend> DoubleConv<B> {
    pub fn new(c1: usize, c2: usize, mid: Option<usize>, device: &B::Device) -> Self {
        let mid = mid.unwrap_or(c2);
        Self {
            conv1: conv2d(c1, mid, 3, false, device),
            conv2: conv2d(mid, c2, 3, false, device),
        }
    }

    pub fn forward(&self, xs: Tensor<B, 4>) -> Tensor<B, 4> {
        let xs = activation::relu(self.conv1.forward(xs));
        activation::relu(self.conv2.forward(xs))
    }
}

/// 2x2 max-pool then DoubleConv
#[derive(Module, Debug)]
pub struct Down<B: Backend> {
    conv: DoubleConv<B>,
}

impl<B: Backend> Down<B> {
    pub fn new(c1: usize, c2: usize, device: &B::Device) -> Self {
        Self {
            conv: DoubleConv::new(c1, c2, None, device),
        }
    }

    pub fn forward(&self, xs: Tensor<B, 4>) -> Tensor<B, 4> {
        let xs = max_pool2d(xs, [2, 2], [2, 2], [0, 0], [1, 1], false);
        self.conv.forward(xs)
    }
}

/// 2x upsampling, either interpolated or learned.
///
/// An empty `transposed` slot means bilinear mode.
#[derive(Module, Debug)]
pub struct Upsample<B: Backend> {
    transposed: Option<ConvTranspose2d<B>>,
}

impl<B: Backend> Upsample<B> {
    pub fn new(channels: usize, mode: UpsampleMode, device: &B::Device) -> Self {
        let transposed = match mode {
            UpsampleMode::Bilinear => None,
            UpsampleMode::Transposed => Some(
                ConvTranspose2dConfig::new([channels, channels / 2], [2, 2])
                    .with_stride([2, 2])
                    .init(device),
            ),
        };
        Self { transposed }
    }

    pub fn forward(&self, xs: Tensor<B, 4>) -> Tensor<B, 4> {
        match &self.transposed {
            Some(conv) => conv.forward(xs),
            None => {
                let [_b, _c, h, w] = xs.dims();
                interpolate(
                    xs,
                    [h * 2, w * 2],
                    InterpolateOptions::new(InterpolateMode::Bilinear),
                )
            }
        }
    }
}

/// Low/high split of a non-negative size difference: floor on the low side.
pub(crate) fn pad_split(delta: usize) -> (usize, usize) {
    (delta / 2, delta - delta / 2)
}

/// Trims `xs` along `dim` down to `target`, taking the larger half from the low side.
fn crop_axis<B: Backend>(xs: Tensor<B, 4>, dim: usize, target: usize) -> Tensor<B, 4> {
    let size = xs.dims()[dim];
    if size <= target {
        return xs;
    }
    let excess = size - target;
    xs.narrow(dim, excess - excess / 2, target)
}

/// Zero-pads (or crops) `xs` so its spatial size equals `[height, width]`.
pub fn pad_to_match<B: Backend>(xs: Tensor<B, 4>, height: usize, width: usize) -> Tensor<B, 4> {
    let xs = crop_axis(crop_axis(xs, 2, height), 3, width);
    let [_b, _c, h, w] = xs.dims();

    let (top, bottom) = pad_split(height - h);
    let (left, right) = pad_split(width - w);
    xs.pad((left, right, top, bottom), PadMode::Constant(0.0))
}

/// Upscaling, pad-to-skip, concat, then DoubleConv
#[derive(Module, Debug)]
pub struct Up<B: Backend> {
    up: Upsample<B>,
    conv: DoubleConv<B>,
}

impl<B: Backend> Up<B> {
    /// `c1` is the channel count after concatenation with the skip.
    pub fn new(c1: usize, c2: usize, mode: UpsampleMode, device: &B::Device) -> Self {
        let up = Upsample::new(c1, mode, device);
        let conv = match mode {
            UpsampleMode::Bilinear => DoubleConv::new(c1, c2, Some(c1 / 2), device),
            UpsampleMode::Transposed => DoubleConv::new(c1, c2, None, device),
        };
        Self { up, conv }
    }

    pub fn forward(&self, xs: Tensor<B, 4>, skip: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_b, _c, h, w] = skip.dims();
        let xs = pad_to_match(self.up.forward(xs), h, w);
        self.conv.forward(Tensor::cat(vec![skip, xs], 1))
    }
}

/// 1x1 projection with bias, no activation
#[derive(Module, Debug)]
pub struct OutConv<B: Backend> {
    conv: Conv2d<B>,
}

impl<B: Backend> OutConv<B> {
    pub fn new(c1: usize, c2: usize, device: &B::Device) -> Self {
        Self {
            conv: conv2d(c1, c2, 1, true, device),
        }
    }

    pub fn forward(&self, xs: Tensor<B, 4>) -> Tensor<B, 4> {
        self.conv.forward(xs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{Distribution, TensorData};

    type TestBackend = NdArray;

    fn max_abs_diff(a: Tensor<TestBackend, 4>, b: Tensor<TestBackend, 4>) -> f32 {
        let diff = (a - b).abs().max().to_data();
        diff.to_vec::<f32>().unwrap()[0]
    }

    #[test]
    fn test_double_conv_keeps_resolution() {
        let device = Default::default();
        let block = DoubleConv::<TestBackend>::new(5, 12, Some(7), &device);

        let xs = Tensor::random([2, 5, 9, 11], Distribution::Default, &device);
        assert_eq!(block.forward(xs).dims(), [2, 12, 9, 11]);
    }

    #[test]
    fn test_double_conv_is_non_negative() {
        let device = Default::default();
        let block = DoubleConv::<TestBackend>::new(3, 4, None, &device);

        let xs = Tensor::random([1, 3, 6, 6], Distribution::Uniform(-1.0, 1.0), &device);
        let min: f32 = block.forward(xs).min().to_data().to_vec::<f32>().unwrap()[0];
        assert!(min >= 0.0);
    }

    #[test]
    fn test_down_halves_resolution() {
        let device = Default::default();
        let down = Down::<TestBackend>::new(8, 16, &device);

        let xs = Tensor::random([1, 8, 16, 12], Distribution::Default, &device);
        assert_eq!(down.forward(xs).dims(), [1, 16, 8, 6]);

        // Odd sizes floor like the pooling window does.
        let xs = Tensor::random([1, 8, 7, 9], Distribution::Default, &device);
        assert_eq!(down.forward(xs).dims(), [1, 16, 3, 4]);
    }

    #[test]
    fn test_pad_split_floor_low_side() {
        assert_eq!(pad_split(0), (0, 0));
        assert_eq!(pad_split(1), (0, 1));
        assert_eq!(pad_split(3), (1, 2));
        assert_eq!(pad_split(4), (2, 2));
    }

    #[test]
    fn test_pad_to_match_places_zeros_on_high_side() {
        let device = Default::default();
        let xs = Tensor::<TestBackend, 4>::ones([1, 1, 7, 2], &device);

        let padded = pad_to_match(xs, 8, 2);
        assert_eq!(padded.dims(), [1, 1, 8, 2]);

        let values = padded.to_data().to_vec::<f32>().unwrap();
        assert!(values[..14].iter().all(|v| *v == 1.0));
        assert_eq!(&values[14..], &[0.0, 0.0]);
    }

    #[test]
    fn test_pad_to_match_splits_both_axes() {
        let device = Default::default();
        let xs = Tensor::<TestBackend, 4>::ones([1, 1, 1, 1], &device);

        // dY = 3 -> (1, 2), dX = 2 -> (1, 1)
        let padded = pad_to_match(xs, 4, 3);
        let values = padded.to_data().to_vec::<f32>().unwrap();
        let mut expected = vec![0.0; 12];
        expected[3 + 1] = 1.0;
        assert_eq!(values, expected);
    }

    #[test]
    fn test_pad_to_match_crops_oversized_input() {
        let device = Default::default();
        let data = TensorData::new((0..5).map(|v| v as f32).collect::<Vec<_>>(), [1, 1, 5, 1]);
        let xs = Tensor::<TestBackend, 4>::from_data(data, &device);

        // Three extra rows: two come off the low side, one off the high side.
        let cropped = pad_to_match(xs, 2, 1);
        assert_eq!(cropped.to_data().to_vec::<f32>().unwrap(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_up_restores_skip_resolution_bilinear() {
        let device = Default::default();
        let up = Up::<TestBackend>::new(16, 4, UpsampleMode::Bilinear, &device);

        let coarse = Tensor::random([2, 8, 4, 4], Distribution::Default, &device);
        let skip = Tensor::random([2, 8, 8, 8], Distribution::Default, &device);
        assert_eq!(up.forward(coarse, skip).dims(), [2, 4, 8, 8]);
    }

    #[test]
    fn test_up_pads_odd_skip_transposed() {
        let device = Default::default();
        let up = Up::<TestBackend>::new(16, 8, UpsampleMode::Transposed, &device);

        let coarse = Tensor::random([1, 16, 3, 4], Distribution::Default, &device);
        let skip = Tensor::random([1, 8, 7, 9], Distribution::Default, &device);
        assert_eq!(up.forward(coarse, skip).dims(), [1, 8, 7, 9]);
    }

    #[test]
    fn test_bilinear_upsample_doubles_without_parameters() {
        let device = Default::default();
        let up = Upsample::<TestBackend>::new(6, UpsampleMode::Bilinear, &device);
        assert_eq!(up.num_params(), 0);

        let xs = Tensor::random([1, 6, 5, 3], Distribution::Default, &device);
        assert_eq!(up.forward(xs).dims(), [1, 6, 10, 6]);
    }

    #[test]
    fn test_bilinear_upsample_aligns_corners() {
        let device = Default::default();
        let up = Upsample::<TestBackend>::new(1, UpsampleMode::Bilinear, &device);

        let xs = Tensor::<TestBackend, 4>::from_data(TensorData::new(vec![0.0f32, 1.0], [1, 1, 1, 2]), &device);
        let ys = up.forward(xs);
        assert_eq!(ys.dims(), [1, 1, 2, 4]);

        // End samples land exactly on the input corners.
        let expected = [0.0, 1.0 / 3.0, 2.0 / 3.0, 1.0];
        for (row, values) in ys.to_data().to_vec::<f32>().unwrap().chunks(4).enumerate() {
            for (got, want) in values.iter().zip(expected) {
                assert!((got - want).abs() < 1e-6, "row {}: {:?}", row, values);
            }
        }
    }

    #[test]
    fn test_out_conv_is_affine() {
        let device = Default::default();
        let out = OutConv::<TestBackend>::new(6, 3, &device);

        let t1 = Tensor::random([1, 6, 5, 5], Distribution::Default, &device);
        let t2 = Tensor::random([1, 6, 5, 5], Distribution::Default, &device);
        let (a, b) = (0.25, 0.75);

        // The bias survives any combination whose weights sum to one.
        let mixed = out.forward(t1.clone().mul_scalar(a) + t2.clone().mul_scalar(b));
        let split = out.forward(t1).mul_scalar(a) + out.forward(t2).mul_scalar(b);
        assert!(max_abs_diff(mixed, split) < 1e-5);
    }

    #[test]
    fn test_out_conv_is_linear_without_bias_term() {
        let device = Default::default();
        let out = OutConv::<TestBackend>::new(4, 2, &device);
        let zero = out.forward(Tensor::zeros([1, 4, 3, 3], &device));

        let t1 = Tensor::random([1, 4, 3, 3], Distribution::Default, &device);
        let t2 = Tensor::random([1, 4, 3, 3], Distribution::Default, &device);
        let (a, b) = (2.0, -3.0);

        let lhs = out.forward(t1.clone().mul_scalar(a) + t2.clone().mul_scalar(b)) - zero.clone();
        let rhs = (out.forward(t1) - zero.clone()).mul_scalar(a)
            + (out.forward(t2) - zero).mul_scalar(b);
        assert!(max_abs_diff(lhs, rhs) < 1e-4);
    }
}
