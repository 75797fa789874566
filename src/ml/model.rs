use anyhow::{ensure, Result};
use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

/// Deepest supported U-Net: sides must then be multiples of 2^15.
pub const MAX_DEPTH: usize = 15;

/// Anything that maps an image batch [N, C, H, W] to per-pixel logits
/// [N, 1, H, W]. Sigmoid is applied by the caller.
pub trait SegmentationModel<B: Backend> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4>;
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct UNetConfig {
    #[config(default = 1)]
    pub in_channels: usize,
    #[config(default = 1)]
    pub out_channels: usize,
    /// Channels of the first encoder level; doubled at every level below.
    #[config(default = 64)]
    pub base_channels: usize,
    /// Number of 2x down-sampling steps.
    #[config(default = 4)]
    pub depth: usize,
}

impl UNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> UNet<B> {
        let width = |level: usize| self.base_channels << level;

        let down: Vec<DoubleConv<B>> = (0..self.depth)
            .map(|level| {
                let in_ch = if level == 0 { self.in_channels } else { width(level - 1) };
                DoubleConv::new(in_ch, width(level), device)
            })
            .collect();

        let bottleneck_in = if self.depth == 0 { self.in_channels } else { width(self.depth - 1) };
        let bottleneck = DoubleConv::new(bottleneck_in, width(self.depth), device);

        // Decoder runs deepest level first.
        let up: Vec<ConvTranspose2d<B>> = (0..self.depth)
            .rev()
            .map(|level| {
                ConvTranspose2dConfig::new([width(level + 1), width(level)], [2, 2])
                    .with_stride([2, 2])
                    .init(device)
            })
            .collect();
        let up_conv: Vec<DoubleConv<B>> = (0..self.depth)
            .rev()
            .map(|level| DoubleConv::new(2 * width(level), width(level), device))
            .collect();

        let head = Conv2dConfig::new([width(0), self.out_channels], [1, 1]).init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        UNet { down, pool, bottleneck, up, up_conv, head }
    }

    /// Spatial sides must survive `depth` halvings without remainder.
    pub fn check_input(&self, width: u32, height: u32) -> Result<()> {
        ensure!(
            self.depth <= MAX_DEPTH,
            "U-Net depth {} exceeds the maximum of {}",
            self.depth,
            MAX_DEPTH
        );
        let factor = 1u32 << self.depth;
        ensure!(
            width > 0 && height > 0 && width % factor == 0 && height % factor == 0,
            "slice size {}x{} must be a non-zero multiple of {} for a depth-{} U-Net",
            width,
            height,
            factor,
            self.depth
        );
        Ok(())
    }
}

/// Two 3x3 same-padded convolutions, each followed by ReLU.
#[derive(Module, Debug)]
pub struct DoubleConv<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
}

impl<B: Backend> DoubleConv<B> {
    fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = |i, o| {
            Conv2dConfig::new([i, o], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device)
        };
        Self {
            conv1: conv(in_channels, out_channels),
            conv2: conv(out_channels, out_channels),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.conv1.forward(x));
        relu(self.conv2.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct UNet<B: Backend> {
    pub down:       Vec<DoubleConv<B>>,
    pub pool:       MaxPool2d,
    pub bottleneck: DoubleConv<B>,
    pub up:         Vec<ConvTranspose2d<B>>,
    pub up_conv:    Vec<DoubleConv<B>>,
    pub head:       Conv2d<B>,
}

impl<B: Backend> UNet<B> {
    /// images: [batch, in_channels, H, W] → logits: [batch, out_channels, H, W]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut skips = Vec::with_capacity(self.down.len());
        let mut x = images;
        for block in &self.down {
            x = block.forward(x);
            skips.push(x.clone());
            x = self.pool.forward(x);
        }

        x = self.bottleneck.forward(x);

        for ((up, conv), skip) in self.up.iter().zip(&self.up_conv).zip(skips.into_iter().rev()) {
            x = up.forward(x);
            x = Tensor::cat(vec![x, skip], 1);
            x = conv.forward(x);
        }

        self.head.forward(x)
    }
}

impl<B: Backend> SegmentationModel<B> for UNet<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        UNet::forward(self, images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_forward_preserves_spatial_shape() {
        let device = Default::default();
        let model: UNet<TestBackend> = UNetConfig::new()
            .with_base_channels(2)
            .with_depth(2)
            .init(&device);

        let images = Tensor::<TestBackend, 4>::zeros([3, 1, 8, 12], &device);
        let logits = SegmentationModel::forward(&model, images);
        assert_eq!(logits.dims(), [3, 1, 8, 12]);
    }

    #[test]
    fn test_level_count_follows_depth() {
        let device = Default::default();
        let model: UNet<TestBackend> = UNetConfig::new()
            .with_base_channels(2)
            .with_depth(3)
            .init(&device);
        assert_eq!(model.down.len(), 3);
        assert_eq!(model.up.len(), 3);
        assert_eq!(model.up_conv.len(), 3);
    }

    #[test]
    fn test_check_input_requires_divisible_sides() {
        let cfg = UNetConfig::new().with_depth(4);
        assert!(cfg.check_input(256, 256).is_ok());
        assert!(cfg.check_input(250, 256).is_err());
        assert!(cfg.check_input(0, 0).is_err());
    }

    #[test]
    fn test_check_input_rejects_excessive_depth() {
        let err = UNetConfig::new().with_depth(40).check_input(256, 256).unwrap_err();
        assert!(err.to_string().contains("exceeds the maximum"));
        assert!(UNetConfig::new().with_depth(MAX_DEPTH).check_input(1 << 15, 1 << 15).is_ok());
    }
}
