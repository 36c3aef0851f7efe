use crate::{
    activation::{leaky_relu, LEAKY_SLOPE},
    common::*,
    cross_embed::{CrossEmbed, CrossEmbedInit},
    resnet_block::{group_norm, ResnetBlock, ResnetBlockInit, DEFAULT_GROUPS},
};

const HEAD_KSIZE: i64 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscriminatorInit {
    pub dims: Vec<usize>,
    pub channels: usize,
    pub groups: usize,
    pub cross_embed_kernel_sizes: Vec<usize>,
}

impl Default for DiscriminatorInit {
    fn default() -> Self {
        Self {
            dims: vec![64, 128, 256, 512, 512, 512],
            channels: 3,
            groups: DEFAULT_GROUPS,
            cross_embed_kernel_sizes: vec![3, 7, 15],
        }
    }
}

impl DiscriminatorInit {
    pub fn build<'a>(self, path: impl Borrow<nn::Path<'a>>) -> Result<Discriminator> {
        let path = path.borrow();
        let Self {
            dims,
            channels,
            groups,
            cross_embed_kernel_sizes,
        } = self;

        ensure!(
            dims.len() >= 2,
            "at least two dims are required, but get {:?}",
            dims
        );
        ensure!(channels > 0, "input channels must be positive");
        let (init_dim, final_dim) = (dims[0], dims[dims.len() - 1]);

        let stem = CrossEmbedInit {
            kernel_sizes: cross_embed_kernel_sizes,
            stride: 1,
        }
        .build(path / "stem", channels, Some(init_dim))
        .context("invalid cross embed stem")?;

        let stages: Vec<_> = dims
            .windows(2)
            .enumerate()
            .map(|(index, pair)| -> Result<_> {
                let (dim_in, dim_out) = (pair[0], pair[1]);
                let path = path / format!("stage_{}", index);

                let down = nn::conv2d(
                    &path / "down",
                    dim_in as i64,
                    dim_out as i64,
                    4,
                    nn::ConvConfig {
                        stride: 2,
                        padding: 1,
                        ..Default::default()
                    },
                );
                let norm = group_norm(&path / "norm", groups, dim_out)?;
                let resnet = ResnetBlockInit {
                    dim_out: Some(dim_out),
                    ..Default::default()
                }
                .build(&path / "resnet", dim_out)?;

                Ok(Stage { down, norm, resnet })
            })
            .collect::<Result<_>>()
            .context("invalid downsampling stage")?;

        let final_dim = final_dim as i64;
        let head_proj = nn::conv2d(
            path / "head_proj",
            final_dim,
            final_dim,
            1,
            Default::default(),
        );
        let head_out = nn::conv2d(
            path / "head_out",
            final_dim,
            1,
            HEAD_KSIZE,
            Default::default(),
        );

        Ok(Discriminator {
            dims,
            channels,
            stem,
            stages,
            head_proj,
            head_out,
        })
    }
}

/// Strided conv, leaky ReLU, group norm, then a residual block.
#[derive(Debug)]
struct Stage {
    down: nn::Conv2D,
    norm: nn::GroupNorm,
    resnet: ResnetBlock,
}

impl nn::Module for Stage {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let xs = xs.apply(&self.down);
        leaky_relu(&xs, LEAKY_SLOPE)
            .apply(&self.norm)
            .apply(&self.resnet)
    }
}

/// PatchGAN discriminator mapping `[N, C, H, W]` images to a `[N, 1, H', W']`
/// grid of real/fake logits.
#[derive(Debug)]
pub struct Discriminator {
    dims: Vec<usize>,
    channels: usize,
    stem: CrossEmbed,
    stages: Vec<Stage>,
    head_proj: nn::Conv2D,
    head_out: nn::Conv2D,
}

impl Discriminator {
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn input_channels(&self) -> usize {
        self.channels
    }

    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn stem(&self) -> &CrossEmbed {
        &self.stem
    }

    /// Spatial size of the logit grid for an input of `height` x `width`.
    pub fn logit_size(&self, height: i64, width: i64) -> Result<(i64, i64)> {
        ensure!(
            height > 0 && width > 0,
            "invalid input size {}x{}",
            height,
            width
        );
        let (h, w) = self.stem.output_size(height, width);
        let (h, w) = (0..self.stages.len()).fold((h, w), |(h, w), _| (h / 2, w / 2));
        ensure!(
            h >= HEAD_KSIZE && w >= HEAD_KSIZE,
            "input size {}x{} shrinks to {}x{} after {} stages, smaller than the {}x{} logit kernel",
            height,
            width,
            h,
            w,
            self.stages.len(),
            HEAD_KSIZE,
            HEAD_KSIZE
        );
        Ok((h - HEAD_KSIZE + 1, w - HEAD_KSIZE + 1))
    }

    /// Forward pass with input shape checks.
    pub fn try_forward(&self, input: &Tensor) -> Result<Tensor> {
        self.check_input(input)?;
        Ok(self.forward(input))
    }

    /// Returns the logits together with the stem output and every stage output.
    pub fn forward_features(&self, input: &Tensor) -> Result<(Tensor, Vec<Tensor>)> {
        self.check_input(input)?;

        let mut xs = leaky_relu(&input.apply(&self.stem), LEAKY_SLOPE);
        let mut features = Vec::with_capacity(self.stages.len() + 1);
        for stage in &self.stages {
            let next = xs.apply(stage);
            features.push(xs);
            xs = next;
        }
        let logits = self.head(&xs);
        features.push(xs);

        Ok((logits, features))
    }

    fn head(&self, xs: &Tensor) -> Tensor {
        let xs = xs.apply(&self.head_proj);
        leaky_relu(&xs, LEAKY_SLOPE).apply(&self.head_out)
    }

    fn check_input(&self, input: &Tensor) -> Result<()> {
        let (_, c, h, w) = input
            .size4()
            .with_context(|| format!("expect a 4-D input, but get {:?}", input.size()))?;
        ensure!(
            c == self.channels as i64,
            "expect {} input channels, but get {}",
            self.channels,
            c
        );
        self.logit_size(h, w)?;
        Ok(())
    }
}

impl nn::Module for Discriminator {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let xs = leaky_relu(&xs.apply(&self.stem), LEAKY_SLOPE);
        let xs = self
            .stages
            .iter()
            .fold(xs, |xs, stage| xs.apply(stage));
        self.head(&xs)
    }
}
