use crate::{
    activation::{leaky_relu, LEAKY_SLOPE},
    common::*,
};

pub const DEFAULT_GROUPS: usize = 8;

/// Group norm over `channels`, rejecting widths that do not split into `groups`.
pub fn group_norm<'a>(
    path: impl Borrow<nn::Path<'a>>,
    groups: usize,
    channels: usize,
) -> Result<nn::GroupNorm> {
    ensure!(groups > 0, "groups must be positive");
    ensure!(
        channels % groups == 0,
        "{} channels cannot be divided into {} groups",
        channels,
        groups
    );
    Ok(nn::group_norm(
        path,
        groups as i64,
        channels as i64,
        Default::default(),
    ))
}

/// Pre-activation conv unit: group norm, leaky ReLU, then a 3x3 convolution.
#[derive(Debug)]
pub struct Block {
    norm: nn::GroupNorm,
    project: nn::Conv2D,
}

impl Block {
    pub fn new<'a>(
        path: impl Borrow<nn::Path<'a>>,
        dim: usize,
        dim_out: usize,
        groups: usize,
    ) -> Result<Self> {
        let path = path.borrow();
        let norm = group_norm(path / "groupnorm", groups, dim)?;
        let project = nn::conv2d(
            path / "project",
            dim as i64,
            dim_out as i64,
            3,
            nn::ConvConfig {
                padding: 1,
                ..Default::default()
            },
        );
        Ok(Self { norm, project })
    }
}

impl nn::Module for Block {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let xs = xs.apply(&self.norm);
        leaky_relu(&xs, LEAKY_SLOPE).apply(&self.project)
    }
}

#[derive(Debug)]
pub enum Shortcut {
    Identity,
    Project(nn::Conv2D),
}

impl nn::Module for Shortcut {
    fn forward(&self, xs: &Tensor) -> Tensor {
        match self {
            Self::Identity => xs.shallow_clone(),
            Self::Project(conv) => xs.apply(conv),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResnetBlockInit {
    pub dim_out: Option<usize>,
    pub groups: usize,
}

impl Default for ResnetBlockInit {
    fn default() -> Self {
        Self {
            dim_out: None,
            groups: DEFAULT_GROUPS,
        }
    }
}

impl ResnetBlockInit {
    pub fn build<'a>(self, path: impl Borrow<nn::Path<'a>>, dim: usize) -> Result<ResnetBlock> {
        let path = path.borrow();
        let Self { dim_out, groups } = self;
        let dim_out = dim_out.unwrap_or(dim);

        let block = Block::new(path / "block", dim, dim_out, groups)?;
        let shortcut = if dim == dim_out {
            Shortcut::Identity
        } else {
            Shortcut::Project(nn::conv2d(
                path / "res_conv",
                dim as i64,
                dim_out as i64,
                1,
                Default::default(),
            ))
        };

        Ok(ResnetBlock { block, shortcut })
    }
}

#[derive(Debug)]
pub struct ResnetBlock {
    block: Block,
    shortcut: Shortcut,
}

impl ResnetBlock {
    pub fn has_projection(&self) -> bool {
        matches!(self.shortcut, Shortcut::Project(_))
    }
}

impl nn::Module for ResnetBlock {
    fn forward(&self, xs: &Tensor) -> Tensor {
        self.block.forward(xs) + self.shortcut.forward(xs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resnet_block_identity_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();

        let block = ResnetBlockInit::default().build(&root / "res", 16)?;
        ensure!(!block.has_projection());

        let input = Tensor::rand([2, 16, 7, 5], FLOAT_CPU);
        let output = block.forward(&input);
        ensure!(output.size() == vec![2, 16, 7, 5], "incorrect output shape");

        Ok(())
    }

    #[test]
    fn resnet_block_projection_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();

        let block = ResnetBlockInit {
            dim_out: Some(24),
            groups: 4,
        }
        .build(&root / "res", 8)?;
        ensure!(block.has_projection());

        let input = Tensor::rand([1, 8, 6, 6], FLOAT_CPU);
        let output = block.forward(&input);
        ensure!(output.size() == vec![1, 24, 6, 6], "incorrect output shape");

        Ok(())
    }

    #[test]
    fn residual_path_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();
        let block = ResnetBlockInit::default().build(&root / "res", 8)?;

        // zero the conv so only the shortcut remains
        tch::no_grad(|| {
            for (name, mut var) in vs.variables() {
                if name.contains("project") {
                    let _ = var.zero_();
                }
            }
        });

        let input = Tensor::rand([1, 8, 4, 4], FLOAT_CPU);
        let output = block.forward(&input);
        let diff = (output - &input).abs().max().double_value(&[]);
        ensure!(diff < 1e-6, "residual output differs from input by {}", diff);

        Ok(())
    }

    #[test]
    fn indivisible_groups_test() {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();
        let result = ResnetBlockInit::default().build(&root / "res", 12);
        assert!(result.is_err());
    }
}
