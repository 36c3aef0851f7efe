use crate::common::*;

/// Multi-scale stem: parallel convolutions with different kernel sizes whose
/// outputs are stacked along the channel axis.
#[derive(Debug, Clone)]
pub struct CrossEmbedInit {
    pub kernel_sizes: Vec<usize>,
    pub stride: usize,
}

impl CrossEmbedInit {
    pub fn build<'a>(
        self,
        path: impl Borrow<nn::Path<'a>>,
        dim_in: usize,
        dim_out: Option<usize>,
    ) -> Result<CrossEmbed> {
        let path = path.borrow();
        let Self {
            mut kernel_sizes,
            stride,
        } = self;
        let dim_out = dim_out.unwrap_or(dim_in);

        ensure!(stride > 0, "stride must be positive");
        ensure!(!kernel_sizes.is_empty(), "at least one kernel size is required");
        ensure!(
            kernel_sizes.iter().all(|&k| k % 2 == stride % 2),
            "kernel sizes {:?} must share the parity of stride = {}",
            kernel_sizes,
            stride
        );
        ensure!(
            kernel_sizes.iter().all(|&k| k >= stride),
            "kernel sizes {:?} must not be smaller than stride = {}",
            kernel_sizes,
            stride
        );

        kernel_sizes.sort_unstable();
        let dim_scales = split_channels(dim_out, kernel_sizes.len())?;

        let convs: Vec<_> = kernel_sizes
            .iter()
            .zip(&dim_scales)
            .enumerate()
            .map(|(index, (&ksize, &dim_scale))| {
                nn::conv2d(
                    path / format!("conv_{}", index),
                    dim_in as i64,
                    dim_scale as i64,
                    ksize as i64,
                    nn::ConvConfig {
                        stride: stride as i64,
                        padding: ((ksize - stride) / 2) as i64,
                        ..Default::default()
                    },
                )
            })
            .collect();

        Ok(CrossEmbed {
            kernel_sizes,
            dim_scales,
            stride,
            convs,
        })
    }
}

/// Halve the width per scale; the last scale takes the remainder.
fn split_channels(dim_out: usize, num_scales: usize) -> Result<Vec<usize>> {
    let mut dim_scales: Vec<usize> = (1..num_scales)
        .map(|i| dim_out.checked_shr(i as u32).unwrap_or(0))
        .collect();
    let used: usize = dim_scales.iter().sum();
    dim_scales.push(dim_out - used);

    ensure!(
        dim_scales.iter().all(|&d| d > 0),
        "cannot split {} output channels into {} scales, get {:?}",
        dim_out,
        num_scales,
        dim_scales
    );
    Ok(dim_scales)
}

#[derive(Debug)]
pub struct CrossEmbed {
    kernel_sizes: Vec<usize>,
    dim_scales: Vec<usize>,
    stride: usize,
    convs: Vec<nn::Conv2D>,
}

impl CrossEmbed {
    pub fn kernel_sizes(&self) -> &[usize] {
        &self.kernel_sizes
    }

    pub fn dim_scales(&self) -> &[usize] {
        &self.dim_scales
    }

    pub fn dim_out(&self) -> usize {
        self.dim_scales.iter().sum()
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Spatial output size. All branches agree because padding is
    /// `(k - stride) / 2` and every kernel shares the stride's parity.
    pub fn output_size(&self, height: i64, width: i64) -> (i64, i64) {
        let stride = self.stride as i64;
        let ksize = self.kernel_sizes[0] as i64;
        let padding = (ksize - stride) / 2;
        let out = |size: i64| (size + 2 * padding - ksize).div_euclid(stride) + 1;
        (out(height), out(width))
    }
}

impl nn::Module for CrossEmbed {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let fmaps: Vec<_> = self.convs.iter().map(|conv| xs.apply(conv)).collect();
        Tensor::cat(&fmaps, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_channels_test() -> Result<()> {
        ensure!(split_channels(64, 3)? == vec![32, 16, 16]);
        ensure!(split_channels(100, 4)? == vec![50, 25, 12, 13]);
        ensure!(split_channels(7, 1)? == vec![7]);
        ensure!(split_channels(2, 3).is_err());
        ensure!(split_channels(1 << 20, 70).is_err());
        Ok(())
    }

    #[test]
    fn cross_embed_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();

        let layer = CrossEmbedInit {
            kernel_sizes: vec![15, 3, 7],
            stride: 1,
        }
        .build(&root / "stem", 3, Some(20))?;

        ensure!(layer.kernel_sizes() == [3, 7, 15]);
        ensure!(layer.dim_scales() == [10, 5, 5]);
        ensure!(layer.dim_out() == 20);

        let input = Tensor::rand([2, 3, 17, 9], FLOAT_CPU);
        let output = layer.forward(&input);
        ensure!(output.size() == vec![2, 20, 17, 9], "incorrect output shape");
        ensure!(layer.output_size(17, 9) == (17, 9));

        Ok(())
    }

    #[test]
    fn cross_embed_stride_2_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();

        let layer = CrossEmbedInit {
            kernel_sizes: vec![2, 4, 8],
            stride: 2,
        }
        .build(&root / "stem", 4, None)?;
        ensure!(layer.dim_scales() == [2, 1, 1]);

        let input = Tensor::rand([1, 4, 16, 11], FLOAT_CPU);
        let output = layer.forward(&input);
        let (h, w) = layer.output_size(16, 11);
        ensure!(output.size() == vec![1, 4, h, w], "incorrect output shape");
        ensure!((h, w) == (8, 5));

        Ok(())
    }

    #[test]
    fn cross_embed_parity_test() {
        let vs = nn::VarStore::new(Device::Cpu);
        let root = vs.root();

        let result = CrossEmbedInit {
            kernel_sizes: vec![3, 4],
            stride: 1,
        }
        .build(&root / "stem", 3, Some(16));
        assert!(result.is_err());

        let result = CrossEmbedInit {
            kernel_sizes: vec![],
            stride: 1,
        }
        .build(&root / "empty", 3, Some(16));
        assert!(result.is_err());

        let result = CrossEmbedInit {
            kernel_sizes: vec![1, 3],
            stride: 3,
        }
        .build(&root / "narrow", 3, Some(16));
        assert!(result.is_err());
    }
}
