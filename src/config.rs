use crate::{common::*, discriminator::DiscriminatorInit};
use std::num::NonZeroUsize;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: DiscriminatorInit,
    pub image_size: NonZeroUsize,
    pub batch_size: NonZeroUsize,
    pub device: DeviceKind,
}

const DEFAULT_IMAGE_SIZE: NonZeroUsize = match NonZeroUsize::new(256) {
    Some(size) => size,
    None => panic!("image size must be non-zero"),
};

const DEFAULT_BATCH_SIZE: NonZeroUsize = match NonZeroUsize::new(16) {
    Some(size) => size,
    None => panic!("batch size must be non-zero"),
};

impl Default for Config {
    fn default() -> Self {
        Self {
            model: DiscriminatorInit::default(),
            image_size: DEFAULT_IMAGE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            device: DeviceKind::Auto,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        Self::from_json5(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_json5(text: &str) -> Result<Self> {
        let config: Self = json5::from_str(text)?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Auto,
    Cpu,
    Cuda(usize),
}

impl DeviceKind {
    pub fn device(self) -> Device {
        match self {
            Self::Auto => Device::cuda_if_available(),
            Self::Cpu => Device::Cpu,
            Self::Cuda(index) => Device::Cuda(index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_test() -> Result<()> {
        let config = Config::from_json5("{}")?;
        ensure!(config.model == DiscriminatorInit::default());
        ensure!(config.image_size.get() == 256);
        ensure!(config.batch_size.get() == 16);
        ensure!(config.device == DeviceKind::Auto);
        Ok(())
    }

    #[test]
    fn partial_config_test() -> Result<()> {
        let config = Config::from_json5(
            r#"{
                // comments are allowed in json5
                model: { dims: [32, 64, 64], groups: 4 },
                image_size: 64,
                device: { cuda: 1 },
            }"#,
        )?;
        ensure!(config.model.dims == vec![32, 64, 64]);
        ensure!(config.model.groups == 4);
        ensure!(config.model.channels == 3);
        ensure!(config.model.cross_embed_kernel_sizes == vec![3, 7, 15]);
        ensure!(config.image_size.get() == 64);
        ensure!(config.device == DeviceKind::Cuda(1));
        ensure!(config.device.device() == Device::Cuda(1));
        Ok(())
    }

    #[test]
    fn invalid_config_test() {
        assert!(Config::from_json5("{ batch_size: 0 }").is_err());
        assert!(Config::from_json5(r#"{ device: "tpu" }"#).is_err());
        assert!(Config::load("/nonexistent/patchgan.json5").is_err());
    }
}
