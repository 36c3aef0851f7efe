use crate::{common::*, discriminator::Discriminator};
use tqdm::tqdm;

/// Scale `u8` pixels from `[0, 255]` to `[-1, 1]`.
pub fn normalize_images(images: &Tensor) -> Tensor {
    images.to_kind(Kind::Float) / 127.5 - 1.0
}

/// Load every image under `dir`, resized to `image_size` x `image_size`.
pub fn load_images(dir: impl AsRef<Path>, image_size: usize) -> Result<Tensor> {
    let dir = dir.as_ref();
    ensure!(dir.is_dir(), "dataset directory {} does not exist", dir.display());

    let size = image_size as i64;
    let images = tch::vision::image::load_dir(dir, size, size)
        .with_context(|| format!("unable to load images from {}", dir.display()))?;
    ensure!(
        images.size().first().copied().unwrap_or(0) > 0,
        "no images found in {}",
        dir.display()
    );
    Ok(images)
}

/// Load saved weights into `vs`. Nothing happens when `path` is `None`.
pub fn load_weights(vs: &mut nn::VarStore, path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => return Ok(()),
    };
    ensure!(
        path.is_file(),
        "weights file {} does not exist",
        path.display()
    );
    vs.load(path)
        .with_context(|| format!("unable to load weights from {}", path.display()))?;
    info!("Loaded: {}", path.display());
    Ok(())
}

/// Mean patch logit of each image, computed batch by batch without gradients.
pub fn score_images(
    discriminator: &Discriminator,
    images: &Tensor,
    batch_size: usize,
    device: Device,
) -> Result<Vec<f64>> {
    ensure!(batch_size > 0, "batch size must be positive");
    let (num_images, _, height, width) = images.size4()?;
    let (grid_h, grid_w) = discriminator.logit_size(height, width)?;
    debug!(
        "scoring {} images of {}x{} on a {}x{} logit grid",
        num_images, height, width, grid_h, grid_w
    );

    let batch_size = batch_size as i64;
    let num_batches = (num_images + batch_size - 1) / batch_size;
    let mut scores = Vec::with_capacity(num_images as usize);

    for index in tqdm(0..num_batches) {
        let start = index * batch_size;
        let len = batch_size.min(num_images - start);
        let batch = normalize_images(&images.narrow(0, start, len)).to_device(device);

        let logits = tch::no_grad(|| discriminator.try_forward(&batch))?;
        let means = logits
            .mean_dim(&[1i64, 2, 3][..], false, Kind::Float)
            .to_kind(Kind::Double)
            .to_device(Device::Cpu);
        scores.extend(Vec::<f64>::try_from(&means)?);
    }

    Ok(scores)
}
