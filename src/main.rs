use std::env;

use clap::{Parser, Subcommand};
use patchgan_disc::{
    common::*,
    config::Config,
    score::{load_images, load_weights, score_images},
};
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(version, about = "PatchGAN discriminator via Rust.", long_about = None)]
struct Args {
    /// json5 config file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print layer shapes and the parameter count.
    Summary,
    /// Save freshly initialized weights.
    Init {
        #[arg(short, long, default_value = "d_weights.pth")]
        output: PathBuf,
    },
    /// Score every image in a directory by its mean patch logit.
    Score {
        #[arg(short, long)]
        dataset: PathBuf,
        #[arg(short, long)]
        weights: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let Args { config, command } = Args::parse();

    setup_tracing();
    print_oss_license();

    let config = match config {
        Some(path) => {
            let config = Config::load(&path)?;
            info!("Loaded: {}", path.display());
            config
        }
        None => Config::default(),
    };
    let Config {
        model,
        image_size,
        batch_size,
        device,
    } = config;

    let device = device.device();
    info!("Use Device: {device:?}");

    // Build Discriminator
    let mut vs = nn::VarStore::new(device);
    let discriminator = model.build(vs.root())?;
    info!(
        "Dims: {:?}, Stem Kernels: {:?}, Stem Channels: {:?}",
        discriminator.dims(),
        discriminator.stem().kernel_sizes(),
        discriminator.stem().dim_scales()
    );

    match command {
        Command::Summary => {
            let size = image_size.get() as i64;
            let channels = discriminator.input_channels() as i64;
            let input = Tensor::rand([1, channels, size, size], (Kind::Float, device));
            let (logits, features) = tch::no_grad(|| discriminator.forward_features(&input))?;

            for (index, xs) in features.iter().enumerate() {
                info!("feature {}: {:?}", index, xs.size());
            }
            info!("logits: {:?}", logits.size());

            let num_params: usize = vs.trainable_variables().iter().map(|t| t.numel()).sum();
            info!("Trainable Parameters: {}", num_params);
        }
        Command::Init { output } => {
            vs.save(&output)?;
            info!("Saved: {}", output.display());
        }
        Command::Score { dataset, weights } => {
            load_weights(&mut vs, weights.as_deref())?;
            vs.freeze();

            info!("Loading Dataset...");
            let images = load_images(&dataset, image_size.get())?;
            info!("Loaded Dataset: {:?}", images.size());

            let scores = score_images(&discriminator, &images, batch_size.get(), device)?;
            for (index, score) in scores.iter().enumerate() {
                println!("{}\t{:.6}", index, score);
            }
            let mean = scores.iter().sum::<f64>() / scores.len() as f64;
            info!("Mean Score: {:.6}", mean);
        }
    }

    Ok(())
}

fn setup_tracing() {
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true).compact();
    let filter_layer = {
        let filter = EnvFilter::from_default_env();
        if env::var("RUST_LOG").is_err() {
            filter.add_directive(LevelFilter::INFO.into())
        } else {
            filter
        }
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}

fn print_oss_license() {
    println!("OSS Library: PyTorch");
    println!("URL: https://github.com/pytorch/pytorch");
    println!("License: 3-Clause BSD License");
    println!();
    println!("OSS Library: tch-rs");
    println!("URL: https://github.com/LaurentMazare/tch-rs");
    println!("License: MIT OR Apache-2.0");
    println!();
    println!("OSS Library: anyhow");
    println!("URL: https://github.com/dtolnay/anyhow");
    println!("License: MIT OR Apache-2.0");
    println!();
    println!("OSS Library: clap");
    println!("URL: https://github.com/clap-rs/clap");
    println!("License: MIT OR Apache-2.0");
    println!();
    println!("OSS Library: tracing");
    println!("URL: https://github.com/tokio-rs/tracing");
    println!("License: MIT License");
    println!();
    println!("OSS Library: tracing-subscriber");
    println!("URL: https://github.com/tokio-rs/tracing");
    println!("License: MIT License");
    println!();
    println!("OSS Library: serde");
    println!("URL: https://github.com/serde-rs/serde");
    println!("License: MIT OR Apache-2.0");
    println!();
    println!("OSS Library: json5");
    println!("URL: https://github.com/callum-oakley/json5-rs");
    println!("License: ISC License");
    println!();
    println!("OSS Library: tqdm");
    println!("URL: https://github.com/mrlazy1708/tqdm");
    println!("License: MIT OR Apache-2.0");
    println!("--------");
    println!();
}
