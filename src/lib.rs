pub mod activation;
pub mod common;
pub mod config;
pub mod cross_embed;
pub mod discriminator;
pub mod resnet_block;
pub mod score;

pub use discriminator::{Discriminator, DiscriminatorInit};
