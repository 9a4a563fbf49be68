//! U-Net Assembly Example
//!
//! Assembles a U-Net from a backbone identifier, runs it on a random batch and
//! optionally saves the model record and its configuration.
//!
//! ## Usage
//!
//! ```bash
//! # Default U-Net (vgg16 encoder, 1 class, sigmoid)
//! cargo run --bin assemble
//!
//! # ResNet34 encoder, 3 classes, transpose decoder, frozen encoder
//! cargo run --bin assemble -- --backbone resnet34 --classes 3 --activation softmax \
//!     --decoder-block-type transpose --encoder-freeze
//!
//! # Arguments from a JSON file (deprecated names such as `freeze_encoder` are accepted)
//! cargo run --bin assemble -- --config unet.json --show-graph --output artifacts/unet
//! ```
//!
//! Set `RUST_LOG=debug` to see the resolved skip connections.

use std::{fs, time::Instant};

use anyhow::{anyhow, Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::Distribution,
};
use clap::Parser;
use log::info;
use unet_burn::Encoder;
use unet_demos::{backend_name, create_device, AssembleArgs, SelectedBackend};

fn main() -> Result<()> {
    env_logger::init();

    let args = AssembleArgs::parse();
    let config = args.to_config()?;
    let device = create_device();

    let model = config
        .init::<SelectedBackend>(&device)
        .with_context(|| format!("failed to assemble U-Net on {}", config.backbone_name))?;

    println!("Model: {} on {}", model.name(), backend_name());
    println!("Parameters: {}", model.num_params());
    println!(
        "Decoder: {} {} blocks, filters {:?}",
        model.num_decoder_blocks(),
        config.decoder_block_type.as_str(),
        config.decoder_filters
    );

    let graph = model.encoder().layer_graph();
    for (stage, &index) in model.skip_indices().iter().enumerate() {
        if let Some(layer) = graph.get(index) {
            println!(
                "Skip {stage}: {} (#{index}, {} channels, /{})",
                layer.name, layer.channels, layer.reduction
            );
        }
    }
    if args.show_graph {
        println!("{graph}");
    } else {
        info!("Encoder nodes: {}", graph.names().collect::<Vec<_>>().join(", "));
    }

    let [height, width] = config.input_size.unwrap_or(unet_demos::DEFAULT_INPUT_SIZE);
    let input = Tensor::<SelectedBackend, 4>::random(
        [args.batch_size, config.input_channels, height, width],
        Distribution::Normal(0.0, 1.0),
        &device,
    );

    let start = Instant::now();
    let output = model.forward(input).context("forward pass failed")?;
    println!(
        "Output shape: {:?} ({} activation, {:.2?})",
        output.dims(),
        config.activation.as_str(),
        start.elapsed()
    );

    if let Some(path) = &args.output {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let config_path = path.with_extension("json");
        config
            .save(&config_path)
            .with_context(|| format!("failed to save {}", config_path.display()))?;
        model
            .save_file(
                path.clone(),
                &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
            )
            .map_err(|e| anyhow!("failed to save model to {}: {e:?}", path.display()))?;
        println!("Saved model to {}", path.with_extension("mpk").display());
    }

    Ok(())
}
