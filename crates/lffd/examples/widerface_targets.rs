//! Prints per-head target statistics for WIDER FACE ground truth.
//!
//! Usage: `cargo run --example widerface_targets -- <widerface root> [train|val]`
//!
//! Images are not resized. Feature maps are sized per batch so that they cover the largest face
//! extent in the batch.

use std::env;

use anyhow::{bail, Context};
use lffd::{
    widerface::{self, Phase},
    ArchConfig, Lffd,
};

/// WIDER FACE images are 1024 pixels wide, heights vary.
const MIN_INPUT_SIZE: usize = 1024;
const BATCH_SIZE: usize = 16;
const MIN_FACE_SIZE: f32 = 1.0;

fn main() -> anyhow::Result<()> {
    lffd::init_logger!();

    let mut args = env::args().skip(1);
    let root = args.next().context("missing WIDER FACE root directory")?;
    let phase = match args.next().as_deref() {
        None | Some("val") => Phase::Val,
        Some("train") => Phase::Train,
        Some(other) => bail!("unknown phase '{other}', expected 'train' or 'val'"),
    };

    let arch = env::var("LFFD_ARCH").unwrap_or_else(|_| "320_20L_5S".to_string());
    let config = ArchConfig::by_name(&arch)?;
    let detector = Lffd::new(&config)?;

    let mut annotations = widerface::load_annotations(&root, phase)?;
    let degenerate: usize = annotations.iter().map(|a| a.degenerate).sum();
    for annotation in &mut annotations {
        annotation.discard_small_faces(MIN_FACE_SIZE);
    }
    log::info!(
        "{} {phase} images, {degenerate} degenerate boxes skipped",
        annotations.len()
    );

    let mut positives = vec![0; config.heads().len()];
    let mut ignored = vec![0; config.heads().len()];
    for batch in annotations.chunks(BATCH_SIZE) {
        let boxes = batch.iter().map(|a| &a.boxes[..]).collect::<Vec<_>>();
        let (height, width) = batch
            .iter()
            .flat_map(|a| &a.boxes)
            .fold((MIN_INPUT_SIZE, MIN_INPUT_SIZE), |(h, w), b| {
                (h.max(b.y_max().ceil() as usize), w.max(b.x_max().ceil() as usize))
            });
        let fmaps = config.feature_map_sizes(height, width);
        let targets = detector.build_targets(&fmaps, &boxes)?;
        for (i, t) in targets.iter().enumerate() {
            positives[i] += t.num_positive();
            ignored[i] += t.num_ignored();
        }
    }

    println!("architecture {}", config.name());
    for (head, (pos, ign)) in detector.heads().iter().zip(positives.iter().zip(&ignored)) {
        println!(
            "head {} (rf={:>3}, stride={:>2}, scales={}): {pos:>9} positive, {ign:>9} ignored",
            head.index(),
            head.rf_size(),
            head.rf_stride(),
            head.scale_range(),
        );
    }

    Ok(())
}
