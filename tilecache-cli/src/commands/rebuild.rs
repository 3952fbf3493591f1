//! Offline custom-data rebuild command.
//!
//! Re-runs the configured transform over every stored tile, in id-ordered
//! batches, with a progress bar. The serving path never rewrites
//! `custom_data`; this command is how it catches up after the transform
//! changes.

use std::path::PathBuf;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use tilecache::service::{rebuild_custom_data, DEFAULT_REBUILD_BATCH_SIZE};
use tilecache::store::DiskTileStore;

use super::{CommandError, TransformKind};

/// Arguments for the `rebuild` subcommand.
#[derive(Args)]
pub struct RebuildArgs {
    /// Path to the persistent tile store to rebuild.
    #[arg(long)]
    store: PathBuf,

    /// Custom serialization transform to apply.
    #[arg(long, value_enum)]
    transform: TransformKind,

    /// Number of tiles per batch.
    #[arg(long, default_value_t = DEFAULT_REBUILD_BATCH_SIZE)]
    batch_size: usize,
}

/// Run the rebuild to completion.
pub async fn run(args: RebuildArgs) -> Result<(), CommandError> {
    let store = std::sync::Arc::new(DiskTileStore::open(args.store).await?);
    let transform = args.transform.transform();

    let bar = ProgressBar::new(100).with_style(
        ProgressStyle::with_template("{bar:40} {percent:>3}% ready")
            .expect("static progress template is valid"),
    );

    let report = rebuild_custom_data(store, &transform, args.batch_size, |fraction| {
        bar.set_position((fraction * 100.0).round() as u64);
    })
    .await?;
    bar.finish();

    println!(
        "rebuilt custom data for {} tiles in {} batches",
        report.tiles_rebuilt, report.batches
    );
    Ok(())
}
