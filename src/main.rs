use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use treepatch::{apply, generate, ApplyOptions, GenerateOptions};

#[derive(Parser)]
#[command(name = "treepatch", about = "Per-file patch generator and applier for vendored source trees")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Diff the target tree against the original and write the patch store
    Generate {
        /// Path to the original (pristine) directory
        #[arg(long)]
        original_dir: Option<PathBuf>,
        /// Path to the original tree packed as a tar or tar.gz archive
        #[arg(long)]
        original_archive: Option<PathBuf>,
        /// Path to the edited directory the patches should reproduce
        #[arg(long)]
        target: PathBuf,
        /// Root of the patch store to write
        #[arg(long, short)]
        patches: PathBuf,
        /// Header prefix for the original side
        #[arg(long, default_value = "a/")]
        original_prefix: String,
        /// Header prefix for the modified side
        #[arg(long, default_value = "b/")]
        modified_prefix: String,
        /// Treat whitespace-only line changes as real changes
        #[arg(long)]
        strict_whitespace: bool,
    },
    /// Replay the patch store onto a pristine copy of the original tree
    Apply {
        /// Path to the target directory to patch
        #[arg(long)]
        target: PathBuf,
        /// Root of the patch store to read
        #[arg(long, short)]
        patches: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            original_dir,
            original_archive,
            target,
            patches,
            original_prefix,
            modified_prefix,
            strict_whitespace,
        } => {
            println!("Generating patches...");
            println!("  Target: {}", target.display());
            println!("  Patch store: {}", patches.display());

            let options = GenerateOptions {
                original_dir,
                original_archive,
                target_root: target,
                patch_root: patches,
                original_prefix,
                modified_prefix,
                ignore_whitespace: !strict_whitespace,
            };

            let start = Instant::now();
            let summary = generate(options).await?;
            let elapsed = start.elapsed();

            println!("\nPatch store written!");
            println!("  Files unchanged: {}", summary.files_unchanged);
            println!("  Files changed: {}", summary.files_changed);
            println!("  Files added: {}", summary.files_added);
            println!("  Files deleted: {}", summary.files_deleted);
            println!("  Text patches: {}", summary.text_patches);
            println!("  Binary patches: {}", summary.binary_patches);
            println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());
        }
        Commands::Apply { target, patches } => {
            println!("Applying patches...");
            println!("  Target: {}", target.display());
            println!("  Patch store: {}", patches.display());

            let start = Instant::now();
            let summary = apply(ApplyOptions {
                target_root: target,
                patch_root: patches,
            })
            .await?;
            let elapsed = start.elapsed();

            println!("\nPatches applied!");
            println!("  Text patches applied: {}", summary.text_applied);
            println!("  Binary patches applied: {}", summary.binary_applied);
            println!("  Files deleted: {}", summary.files_deleted);
            println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());
        }
    }

    Ok(())
}
