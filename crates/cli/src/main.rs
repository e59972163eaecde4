mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::RenderArgs;
use crate::output::OutputFormat;

/// metarender - Render conda recipes into package descriptors
#[derive(Parser)]
#[command(name = "metarender")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Render a recipe for every variant and print the resulting packages
  Render {
    /// Recipe file or directory holding meta.yaml
    recipe: PathBuf,

    /// Variant axis file (default: conda_build_config.yaml next to the recipe)
    #[arg(short = 'm', long)]
    variants: Option<PathBuf>,

    /// Render configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target subdir, e.g. linux-64 or osx-arm64
    #[arg(long)]
    subdir: Option<String>,

    /// Keep outputs whose dependencies cannot be satisfied yet
    #[arg(long)]
    permit_unsatisfiable: bool,

    /// Skip pin finalization
    #[arg(long)]
    no_finalize: bool,

    /// Copy local sources here for recipes that read their source
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },

  /// Show the host subdir and the selector namespace
  Info {
    /// Subdir to describe instead of the running platform
    #[arg(long)]
    subdir: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Render {
      recipe,
      variants,
      config,
      subdir,
      permit_unsatisfiable,
      no_finalize,
      work_dir,
      format,
    } => cmd::cmd_render(RenderArgs {
      recipe,
      variants,
      config,
      subdir,
      permit_unsatisfiable,
      no_finalize,
      work_dir,
      format,
    }),
    Commands::Info { subdir, format } => cmd::cmd_info(subdir.as_deref(), format),
  }
}
