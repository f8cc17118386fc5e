//! `roster`: keep CardDAV address books and profile pictures in sync.
//!
//! # Usage
//!
//! ```
//! roster merge merge.toml --method edit-date
//! roster inject inject.toml --method always-override
//! roster upload upload.toml
//! ```

mod commands;
mod settings;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use roster_sync::{ComparisonMode, InjectionMethod};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "roster", version, about = "CardDAV contact reconciliation")]
struct Cli {
  /// Log filter, e.g. `debug` or `roster_sync=trace`. Defaults to `RUST_LOG`,
  /// then `info`.
  #[arg(long, global = true, value_name = "LEVEL")]
  log_level: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Copy every source address book into every target address book.
  Merge {
    /// Path to the TOML configuration file.
    config: PathBuf,

    /// How to decide whether an existing target card is up to date.
    #[arg(long, value_enum, default_value_t = MergeMethod::Content)]
    method: MergeMethod,
  },
  /// Write crawled profile pictures into matching contacts.
  Inject {
    /// Path to the TOML configuration file.
    config: PathBuf,

    #[arg(long, value_enum, default_value_t = InjectMethod::CompareContent)]
    method: InjectMethod,
  },
  /// Upload crawled profile pictures to the picture library.
  Upload {
    /// Path to the TOML configuration file.
    config: PathBuf,
  },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MergeMethod {
  /// Compare full vCard bodies.
  Content,
  /// Skip targets whose last modification is not older than the source.
  EditDate,
}

impl From<MergeMethod> for ComparisonMode {
  fn from(method: MergeMethod) -> Self {
    match method {
      MergeMethod::Content => Self::Content,
      MergeMethod::EditDate => Self::EditDate,
    }
  }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum InjectMethod {
  /// Only replace a photo whose bytes differ.
  CompareContent,
  /// Replace every matched photo.
  AlwaysOverride,
}

impl From<InjectMethod> for InjectionMethod {
  fn from(method: InjectMethod) -> Self {
    match method {
      InjectMethod::CompareContent => Self::CompareContent,
      InjectMethod::AlwaysOverride => Self::AlwaysOverride,
    }
  }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

fn init_tracing(log_level: Option<&str>) {
  let builder =
    EnvFilter::builder().with_default_directive(LevelFilter::INFO.into());
  let filter = match log_level {
    Some(directives) => builder.parse_lossy(directives),
    None => builder.from_env_lossy(),
  };
  tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();
  init_tracing(cli.log_level.as_deref());

  match cli.command {
    Command::Merge { config, method } => {
      commands::merge(settings::load(&config)?, method.into()).await
    }
    Command::Inject { config, method } => {
      commands::inject(settings::load(&config)?, method.into()).await
    }
    Command::Upload { config } => commands::upload(settings::load(&config)?).await,
  }
}
