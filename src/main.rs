use clap::{Args as ClapArgs, Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use tracing::warn;

use rdl::cli;
use rdl::config::Config;
use rdl::logging;
use rdl::permissions::UserId;
use rdl::{Context, FetchMode};

#[derive(Parser, Debug)]
#[command(name = "rdl")]
#[command(about = "Resilient data access: live backend data with validated fallbacks")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/rdl/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Backend base URL, overriding the config file
  #[arg(long, global = true)]
  base_url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch one domain and print the result
  Fetch {
    domain: String,
    #[command(flatten)]
    mode: ModeArgs,
  },
  /// List domains with their endpoint and current source
  Domains,
  /// Fetch every domain once and report usage and degraded domains
  Status {
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
  },
  /// Show or check a user's capabilities
  Capabilities {
    user: UserId,
    /// Capability code to check (repeatable)
    #[arg(long = "check")]
    checks: Vec<String>,
    /// Ignore cached entries
    #[arg(long)]
    refresh: bool,
  },
  /// Show a user's menu
  Menu { user: UserId },
  /// Show a user's groups
  Groups { user: UserId },
  /// Manage the capability cache
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
}

#[derive(ClapArgs, Debug)]
#[group(multiple = false)]
struct ModeArgs {
  /// Only try the backend; report failures instead of falling back
  #[arg(long)]
  api_only: bool,
  /// Only serve the bundled fixture
  #[arg(long)]
  mock_only: bool,
}

impl ModeArgs {
  fn mode(&self) -> FetchMode {
    match (self.api_only, self.mock_only) {
      (true, _) => FetchMode::ApiOnly,
      (_, true) => FetchMode::MockOnly,
      _ => FetchMode::Resilient,
    }
  }
}

#[derive(Subcommand, Debug)]
enum CacheAction {
  /// Remove cached capabilities and menus
  Clear {
    /// Only this user's entries
    #[arg(long)]
    user: Option<UserId>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Logging is best-effort; the commands still work without a log file
  let _log_guard = match logging::default_log_dir().map(|dir| logging::init_logging(&dir)) {
    Some(Ok(guard)) => Some(guard),
    Some(Err(e)) => {
      eprintln!("warning: logging disabled: {}", e);
      None
    }
    None => None,
  };

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  // Override base URL if specified on command line
  if let Some(base_url) = args.base_url {
    config.api.base_url = base_url;
  }

  let ctx = Context::new(config)?;

  match args.command {
    Command::Fetch { domain, mode } => cli::fetch(&ctx, &domain, mode.mode()).await?,
    Command::Domains => cli::domains(&ctx),
    Command::Status { json } => cli::status(&ctx, json).await?,
    Command::Capabilities {
      user,
      checks,
      refresh,
    } => cli::capabilities(&ctx, user, &checks, refresh).await?,
    Command::Menu { user } => cli::menu(&ctx, user).await?,
    Command::Groups { user } => cli::groups(&ctx, user).await?,
    Command::Cache {
      action: CacheAction::Clear { user },
    } => {
      if user.is_none() {
        warn!("clearing cached permissions for every user");
      }
      cli::clear_cache(&ctx, user)?
    }
  }

  Ok(())
}
