mod config;
mod lifecycle;
mod net;
mod notify;
mod router;
mod store;
mod sync;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;

use config::RouterConfig;
use lifecycle::Lifecycle;
use net::HttpNetwork;
use router::Router;
use store::{OrderQueue, SqliteBackend, StoreBackend, StoredRequest};
use sync::SyncQueue;

#[derive(Parser, Debug)]
#[command(name = "tableside")]
#[command(about = "Offline cache router and order sync for a table-ordering web app")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/tableside/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch the manifest and populate the static store (all-or-nothing)
  Install,
  /// Purge stale store generations left over from earlier versions
  Activate,
  /// Deliver a background-sync trigger; the orders tag replays the queue
  Sync {
    /// Sync tag to deliver (default: the configured order-sync tag)
    #[arg(long)]
    tag: Option<String>,
  },
  /// Render the order push notification for a given push body
  Notify {
    /// Push message body (default: the fixed order message)
    body: Option<String>,
    /// Print where clicking the given action navigates instead
    #[arg(long)]
    click: Option<String>,
  },
  /// Route a single request through the cache strategies and print the result
  Get {
    /// Origin-relative path to request
    path: String,
    /// Treat the request as a top-level navigation
    #[arg(long)]
    navigate: bool,
  },
  /// Show store generations, entry counts and queue depth
  Status,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  let _guard = init_tracing()?;

  let args = Args::parse();
  let config = RouterConfig::load(args.config.as_deref())?;

  let backend = Arc::new(SqliteBackend::open()?);
  let net = Arc::new(HttpNetwork::new(&config)?);

  match args.command {
    Command::Install => {
      let mut lifecycle = Lifecycle::new(Arc::clone(&backend), config.clone());
      let count = lifecycle.install(net.as_ref()).await?;
      println!(
        "installed {} manifest entries into {}",
        count,
        config.stores.static_name()
      );
    }
    Command::Activate => {
      let mut lifecycle = Lifecycle::new(Arc::clone(&backend), config.clone());
      let purged = lifecycle.activate()?;
      if purged.is_empty() {
        println!("no stale store generations");
      } else {
        for name in purged {
          println!("purged {name}");
        }
      }
    }
    Command::Sync { tag } => {
      let tag = tag.unwrap_or_else(|| config.sync_tag.clone());
      let queue = SyncQueue::new(Arc::clone(&backend), config.clone());
      match queue.on_sync(&tag, net.as_ref()).await? {
        Some(report) => println!("synced {}, remaining {}", report.synced, report.remaining),
        None => println!("tag {tag} ignored"),
      }
    }
    Command::Notify { body, click } => {
      if let Some(action) = click {
        match notify::click_target(&action) {
          Some(url) => println!("opens {url}"),
          None => println!("dismisses"),
        }
      } else {
        let notification = notify::Notification::from_push(body.as_deref());
        println!("{}", serde_json::to_string_pretty(&notification)?);
      }
    }
    Command::Get { path, navigate } => {
      let request = if navigate {
        StoredRequest::navigate(&path)
      } else {
        StoredRequest::get(&path)
      };

      let router = Router::new(Arc::clone(&backend), Arc::clone(&net), config.clone());
      let served = router.handle(&request).await?;
      println!(
        "{} {} ({} bytes, via {})",
        served.response.status,
        path,
        served.response.body.len(),
        served.source
      );
    }
    Command::Status => {
      let names = backend.store_names()?;
      if names.is_empty() {
        println!("no stores");
      }
      for name in names {
        let marker = if config.stores.is_current(&name) {
          ""
        } else {
          " (stale)"
        };
        println!("{}: {} entries{}", name, backend.entry_count(&name)?, marker);
      }
      println!("queued orders: {}", backend.queue_depth()?);
    }
  }

  Ok(())
}

/// Route tracing to a rolling log file so stdout stays clean for command
/// output. The guard must stay alive for the duration of the process.
fn init_tracing() -> Result<tracing_appender::non_blocking::WorkerGuard> {
  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("tableside")
    .join("logs");

  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory: {}", e))?;

  let file = tracing_appender::rolling::daily(log_dir, "tableside.log");
  let (writer, guard) = tracing_appender::non_blocking(file);

  let filter = tracing_subscriber::EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}
