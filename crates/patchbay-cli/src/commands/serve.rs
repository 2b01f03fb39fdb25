//! Relay server command.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use clap::Args;
use patchbay_sync::{Relay, RelayServer};

use super::common::{load_config, stop_on_ctrl_c};

#[derive(Args)]
pub struct ServeArgs {
    /// Address to bind (overrides the config file)
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory where session logs are persisted
    #[arg(long, value_name = "DIR")]
    store: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

pub fn run(args: ServeArgs) -> anyhow::Result<()> {
    let mut server_config = load_config(args.config.as_deref())?.server;
    if let Some(bind) = args.bind {
        server_config.bind = bind;
    }
    if let Some(port) = args.port {
        server_config.port = port;
    }
    if args.store.is_some() {
        server_config.store_dir = args.store;
    }

    let relay = match &server_config.store_dir {
        Some(dir) => {
            tracing::info!(store = %dir.display(), "persisting sessions");
            Relay::with_store(dir)?
        }
        None => Relay::new(),
    };
    let server = RelayServer::bind(server_config.address(), relay)?;
    println!("Relay listening on {}", server.local_addr()?);
    println!("\nPress Ctrl+C to stop...\n");

    // The accept loop owns the listener; Ctrl+C reaches it through its flag.
    let running = stop_on_ctrl_c()?;
    let server_running = server.running();
    let watcher = thread::spawn(move || {
        while running.load(Ordering::SeqCst) && server_running.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(50));
        }
        server_running.store(false, Ordering::SeqCst);
    });

    server.run()?;
    let _ = watcher.join();
    println!("Done!");
    Ok(())
}
