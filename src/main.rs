use std::sync::Arc;

use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use floodgate::args::Args;
use floodgate::config_manager::ConfigManager;
use floodgate::server::print_startup_info;
use floodgate_core::server::Server;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Validate arguments
    if let Err(err) = args.validate() {
        eprintln!("❌ Configuration error: {err}");
        std::process::exit(1);
    }

    init_tracing(&args);

    // Load configuration and start watching the file for changes
    let manager = match ConfigManager::from_path(args.config.clone()) {
        Ok(manager) => Arc::new(manager),
        Err(err) => {
            eprintln!("❌ Failed to load configuration: {err}");
            std::process::exit(1);
        }
    };
    manager.start().await;

    print_startup_info(&args, &manager.snapshot());

    let mut server = Server::new(args.bind.clone(), args.listen, Arc::clone(&manager));
    let shutdown = server.shutdown_handle();

    // The core installs no signal handlers; wire SIGINT/SIGTERM here.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("got shutdown signal");
            shutdown.shutdown();
        }
    });

    let result = server.run().await;
    manager.stop().await;

    if let Err(err) = result {
        error!(%err, "server terminated with a fatal error");
        std::process::exit(1);
    }
    info!("good bye!");
}

/// Initializes the tracing subscriber from the flags and `RUST_LOG`.
fn init_tracing(args: &Args) {
    let default_level = if args.verbose {
        "debug"
    } else if args.quiet {
        "warn"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if args.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}
