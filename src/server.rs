//! Startup output for the floodgate CLI.

use floodgate_core::config::{Algorithm, Config};

use crate::args::Args;

/// Print startup banner with the effective configuration
pub fn print_startup_info(args: &Args, config: &Config) {
    if args.quiet {
        // Quiet mode: only essential information
        println!(
            "🚀 floodgate v{} listening on {}:{}",
            env!("CARGO_PKG_VERSION"),
            args.bind,
            args.listen
        );
        return;
    }

    println!("🛡️  {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    println!("   {}", env!("CARGO_PKG_DESCRIPTION"));
    println!();
    println!("📡 Network Configuration:");
    println!("   Listen:         {}:{}", args.bind, args.listen);
    println!("   Forward:        {}", config.forward_address());
    println!("   Buffer Size:    {} bytes", config.common.socket_buf_size);
    match &args.config {
        Some(path) => println!("   Config File:    {} (watched)", path.display()),
        None => println!("   Config File:    none (built-in defaults)"),
    }
    println!();
    println!("⚡ Rate Limiting:");
    println!("   Algorithm:      {}", config.common.rate_limit_algorithm);
    match config.common.rate_limit_algorithm {
        Algorithm::TokenBucket => {
            let tb = &config.token_bucket;
            println!(
                "   Refill:         {} tokens per {}s (capacity {})",
                tb.tokens_per_period, tb.period_secs, tb.capacity
            );
        }
        Algorithm::LeakyBucket => {
            let lb = &config.leaky_bucket;
            println!(
                "   Drain:          {} requests per {}s (queue size {})",
                lb.drain_per_period, lb.period_secs, lb.queue_size
            );
        }
    }
    println!();
    println!("🚀 Server starting...");
}
