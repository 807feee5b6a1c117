//! Command line argument parsing for floodgate.
//!
//! This module defines the CLI interface using [`clap`]. The listen side is
//! configured here; the forward side and the rate-limiting behavior come
//! from the YAML configuration file.

use std::path::PathBuf;

use clap::Parser;

/// Command line arguments for floodgate.
///
/// # Example
///
/// ```no_run
/// use floodgate::args::Args;
/// use clap::Parser;
///
/// let args = Args::parse();
/// if let Err(err) = args.validate() {
///     eprintln!("Configuration error: {err}");
///     std::process::exit(1);
/// }
/// ```
#[derive(Parser, Debug)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    long_about = "A rate-limited reverse proxy. Accepts client connections, admits or \
rejects them per client IP with a token bucket or leaky bucket, and relays \
admitted requests to a fixed backend with rate-limit headers injected.\n\n\
Example usage:\n  floodgate --listen 8000 --config floodgate.yaml\n  floodgate -l 8000 -c floodgate.yaml --verbose"
)]
pub struct Args {
    /// Path to the YAML configuration file. Without it, built-in defaults
    /// are used and hot-reload is disabled.
    #[arg(
        long,
        short = 'c',
        help = "Configuration file (.yaml) path",
        value_name = "PATH"
    )]
    pub config: Option<PathBuf>,

    /// Address to bind the listening socket to.
    #[arg(
        long,
        short = 'b',
        help = "Bind address for the listening socket",
        value_name = "ADDRESS",
        default_value = "0.0.0.0"
    )]
    pub bind: String,

    /// Port to listen on for incoming requests.
    #[arg(
        long,
        short = 'l',
        help = "Listen port for incoming connections",
        value_name = "PORT",
        default_value_t = 8000
    )]
    pub listen: u16,

    /// Enable verbose output (debug-level logs).
    #[arg(long, short = 'v', help = "Print debug logs")]
    pub verbose: bool,

    /// Enable quiet mode (warnings and errors only).
    #[arg(
        long,
        short = 'q',
        help = "Suppress startup output, log warnings and errors only",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,

    /// Output logs in JSON format (for structured logging).
    #[arg(long, help = "Output logs in JSON format for structured logging")]
    pub json_logs: bool,
}

impl Args {
    /// Validates the parsed command line arguments.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If all arguments are valid
    /// * `Err(String)` - A descriptive error message if validation fails
    ///
    /// # Example
    ///
    /// ```
    /// use floodgate::args::Args;
    /// use clap::Parser;
    ///
    /// let args = Args::try_parse_from(["floodgate", "-b", "not-an-ip"]).unwrap();
    /// assert!(args.validate().is_err());
    ///
    /// let args = Args::try_parse_from(["floodgate", "-l", "8000"]).unwrap();
    /// assert!(args.validate().is_ok());
    /// ```
    pub fn validate(&self) -> Result<(), String> {
        if self.listen == 0 {
            return Err("Listen port must be greater than 0".to_string());
        }

        if self.bind.parse::<std::net::IpAddr>().is_err() {
            return Err(format!("Invalid bind address: '{}'", self.bind));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["floodgate"]).unwrap();
        assert_eq!(args.bind, "0.0.0.0");
        assert_eq!(args.listen, 8000);
        assert!(args.config.is_none());
        assert!(!args.verbose);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_config_path() {
        let args = Args::try_parse_from(["floodgate", "-c", "/etc/floodgate.yaml"]).unwrap();
        assert_eq!(
            args.config.as_deref(),
            Some(std::path::Path::new("/etc/floodgate.yaml"))
        );
    }

    #[test]
    fn test_rejects_invalid_bind_address() {
        let args = Args::try_parse_from(["floodgate", "-b", "not-an-ip"]).unwrap();
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Args::try_parse_from(["floodgate", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_ipv6_bind_address() {
        let args = Args::try_parse_from(["floodgate", "-b", "::1"]).unwrap();
        assert!(args.validate().is_ok());
    }
}
