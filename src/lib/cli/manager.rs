use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION")
)]
struct Args {
    /// Sets the address for the REST API server
    #[arg(long = "rest-server", env = "REST_SERVER", value_name = "IP:PORT", default_value = "0.0.0.0:8080")]
    rest_server: String,

    /// Directory holding one sub-directory of collections per simulation
    #[arg(long, env = "DATA_PATH", value_name = "PATH", default_value = "./data")]
    data_path: PathBuf,

    /// Directory for the rolling log files
    #[arg(long, env = "LOG_PATH", value_name = "PATH", default_value = "./logs")]
    log_path: PathBuf,

    /// Turns all log categories up to Debug, for more information check RUST_LOG env variable
    #[arg(short, long)]
    verbose: bool,

    /// Turns all log categories up to Trace in the log file
    #[arg(long)]
    enable_tracing_level_log_file: bool,

    /// Requests allowed per client per minute
    #[arg(long, env = "RATE_LIMIT_PER_MINUTE", default_value = "6000")]
    rate_limit_per_minute: u32,

    /// Requests a client may burst above its refill rate
    #[arg(long, env = "RATE_LIMIT_BURST", default_value = "10")]
    rate_limit_burst: u32,

    /// Seconds between rescans of the data path, 0 disables rescanning
    #[arg(long, env = "CATALOG_REFRESH_INTERVAL", value_name = "SECONDS", default_value = "30")]
    catalog_refresh_interval: u64,
}

#[derive(Debug)]
struct Manager {
    clap_matches: Args,
}

lazy_static! {
    static ref MANAGER: Arc<Manager> = Arc::new(Manager::new());
}

impl Manager {
    fn new() -> Self {
        #[cfg(test)]
        let clap_matches = Args::parse_from([env!("CARGO_PKG_NAME")]);
        #[cfg(not(test))]
        let clap_matches = Args::parse();

        Self { clap_matches }
    }
}

// Construct our manager, should be done inside main
pub fn init() {
    MANAGER.as_ref();
}

// Check if the verbosity parameter was used
pub fn is_verbose() -> bool {
    MANAGER.clap_matches.verbose
}

pub fn is_tracing() -> bool {
    MANAGER.clap_matches.enable_tracing_level_log_file
}

// Return the desired address for the REST API
pub fn server_address() -> &'static str {
    &MANAGER.clap_matches.rest_server
}

pub fn data_path() -> &'static std::path::Path {
    &MANAGER.clap_matches.data_path
}

pub fn log_path() -> &'static std::path::Path {
    &MANAGER.clap_matches.log_path
}

pub fn rate_limit_per_minute() -> u32 {
    MANAGER.clap_matches.rate_limit_per_minute
}

pub fn rate_limit_burst() -> u32 {
    MANAGER.clap_matches.rate_limit_burst
}

pub fn catalog_refresh_interval() -> Option<Duration> {
    match MANAGER.clap_matches.catalog_refresh_interval {
        0 => None,
        seconds => Some(Duration::from_secs(seconds)),
    }
}

// Return the command line used to start this application
pub fn command_line_string() -> String {
    std::env::args().collect::<Vec<String>>().join(" ")
}

// Return a clone of current Args struct
pub fn command_line() -> String {
    format!("{:#?}", MANAGER.clap_matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_arguments() {
        assert!(!is_verbose());
        assert!(!is_tracing());
        assert_eq!(rate_limit_per_minute(), 6000);
        assert_eq!(rate_limit_burst(), 10);
        assert_eq!(catalog_refresh_interval(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_refresh_interval_parses() {
        let args = Args::parse_from(["analyzer", "--catalog-refresh-interval", "0", "-v"]);
        assert_eq!(args.catalog_refresh_interval, 0);
        assert!(args.verbose);
    }
}
