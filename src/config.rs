use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::GateError;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "bearer-gate")]
#[command(about = "Bearer token gate with a per-IP sliding window rate limit")]
pub struct Args {
    // Address the gate listens on
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    pub listen: String,

    // Counter store (memcached protocol) address
    #[arg(short, long, default_value = "localhost:11211")]
    pub store: String,

    // Keep counters in process memory instead of the counter store
    #[arg(long, default_value_t = false)]
    pub in_memory_store: bool,

    // Pooled connections to the counter store
    #[arg(long, default_value_t = 4)]
    pub store_pool_size: usize,

    // Newline-delimited list of valid tokens
    #[arg(short, long, default_value = "./tokens.txt")]
    pub tokens_file: PathBuf,

    // Max token-less requests per window
    #[arg(long, default_value_t = 60)]
    pub rate_limit: u64,

    // Rate limit window in seconds (one bucket per second)
    #[arg(long, default_value_t = 60)]
    pub rate_window: u64,

    // Bounded wait for a pending connection
    #[arg(long, default_value_t = 1000)]
    pub accept_poll_ms: u64,

    // Bound for each read/write on a client or store connection
    #[arg(long, default_value_t = 5000)]
    pub io_timeout_ms: u64,

    // How long in-flight connections may finish after a stop signal
    #[arg(long, default_value_t = 5)]
    pub shutdown_grace_secs: u64,

    // Admin server port (health + metrics), disabled when unset
    #[arg(long)]
    pub admin_port: Option<u16>,
}

impl Args {
    /// Reject values that would make the gate unusable.
    pub fn validate(&self) -> Result<(), GateError> {
        if self.rate_window == 0 {
            return Err(GateError::Config("rate window must be at least 1 second".into()));
        }
        if self.store_pool_size == 0 {
            return Err(GateError::Config("store pool size must be at least 1".into()));
        }
        if self.accept_poll_ms == 0 || self.io_timeout_ms == 0 {
            return Err(GateError::Config("timeouts must be non-zero".into()));
        }
        Ok(())
    }

    pub fn accept_poll(&self) -> Duration {
        Duration::from_millis(self.accept_poll_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
