use std::time::Duration;

use clap::Parser;

use crate::notifier::DEFAULT_QUEUE_CAPACITY;
use crate::pushover::{DEFAULT_API_URL, PushoverConfig};
use crate::supervisor::RetryPolicy;

/// Connects to a PSX Main Server and picks up all virtual printout, then
/// sends this printout to a Pushover account so you can read it on any
/// device.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Your Pushover user key.
    #[arg(long, default_value = "mykey")]
    pub userkey: String,

    /// Your Pushover application key.
    #[arg(long, default_value = "mykey")]
    pub appkey: String,

    /// Host running the PSX Main Server.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port of the PSX Main Server.
    #[arg(long, default_value_t = 10747)]
    pub port: u16,

    /// Pushover messages endpoint.
    #[arg(long, default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Delay before connecting, also used after a session ends (milliseconds).
    #[arg(long, default_value_t = 2_000)]
    pub connect_delay_ms: u64,

    /// Delay after a failed connection attempt (milliseconds).
    #[arg(long, default_value_t = 10_000)]
    pub retry_delay_ms: u64,

    /// Limit for a single connection attempt (milliseconds).
    #[arg(long, default_value_t = 10_000)]
    pub connect_timeout_ms: u64,

    /// Limit for a single Pushover request (milliseconds).
    #[arg(long, default_value_t = 10_000)]
    pub http_timeout_ms: u64,

    /// Notifications that may wait for delivery before new ones are dropped.
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
}

impl Cli {
    /// `host:port` of the PSX Main Server.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            connect_delay: Duration::from_millis(self.connect_delay_ms),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }

    pub fn pushover_config(&self) -> PushoverConfig {
        PushoverConfig {
            api_url: self.api_url.clone(),
            app_token: self.appkey.clone(),
            user_key: self.userkey.clone(),
            timeout: Duration::from_millis(self.http_timeout_ms),
        }
    }
}
