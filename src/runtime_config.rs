//! # Runtime Configuration
//!
//! Environment-driven settings for the coroutine runtime that hosts the reference
//! server.
//!
//! ## `AUTOROUTE_STACK_SIZE`
//!
//! Stack size for request coroutines, decimal (`16384`) or hexadecimal (`0x4000`).
//! Default `0x4000` (16 KB). Total virtual memory grows with
//! `stack_size × concurrent requests`; deep implementation call chains need more.
//!
//! ```
//! use autoroute::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! assert!(config.stack_size > 0);
//! ```

use std::env;
use tracing::{info, warn};

pub const DEFAULT_STACK_SIZE: usize = 0x4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Coroutine stack size in bytes.
    pub stack_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        match env::var("AUTOROUTE_STACK_SIZE") {
            Ok(val) => Self {
                stack_size: parse_size(&val).unwrap_or_else(|| {
                    warn!(value = %val, "invalid AUTOROUTE_STACK_SIZE, using default");
                    DEFAULT_STACK_SIZE
                }),
            },
            Err(_) => Self::default(),
        }
    }

    /// Install the settings into the `may` runtime. Call before starting the server.
    pub fn apply(&self) {
        may::config().set_stack_size(self.stack_size);
        info!(stack_size = self.stack_size, "coroutine runtime configured");
    }
}

fn parse_size(val: &str) -> Option<usize> {
    let val = val.trim();
    let size = match val.strip_prefix("0x").or_else(|| val.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok()?,
        None => val.parse().ok()?,
    };
    (size > 0).then_some(size)
}
