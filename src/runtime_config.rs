//! # Runtime Configuration Module
//!
//! Environment variable-based configuration for the engine's runtime
//! behavior.
//!
//! ## Environment Variables
//!
//! ### `ROUTEWISE_STACK_SIZE`
//!
//! Stack size for handler worker coroutines. Accepts decimal (`16384`) or
//! hexadecimal (`0x4000`) values. Default: `0x4000` (16 KB).
//!
//! Larger stacks support deeper call chains; smaller stacks reduce memory
//! for many concurrent coroutines. Tune to handler complexity.
//!
//! ### `ROUTEWISE_SUSPEND_TIMEOUT_MS`
//!
//! Default deadline, in milliseconds, applied when a handler suspends
//! without requesting an explicit timeout. `0` disables the default
//! deadline. Default: `0`.
//!
//! ## Usage
//!
//! ```rust
//! use routewise::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! println!("Stack size: {} bytes", config.stack_size);
//! ```

use std::env;
use std::time::Duration;

/// Runtime configuration loaded from environment variables.
///
/// Load this at startup using [`RuntimeConfig::from_env()`].
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Stack size for worker coroutines in bytes (default: 16 KB / 0x4000).
    pub stack_size: usize,
    /// Default suspend deadline; `None` means suspended tasks have no
    /// deadline unless one is requested explicitly.
    pub default_suspend_timeout: Option<Duration>,
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let stack_size = match env::var("ROUTEWISE_STACK_SIZE") {
            Ok(val) => {
                if let Some(hex) = val.strip_prefix("0x") {
                    usize::from_str_radix(hex, 16).unwrap_or(0x4000)
                } else {
                    val.parse().unwrap_or(0x4000)
                }
            }
            Err(_) => 0x4000,
        };

        let default_suspend_timeout = env::var("ROUTEWISE_SUSPEND_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        RuntimeConfig {
            stack_size,
            default_suspend_timeout,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            stack_size: 0x4000,
            default_suspend_timeout: None,
        }
    }
}
