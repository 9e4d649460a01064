//! # Runtime Configuration
//!
//! Coroutine tuning read from the environment.
//!
//! ## `WEBIUM_STACK_SIZE`
//!
//! Stack size in bytes for the coroutines that serve requests and run
//! [`Deferred`](crate::handlers::Deferred) work. Accepts decimal (`65536`) or
//! hexadecimal (`0x10000`). Unset or unparsable values fall back to
//! [`DEFAULT_STACK_SIZE`].
//!
//! ```bash
//! export WEBIUM_STACK_SIZE=0x20000
//! cargo run --bin webium-demo
//! ```
//!
//! Total virtual memory grows with `stack_size × concurrent coroutines`; handlers
//! that build large values on the stack or recurse deeply need more.

use std::env;

pub const STACK_SIZE_ENV: &str = "WEBIUM_STACK_SIZE";

/// 64 KB.
pub const DEFAULT_STACK_SIZE: usize = 0x10000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Coroutine stack size in bytes.
    pub stack_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let stack_size = env::var(STACK_SIZE_ENV)
            .ok()
            .and_then(|val| parse_size(&val))
            .unwrap_or(DEFAULT_STACK_SIZE);
        RuntimeConfig { stack_size }
    }
}

fn parse_size(val: &str) -> Option<usize> {
    let val = val.trim();
    let parsed = match val.strip_prefix("0x").or_else(|| val.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => val.parse().ok(),
    };
    parsed.filter(|size| *size > 0)
}
