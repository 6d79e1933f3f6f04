//! URL handling module for relcrawl
//!
//! This module provides:
//! - Validation of profile URLs (web schemes and length limits)
//! - Host extraction for throttling
//! - Host-to-IP resolution behind the [`HostResolver`] trait

mod host;
mod resolver;
mod validate;

pub use host::extract_host;
pub use resolver::{HostResolver, StaticResolver, SystemResolver};
pub use validate::{validate_url, MAX_HOST_LENGTH, MAX_URL_LENGTH};
