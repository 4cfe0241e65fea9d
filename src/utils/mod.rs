//! Utility functions and helpers.

pub mod http;
pub mod log;
pub mod url;

pub use self::url::{get_domain, resolve_href};
