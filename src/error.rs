// src/error.rs

//! Unified error handling for jobscout.

use std::fmt;

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Browser process or protocol failure
    #[error("Browser error: {0}")]
    Browser(String),

    /// Page navigation failed or returned an unusable status
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    /// No careers page could be located for a company
    #[error("No careers page found for {0}")]
    CareersPageNotFound(String),

    /// Pagination pattern cannot produce the requested URL
    #[error("Unsupported pagination: {0}")]
    UnsupportedPagination(String),

    /// Capability not offered by the active implementation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Attempted to update a company flag outside the allow-list
    #[error("Invalid company flag '{0}'")]
    InvalidFlag(String),

    /// Company search service failed
    #[error("Search error: {0}")]
    Search(String),

    /// Vision/OCR service failed
    #[error("Vision error: {0}")]
    Vision(String),

    /// Queue is closed on the receiving side
    #[error("Queue '{0}' is closed")]
    Queue(String),

    /// Work was abandoned because shutdown was requested
    #[error("Cancelled")]
    Cancelled,
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a navigation error for the given URL.
    pub fn navigation(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Navigation {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn browser(message: impl fmt::Display) -> Self {
        Self::Browser(message.to_string())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    pub fn search(message: impl fmt::Display) -> Self {
        Self::Search(message.to_string())
    }

    pub fn vision(message: impl fmt::Display) -> Self {
        Self::Vision(message.to_string())
    }

    /// True when the error only reflects a shutdown request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
