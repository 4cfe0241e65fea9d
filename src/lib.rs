// src/lib.rs

//! jobscout library
//!
//! Discovers companies from seed listing sites, crawls their careers pages
//! for job postings and reads customer logos to find more companies.

pub mod browser;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
