//! Portal Configuration Library
//!
//! This module exports the configuration core for embedding and integration.

pub mod cli;
pub mod config;
pub mod error;
