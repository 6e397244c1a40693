//! Livetail - live-tail proxy for fragmented MP4 recordings
//!
//! A recording that is still being written to object storage grows one part
//! at a time. Players that open it from the start see minutes or hours of
//! old footage; livetail instead serves the file's own header followed by
//! the newest fragments, renumbered so the player sees one continuous
//! stream that begins at the live edge.
//!
//! # Modules
//!
//! - [`origin`] - live-read protocol client and part discovery
//! - [`streaming`] - part-spanning box reader and the rewrite pipeline
//! - [`server`] - HTTP front end: intercept video requests, forward the rest
//! - [`config`] - TOML configuration
//!
//! Box parsing and fragment rewriting live in the `livetail-media` crate.

pub mod config;
pub mod error;
pub mod origin;
pub mod server;
pub mod streaming;

pub use error::{Error, Result};
