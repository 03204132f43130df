//! Client-side caching and state layer for the tour marketplace back office.

pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod fmt;
pub mod logging;
pub mod persist;
pub mod resources;
pub mod store;
pub mod transport;
pub mod utils;
