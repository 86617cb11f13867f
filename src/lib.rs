// Library crate exposing modules for the binary and integration tests

pub mod cli;
pub mod commands;
pub mod config;
pub mod crawler;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod logging;
pub mod model;
pub mod progress;
pub mod record;
pub mod repository;
pub mod stats;
pub mod store;
pub mod util;
pub mod workspace;
