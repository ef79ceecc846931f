pub mod api;
pub mod app;
pub mod auth;
pub mod chain;
pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod history;
pub mod ingest;
pub mod stats;
pub mod util;
