// Public API - the runner plus the config and error types it exposes
pub mod config;
pub mod error;
pub mod runner;

// Internal modules - organized by subsystem
mod db;
mod formats;
