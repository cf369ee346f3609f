//! Configuration system — schema, loading, and env var overrides.
//!
//! # Usage
//! ```no_run
//! use hub_core::config;
//!
//! let cfg = config::load_config(None);
//! println!("bind: {}", cfg.server.bind_addr);
//! ```

pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_path, save_config};
pub use schema::Config;
