//! Disk-backed intensity cache for probe × chip measurements
//!
//! - [`cache`] - reordered, deduplicated chip columns behind a shared window
//! - [`config`] - cache settings, loadable from TOML
//! - [`import`] - bulk loading from tab-separated intensity tables

pub mod cache;
pub mod config;
pub mod import;

pub use cache::{CacheState, CacheStats, IntensityCache, IntensityCacheBuilder, WINDOW_PAD};
pub use config::IntensityCacheConfig;
pub use import::{import_intensity_table, ImportStats, ProbeLayout};
