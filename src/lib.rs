//! # Chipstore - Paged Columnar Storage for Microarray Analysis
//!
//! `chipstore` stores typed vectors, hierarchical tables and nested groups in
//! a single paged container file, and builds a disk-backed intensity cache on
//! top of it for probe × chip data sets too large to hold in memory.
//!
//! - **Buffered vectors** with a movable in-memory window over each element stream
//! - **Hierarchical tables** whose levels interleave rows through a line index
//! - **Groups** with ordered `key=value` headers on every container
//! - **Intensity cache** that reorders probes by read order and shares one
//!   window across all chip columns
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chipstore::{Dtype, OpenFlags, Result, StoreFile};
//!
//! # fn main() -> Result<()> {
//! let mut file = StoreFile::open("analysis.cst", OpenFlags::REPLACE)?;
//! file.add_header("chip-type", "HG-U133A")?;
//!
//! let signal = file.open_vector("signal", Some(Dtype::Double), OpenFlags::CREATE)?;
//! signal.push_back(7.25f64)?;
//! signal.push_back(8.5f64)?;
//!
//! let table = file.open_table("calls", OpenFlags::CREATE)?;
//! table.define_column(0, 0, "probeset_id", Dtype::Int)?;
//! table.set_int(0, "probeset_id", 1007)?;
//! table.write_level(0)?;
//!
//! file.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Intensity Cache
//!
//! ```rust,no_run
//! use chipstore::{IntensityCacheBuilder, Result};
//!
//! # fn main() -> Result<()> {
//! let mut cache = IntensityCacheBuilder::new()
//!     .layout_order(vec![2, 0, 1])
//!     .cel_names(vec!["a.cel".into(), "b.cel".into()])
//!     .temp_dir("/scratch")
//!     .build()?;
//!
//! cache.set_probe_intensity(0, &[1.0, 2.0, 3.0])?;
//! cache.set_probe_intensity(1, &[4.0, 5.0, 6.0])?;
//! let value = cache.get_probe_intensity(2, 1, 0)?;
//! assert_eq!(value, 6.0);
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod mart;

pub use crate::core::{
    AttrValue, Child, Column, ColumnRef, Dtype, Group, ObjectKind, OpenFlags, Result, StorageObject,
    StoreError, StoreFile, StoreOptions, StoreStats, Table, Value, Vector,
};
pub use crate::core::header::PAGE_SIZE;
pub use crate::mart::{
    import_intensity_table, CacheState, CacheStats, ImportStats, IntensityCache, IntensityCacheBuilder,
    IntensityCacheConfig, ProbeLayout,
};
