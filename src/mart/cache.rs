//! Disk-backed probe × chip intensity store
//!
//! Each chip's intensities are written as one float vector, reordered so
//! probes appear in the order an analysis will read them. Reads go through
//! a window shared by every chip column: a miss reloads the same probe range
//! for all columns at once, so walking one probe across all chips costs a
//! single reload.
//!
//! ```rust,no_run
//! use chipstore::mart::IntensityCacheBuilder;
//!
//! let mut cache = IntensityCacheBuilder::new()
//!     .layout_order(vec![3, 1, 3, 2])
//!     .cel_names(vec!["a.cel".into(), "b.cel".into()])
//!     .cache_budget(1 << 16)
//!     .build()?;
//!
//! cache.set_probe_intensity(0, &[10.0, 11.0, 12.0, 13.0])?;
//! cache.set_probe_intensity(1, &[20.0, 21.0, 22.0, 23.0])?;
//! assert_eq!(cache.get_probe_intensity(3, 1, 0)?, 23.0);
//! cache.close()?;
//! # Ok::<(), chipstore::StoreError>(())
//! ```

use crate::core::dtype::Dtype;
use crate::core::error::{Result, StoreError};
use crate::core::file::StoreFile;
use crate::core::object::OpenFlags;
use crate::core::store::StoreOptions;
use crate::core::vector::Vector;
use crate::mart::config::IntensityCacheConfig;
use ahash::AHashMap;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, info, warn};

/// Window slots past the end of a column read as this value
pub const WINDOW_PAD: f32 = -1.0;

/// Lifecycle of a cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// No data written; the probe remap does not exist yet
    Uninitialized,
    /// Remap fixed, no chip written
    RemapBuilt,
    /// Chip columns are being appended
    Streaming,
    /// Serving reads
    RandomAccess,
}

/// Read-path counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub reloads: u64,
    pub overlay_hits: u64,
    pub cached_reads: u64,
}

/// Storage range held in memory for every column
#[derive(Debug, Default)]
struct SharedWindow {
    start: usize,
    end: usize,
    columns: Vec<Vec<f32>>,
}

impl SharedWindow {
    fn contains(&self, pos: usize) -> bool {
        pos >= self.start && pos < self.end
    }

    fn invalidate(&mut self) {
        self.start = 0;
        self.end = 0;
    }
}

pub struct IntensityCache {
    config: IntensityCacheConfig,
    layout_order: Vec<usize>,
    cel_names: Vec<String>,
    store_path: PathBuf,
    /// Deletes the backing file on close when the cache is ephemeral
    temp: Option<TempPath>,
    file: Option<StoreFile>,
    state: CacheState,

    /// Storage position -> raw probe index
    order: Vec<usize>,
    /// Raw probe index -> storage position
    map: Vec<Option<usize>>,
    unique_len: usize,
    /// Raw probes repeated in the layout order
    duplicates: Vec<usize>,

    chip_channel_map: Vec<Vec<usize>>,
    /// Columns written so far, indexed by chip
    written: Vec<bool>,
    overlay: Vec<AHashMap<usize, f32>>,
    window: SharedWindow,
    stats: CacheStats,
    closed: bool,
}

impl IntensityCache {
    /// Create an empty cache backed by a new file in `config.temp_dir`
    pub fn new(layout_order: Vec<usize>, cel_names: Vec<String>, config: IntensityCacheConfig) -> Result<Self> {
        config.check()?;
        if !config.temp_dir.exists() {
            std::fs::create_dir_all(&config.temp_dir)?;
        }

        let temp = tempfile::Builder::new()
            .prefix(&config.temp_prefix)
            .suffix(".cst")
            .tempfile_in(&config.temp_dir)?
            .into_temp_path();
        let (store_path, temp) = if config.ephemeral {
            (temp.to_path_buf(), Some(temp))
        } else {
            (temp.keep().map_err(|e| StoreError::Io(e.error))?, None)
        };
        info!(
            "Intensity cache at {:?} ({} chips expected, budget {} values)",
            store_path,
            cel_names.len(),
            config.cache_budget
        );

        Ok(IntensityCache {
            config,
            layout_order,
            cel_names,
            store_path,
            temp,
            file: None,
            state: CacheState::Uninitialized,
            order: Vec::new(),
            map: Vec::new(),
            unique_len: 0,
            duplicates: Vec::new(),
            chip_channel_map: Vec::new(),
            written: Vec::new(),
            overlay: Vec::new(),
            window: SharedWindow::default(),
            stats: CacheStats::default(),
            closed: false,
        })
    }

    /// Store one chip's intensities, given in raw probe order.
    ///
    /// The first call fixes the probe remap from the layout order; every
    /// later call must supply the same number of probes.
    pub fn set_probe_intensity(&mut self, chip: usize, raw: &[f32]) -> Result<()> {
        self.check_open()?;
        if raw.is_empty() {
            return Err(StoreError::InvalidState(format!("no intensities given for chip {}", chip)));
        }
        if self.map.is_empty() {
            self.build_remap(raw.len())?;
        } else if raw.len() != self.map.len() {
            return Err(StoreError::InvalidState(format!(
                "chip {} has {} probes, expected {}",
                chip,
                raw.len(),
                self.map.len()
            )));
        }

        if self.written.len() <= chip {
            self.written.resize(chip + 1, false);
        }
        if self.config.overlay_duplicates && !self.duplicates.is_empty() {
            if self.overlay.len() <= chip {
                self.overlay.resize_with(chip + 1, AHashMap::new);
            }
            self.overlay[chip] = self.duplicates.iter().map(|&probe| (probe, raw[probe])).collect();
        }

        let write_len = if self.config.store_all_intensities {
            self.order.len()
        } else {
            self.unique_len
        };
        let reordered: Vec<f32> = self.order[..write_len].iter().map(|&probe| raw[probe]).collect();

        let vector = self.open_column(chip, true)?;
        vector.resize(reordered.len() as u64)?;
        vector.write_array(0, &reordered)?;

        self.written[chip] = true;
        self.window.invalidate();
        self.state = CacheState::Streaming;
        debug!("Stored {} intensities for chip {}", reordered.len(), chip);
        Ok(())
    }

    /// Intensity of raw probe `probe` for a chip and channel
    pub fn get_probe_intensity(&mut self, probe: usize, chip: usize, channel: usize) -> Result<f32> {
        self.check_open()?;
        let column = self.column_for(chip, channel)?;
        if !self.written.get(column).copied().unwrap_or(false) {
            return Err(StoreError::InvalidState(format!("no data written for column {}", column)));
        }
        self.state = CacheState::RandomAccess;

        if let Some(&value) = self.overlay.get(column).and_then(|o| o.get(&probe)) {
            self.stats.overlay_hits += 1;
            return Ok(value);
        }

        let pos = self.position(probe)?;
        if !self.window.contains(pos) {
            self.reload(pos)?;
        }
        self.stats.cached_reads += 1;
        self.window
            .columns
            .get(column)
            .and_then(|values| values.get(pos - self.window.start))
            .copied()
            .ok_or_else(|| StoreError::InvalidState(format!("column {} missing from window", column)))
    }

    /// One column in raw probe order; probes without a storage slot are NaN
    pub fn get_cel_data(&mut self, column: usize) -> Result<Vec<f32>> {
        self.check_open()?;
        if !self.written.get(column).copied().unwrap_or(false) {
            return Err(StoreError::InvalidState(format!("no data written for column {}", column)));
        }
        let vector = self.open_column(column, false)?;
        let stored: Vec<f32> = vector.read_array(0, vector.reserved() as usize)?;

        Ok(self
            .map
            .iter()
            .map(|pos| pos.and_then(|p| stored.get(p).copied()).unwrap_or(f32::NAN))
            .collect())
    }

    /// `get_cel_data` addressed by chip and channel
    pub fn get_cel_data_for(&mut self, chip: usize, channel: usize) -> Result<Vec<f32>> {
        let column = self.column_for(chip, channel)?;
        self.get_cel_data(column)
    }

    /// Route (chip, channel) pairs to columns: `map[chip][channel]`
    pub fn set_chip_channel_map(&mut self, map: Vec<Vec<usize>>) {
        self.chip_channel_map = map;
    }

    pub fn channel_count(&self) -> usize {
        self.chip_channel_map.first().map_or(1, Vec::len)
    }

    /// Number of columns (chip × channel data sets) written
    pub fn cel_data_set_count(&self) -> usize {
        self.written.len()
    }

    pub fn cel_file_count(&self) -> usize {
        self.cel_names.len()
    }

    pub fn cel_file_names(&self) -> &[String] {
        &self.cel_names
    }

    /// Raw probes per chip
    pub fn probe_count(&self) -> usize {
        self.map.len()
    }

    /// Storage slots per column
    pub fn storage_len(&self) -> usize {
        self.order.len()
    }

    /// Distinct probes of the layout order
    pub fn unique_len(&self) -> usize {
        self.unique_len
    }

    /// Storage order as raw probe indices
    pub fn storage_order(&self) -> &[usize] {
        &self.order
    }

    /// Only allowed before the remap is built
    pub fn set_store_all_intensities(&mut self, flag: bool) -> Result<()> {
        if self.state != CacheState::Uninitialized {
            return Err(StoreError::InvalidState(
                "store-all must be set before the first chip is stored".to_string(),
            ));
        }
        self.config.store_all_intensities = flag;
        Ok(())
    }

    /// A new empty cache with this cache's remap, names and channel map
    pub fn copy_metadata_to_empty(&self) -> Result<IntensityCache> {
        let mut copy = IntensityCache::new(self.layout_order.clone(), self.cel_names.clone(), self.config.clone())?;
        copy.order = self.order.clone();
        copy.map = self.map.clone();
        copy.unique_len = self.unique_len;
        copy.duplicates = self.duplicates.clone();
        copy.chip_channel_map = self.chip_channel_map.clone();
        if !copy.map.is_empty() {
            copy.state = CacheState::RemapBuilt;
        }
        Ok(copy)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn state(&self) -> CacheState {
        self.state
    }

    pub fn config(&self) -> &IntensityCacheConfig {
        &self.config
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Close the backing store and, for ephemeral caches, delete it.
    ///
    /// Deletion failures are logged. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.window = SharedWindow::default();

        let result = match self.file.take() {
            Some(mut file) => file.close(),
            None => Ok(()),
        };
        if let Some(temp) = self.temp.take() {
            if let Err(e) = temp.close() {
                warn!("Can't delete intensity cache {:?}: {}", self.store_path, e);
            }
        }
        result
    }

    /// Walk the layout order once: first occurrences get the next storage
    /// position, repeats become duplicates.
    fn build_remap(&mut self, probe_count: usize) -> Result<()> {
        let mut map = vec![None; probe_count];
        let mut order = Vec::with_capacity(self.layout_order.len().min(probe_count));
        let mut duplicates = Vec::new();

        for &probe in &self.layout_order {
            let slot = map.get_mut(probe).ok_or_else(|| {
                StoreError::InvalidState(format!(
                    "layout probe {} is outside the {} probes of a chip",
                    probe, probe_count
                ))
            })?;
            if slot.is_none() {
                *slot = Some(order.len());
                order.push(probe);
            } else {
                duplicates.push(probe);
            }
        }
        duplicates.sort_unstable();
        duplicates.dedup();

        let unique_len = order.len();
        if self.config.store_all_intensities {
            for (probe, slot) in map.iter_mut().enumerate() {
                if slot.is_none() {
                    *slot = Some(order.len());
                    order.push(probe);
                }
            }
        }

        debug!(
            "Probe remap: {} probes, {} unique in layout, {} stored, {} duplicates",
            probe_count,
            unique_len,
            order.len(),
            duplicates.len()
        );
        self.map = map;
        self.order = order;
        self.unique_len = unique_len;
        self.duplicates = duplicates;
        self.state = CacheState::RemapBuilt;
        Ok(())
    }

    fn column_for(&self, chip: usize, channel: usize) -> Result<usize> {
        if self.chip_channel_map.is_empty() {
            if channel != 0 {
                return Err(StoreError::InvalidState(format!(
                    "channel {} requested without a chip/channel map",
                    channel
                )));
            }
            return Ok(chip);
        }
        let channels = self
            .chip_channel_map
            .get(chip)
            .ok_or_else(|| StoreError::out_of_bounds(chip as u64, self.chip_channel_map.len() as u64))?;
        channels
            .get(channel)
            .copied()
            .ok_or_else(|| StoreError::out_of_bounds(channel as u64, channels.len() as u64))
    }

    fn position(&self, probe: usize) -> Result<usize> {
        match self.map.get(probe) {
            Some(Some(pos)) => Ok(*pos),
            Some(None) => Err(StoreError::InvalidState(format!(
                "probe {} has no storage position; check the layout",
                probe
            ))),
            None => Err(StoreError::out_of_bounds(probe as u64, self.map.len() as u64)),
        }
    }

    /// Window length per column for the current number of columns
    fn window_rows(&self) -> usize {
        let columns = self.written.len().max(1) as u64;
        let size = self.order.len() as u64;
        if self.config.cache_budget > size * columns {
            return self.order.len();
        }
        (self.config.cache_budget / columns).max(1) as usize
    }

    /// Load `[start, start + rows)` of every column
    fn reload(&mut self, start: usize) -> Result<()> {
        let rows = self.window_rows();
        self.window.invalidate();
        let mut columns = std::mem::take(&mut self.window.columns);
        columns.resize_with(self.written.len(), Vec::new);

        for (chip, values) in columns.iter_mut().enumerate() {
            values.clear();
            values.resize(rows, WINDOW_PAD);
            if !self.written[chip] {
                continue;
            }
            let vector = self.open_column(chip, false)?;
            let count = rows.min((vector.reserved() as usize).saturating_sub(start));
            if count > 0 {
                let stored: Vec<f32> = vector.read_array(start as u64, count)?;
                values[..stored.len()].copy_from_slice(&stored);
            }
        }

        self.window = SharedWindow {
            start,
            end: start + rows,
            columns,
        };
        self.stats.reloads += 1;
        debug!("Intensity window -> [{}, {})", start, start + rows);
        Ok(())
    }

    fn open_column(&mut self, column: usize, create: bool) -> Result<&mut Vector> {
        if self.file.is_none() {
            let file = StoreFile::open_with(&self.store_path, OpenFlags::REPLACE, StoreOptions::default())?;
            self.file = Some(file);
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| StoreError::InvalidState("intensity store is closed".to_string()))?;
        let flags = if create { OpenFlags::OPEN_OR_CREATE } else { OpenFlags::OPEN };
        file.open_vector(&column.to_string(), Some(Dtype::Float), flags)
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(StoreError::InvalidState("intensity cache is closed".to_string()));
        }
        Ok(())
    }
}

impl Drop for IntensityCache {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close intensity cache {:?}: {}", self.store_path, e);
        }
    }
}

/// Fluent construction of an [`IntensityCache`]
#[derive(Debug, Clone, Default)]
pub struct IntensityCacheBuilder {
    config: IntensityCacheConfig,
    layout_order: Vec<usize>,
    cel_names: Vec<String>,
}

impl IntensityCacheBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a loaded configuration
    pub fn with_config(config: IntensityCacheConfig) -> Self {
        IntensityCacheBuilder {
            config,
            ..Self::default()
        }
    }

    /// Desired probe read order (raw indices; repeats allowed)
    pub fn layout_order(mut self, order: Vec<usize>) -> Self {
        self.layout_order = order;
        self
    }

    pub fn cel_names(mut self, names: Vec<String>) -> Self {
        self.cel_names = names;
        self
    }

    pub fn cache_budget(mut self, values: u64) -> Self {
        self.config.cache_budget = values;
        self
    }

    pub fn temp_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.temp_dir = dir.into();
        self
    }

    pub fn temp_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.temp_prefix = prefix.into();
        self
    }

    pub fn store_all_intensities(mut self, flag: bool) -> Self {
        self.config.store_all_intensities = flag;
        self
    }

    pub fn overlay_duplicates(mut self, flag: bool) -> Self {
        self.config.overlay_duplicates = flag;
        self
    }

    /// Keep the backing file after close
    pub fn keep_file(mut self) -> Self {
        self.config.ephemeral = false;
        self
    }

    pub fn build(self) -> Result<IntensityCache> {
        IntensityCache::new(self.layout_order, self.cel_names, self.config)
    }
}
