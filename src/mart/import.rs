//! Bulk import of tab-separated intensity tables
//!
//! ```text
//! #%chip-type=HG-U133A
//! # comment lines are ignored
//! probe_id    a.cel   b.cel
//! 1007_s_at-1 812.5   799.0
//! 1053_at-3   95.25   101.5
//! ```
//!
//! Rows naming a probe the layout does not know are skipped. The first
//! `max_warnings` of them are logged individually; the rest are counted and
//! reported once by [`ImportStats::finish`].

use crate::core::error::{Result, StoreError};
use crate::mart::cache::IntensityCache;
use ahash::AHashMap;
use std::io::BufRead;
use tracing::{info, warn};

/// Default number of skipped rows reported individually
pub const DEFAULT_MAX_WARNINGS: usize = 10;

/// Probe names in raw index order
#[derive(Debug, Clone, Default)]
pub struct ProbeLayout {
    names: Vec<String>,
    index: AHashMap<String, usize>,
}

impl ProbeLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut layout = Self::new();
        for name in names {
            layout.add(name);
        }
        layout
    }

    /// Register a probe, returning its raw index; known names keep theirs
    pub fn add<S: Into<String>>(&mut self, name: S) -> usize {
        let name = name.into();
        if let Some(&idx) = self.index.get(&name) {
            return idx;
        }
        let idx = self.names.len();
        self.index.insert(name.clone(), idx);
        self.names.push(name);
        idx
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn name(&self, idx: usize) -> Option<&str> {
        self.names.get(idx).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Counters for one import run
#[derive(Debug, Clone)]
pub struct ImportStats {
    pub rows_read: usize,
    pub imported: usize,
    pub skipped: usize,
    pub max_warnings: usize,
    /// `#%key=value` lines, in file order
    pub headers: Vec<(String, String)>,
    /// Chip column names from the header row
    pub chips: Vec<String>,
}

impl Default for ImportStats {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WARNINGS)
    }
}

impl ImportStats {
    pub fn new(max_warnings: usize) -> Self {
        ImportStats {
            rows_read: 0,
            imported: 0,
            skipped: 0,
            max_warnings,
            headers: Vec::new(),
            chips: Vec::new(),
        }
    }

    fn skip(&mut self, line: usize, probe: &str) {
        self.skipped += 1;
        if self.skipped <= self.max_warnings {
            warn!("Line {}: probe '{}' is not in the layout; row skipped", line, probe);
        }
    }

    /// Skipped rows that were not logged individually
    pub fn suppressed(&self) -> usize {
        self.skipped.saturating_sub(self.max_warnings)
    }

    /// Log the run summary, including the count of suppressed warnings
    pub fn finish(&self) {
        if self.suppressed() > 0 {
            warn!("{} more rows with unknown probes were skipped", self.suppressed());
        }
        info!(
            "Imported {} of {} rows for {} chips ({} skipped)",
            self.imported,
            self.rows_read,
            self.chips.len(),
            self.skipped
        );
    }
}

/// Read an intensity table and store each chip column in `cache`.
///
/// Chip `i` is the `i`-th data column. Probes of the layout missing from
/// the table are stored as NaN. Returns the number of chips stored.
pub fn import_intensity_table<R: BufRead>(
    reader: R,
    layout: &ProbeLayout,
    cache: &mut IntensityCache,
    stats: &mut ImportStats,
) -> Result<usize> {
    if layout.is_empty() {
        return Err(StoreError::InvalidState("probe layout is empty".to_string()));
    }

    let mut columns: Vec<Vec<f32>> = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line_no = n + 1;
        let line = line?;
        let line = line.trim_end_matches('\r');

        if let Some(header) = line.strip_prefix("#%") {
            let (key, value) = header.split_once('=').ok_or_else(|| StoreError::Parse {
                line: line_no,
                message: format!("header '{}' has no '='", header),
            })?;
            stats.headers.push((key.trim().to_string(), value.trim().to_string()));
            continue;
        }
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }

        let mut fields = line.split('\t');
        let probe = fields.next().unwrap_or_default().trim();

        if stats.chips.is_empty() {
            stats.chips = fields.map(|f| f.trim().to_string()).collect();
            if stats.chips.is_empty() {
                return Err(StoreError::Parse {
                    line: line_no,
                    message: "column header names no chips".to_string(),
                });
            }
            columns = vec![vec![f32::NAN; layout.len()]; stats.chips.len()];
            continue;
        }

        stats.rows_read += 1;
        let values = fields
            .map(|f| {
                f.trim().parse::<f32>().map_err(|e| StoreError::Parse {
                    line: line_no,
                    message: format!("bad intensity '{}': {}", f.trim(), e),
                })
            })
            .collect::<Result<Vec<f32>>>()?;
        if values.len() != columns.len() {
            return Err(StoreError::Parse {
                line: line_no,
                message: format!("expected {} values, found {}", columns.len(), values.len()),
            });
        }

        let Some(idx) = layout.index_of(probe) else {
            stats.skip(line_no, probe);
            continue;
        };
        for (column, value) in columns.iter_mut().zip(values) {
            column[idx] = value;
        }
        stats.imported += 1;
    }

    if columns.is_empty() {
        return Err(StoreError::Parse {
            line: 0,
            message: "no column header row".to_string(),
        });
    }
    for (chip, column) in columns.iter().enumerate() {
        cache.set_probe_intensity(chip, column)?;
    }
    Ok(columns.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mart::cache::IntensityCacheBuilder;
    use std::io::Cursor;
    use tempfile::TempDir;

    const TABLE: &str = "#%chip-type=HG-U133A\n\
                         # exported by a test\n\
                         probe_id\ta.cel\tb.cel\n\
                         p0\t1.0\t10.0\n\
                         ghost\t5.0\t5.0\n\
                         p2\t3.0\t30.0\n\
                         p1\t2.0\t20.0\n";

    fn cache(dir: &TempDir) -> IntensityCache {
        IntensityCacheBuilder::new()
            .temp_dir(dir.path())
            .layout_order(vec![2, 0, 1])
            .build()
            .unwrap()
    }

    #[test]
    fn test_import_reorders_by_layout() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache(&dir);
        let layout = ProbeLayout::from_names(["p0", "p1", "p2"]);
        let mut stats = ImportStats::default();

        let chips = import_intensity_table(Cursor::new(TABLE), &layout, &mut cache, &mut stats).unwrap();
        stats.finish();

        assert_eq!(chips, 2);
        assert_eq!(stats.rows_read, 4);
        assert_eq!(stats.imported, 3);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.headers, vec![("chip-type".to_string(), "HG-U133A".to_string())]);
        assert_eq!(stats.chips, vec!["a.cel", "b.cel"]);
        assert_eq!(cache.get_probe_intensity(1, 1, 0).unwrap(), 20.0);
        assert_eq!(cache.get_cel_data(0).unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_warnings_are_capped() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache(&dir);
        let layout = ProbeLayout::from_names(["p0", "p1", "p2"]);
        let mut text = String::from("probe_id\tonly.cel\n");
        for i in 0..7 {
            text.push_str(&format!("unknown{}\t1.0\n", i));
        }
        text.push_str("p0\t1.0\np1\t2.0\np2\t3.0\n");

        let mut stats = ImportStats::new(3);
        import_intensity_table(Cursor::new(text), &layout, &mut cache, &mut stats).unwrap();
        assert_eq!(stats.skipped, 7);
        assert_eq!(stats.suppressed(), 4);
    }

    #[test]
    fn test_malformed_rows_fail_with_line() {
        let dir = TempDir::new().unwrap();
        let mut cache = cache(&dir);
        let layout = ProbeLayout::from_names(["p0"]);

        let bad_number = "probe_id\ta.cel\np0\tlots\n";
        let err = import_intensity_table(Cursor::new(bad_number), &layout, &mut cache, &mut ImportStats::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::Parse { line: 2, .. }));

        let short_row = "probe_id\ta.cel\tb.cel\np0\t1.0\n";
        let err = import_intensity_table(Cursor::new(short_row), &layout, &mut cache, &mut ImportStats::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::Parse { line: 2, .. }));

        let no_header = "# nothing here\n";
        let err = import_intensity_table(Cursor::new(no_header), &layout, &mut cache, &mut ImportStats::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::Parse { line: 0, .. }));
    }

    #[test]
    fn test_layout_indices_are_stable() {
        let mut layout = ProbeLayout::new();
        assert_eq!(layout.add("a"), 0);
        assert_eq!(layout.add("b"), 1);
        assert_eq!(layout.add("a"), 0);
        assert_eq!(layout.len(), 2);
        assert_eq!(layout.name(1), Some("b"));
        assert_eq!(layout.index_of("c"), None);
    }
}
