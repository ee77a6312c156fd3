//! Intensity cache integration tests

use chipstore::{
    import_intensity_table, CacheState, Dtype, ImportStats, IntensityCacheBuilder, IntensityCacheConfig,
    OpenFlags, ProbeLayout, StoreError, StoreFile,
};
use std::io::Cursor;
use tempfile::TempDir;

#[test]
fn test_repeated_layout_probes_share_one_slot() {
    let dir = TempDir::new().unwrap();
    let mut cache = IntensityCacheBuilder::new()
        .temp_dir(dir.path())
        .layout_order(vec![3, 1, 3, 2])
        .cel_names(vec!["a.cel".into(), "b.cel".into()])
        .build()
        .unwrap();
    assert_eq!(cache.state(), CacheState::Uninitialized);

    cache.set_probe_intensity(0, &[10.0, 11.0, 12.0, 13.0]).unwrap();
    cache.set_probe_intensity(1, &[20.0, 21.0, 22.0, 23.0]).unwrap();

    assert_eq!(cache.storage_order(), &[3, 1, 2]);
    assert_eq!(cache.unique_len(), 3);
    assert_eq!(cache.probe_count(), 4);
    assert_eq!(cache.cel_data_set_count(), 2);
    assert_eq!(cache.cel_file_names(), &["a.cel".to_string(), "b.cel".to_string()]);

    assert_eq!(cache.get_probe_intensity(3, 0, 0).unwrap(), 13.0);
    assert_eq!(cache.get_probe_intensity(1, 1, 0).unwrap(), 21.0);
    assert_eq!(cache.get_probe_intensity(2, 1, 0).unwrap(), 22.0);
    assert_eq!(cache.state(), CacheState::RandomAccess);
    assert!(cache.stats().overlay_hits >= 1);

    // Probe 0 is not in the layout
    assert!(matches!(cache.get_probe_intensity(0, 0, 0), Err(StoreError::InvalidState(_))));
    assert!(matches!(cache.get_probe_intensity(9, 0, 0), Err(StoreError::OutOfBounds { .. })));
    assert!(matches!(
        cache.set_probe_intensity(2, &[1.0, 2.0]),
        Err(StoreError::InvalidState(_))
    ));

    let raw = cache.get_cel_data(1).unwrap();
    assert!(raw[0].is_nan());
    assert_eq!(&raw[1..], &[21.0, 22.0, 23.0]);
}

#[test]
fn test_walking_a_probe_across_chips_reloads_once() {
    let dir = TempDir::new().unwrap();
    let probes = 100;
    let chips = 8;
    let mut cache = IntensityCacheBuilder::new()
        .temp_dir(dir.path())
        .layout_order((0..probes).collect())
        .cache_budget(80)
        .build()
        .unwrap();

    for chip in 0..chips {
        let raw: Vec<f32> = (0..probes).map(|p| (chip * 1000 + p) as f32).collect();
        cache.set_probe_intensity(chip, &raw).unwrap();
    }

    // 80 values over 8 columns: windows of 10 probes
    for chip in 0..chips {
        assert_eq!(cache.get_probe_intensity(5, chip, 0).unwrap(), (chip * 1000 + 5) as f32);
    }
    assert_eq!(cache.stats().reloads, 1);

    for chip in 0..chips {
        assert_eq!(cache.get_probe_intensity(95, chip, 0).unwrap(), (chip * 1000 + 95) as f32);
    }
    assert_eq!(cache.stats().reloads, 2);
}

#[test]
fn test_kept_store_is_a_regular_container() {
    let dir = TempDir::new().unwrap();
    let path = {
        let mut cache = IntensityCacheBuilder::new()
            .temp_dir(dir.path())
            .temp_prefix("kept.")
            .layout_order(vec![2, 0])
            .store_all_intensities(true)
            .keep_file()
            .build()
            .unwrap();
        cache.set_probe_intensity(0, &[1.0, 2.0, 3.0]).unwrap();
        let path = cache.store_path().to_path_buf();
        cache.close().unwrap();
        path
    };

    assert!(path.file_name().unwrap().to_string_lossy().starts_with("kept."));
    let mut file = StoreFile::open(&path, OpenFlags::OPEN | OpenFlags::READONLY).unwrap();
    let column = file.open_vector("0", Some(Dtype::Float), OpenFlags::OPEN).unwrap();
    // Layout probes first, then the rest in raw order
    assert_eq!(column.read_array::<f32>(0, 3).unwrap(), vec![3.0, 1.0, 2.0]);
}

#[test]
fn test_import_with_config_from_toml() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("cache.toml");
    std::fs::write(
        &config_path,
        format!(
            "cache_budget = 16\ntemp_dir = {:?}\noverlay_duplicates = false\n",
            dir.path().join("scratch")
        ),
    )
    .unwrap();

    let config = IntensityCacheConfig::load(&config_path).unwrap();
    assert_eq!(config.cache_budget, 16);
    let mut cache = IntensityCacheBuilder::with_config(config)
        .layout_order(vec![1, 0, 1])
        .build()
        .unwrap();
    assert!(dir.path().join("scratch").is_dir());

    let layout = ProbeLayout::from_names(["pm-1", "pm-2"]);
    let table = "probe_id\tx.cel\ty.cel\tz.cel\npm-2\t5.0\t6.0\t7.0\npm-1\t1.0\t2.0\t3.0\n";
    let mut stats = ImportStats::default();
    let chips = import_intensity_table(Cursor::new(table), &layout, &mut cache, &mut stats).unwrap();
    stats.finish();

    assert_eq!(chips, 3);
    assert_eq!(cache.get_probe_intensity(1, 2, 0).unwrap(), 7.0);
    assert_eq!(cache.get_probe_intensity(0, 0, 0).unwrap(), 1.0);
    assert_eq!(cache.stats().overlay_hits, 0);

    let empty = cache.copy_metadata_to_empty().unwrap();
    assert_eq!(empty.state(), CacheState::RemapBuilt);
    assert_eq!(empty.storage_order(), cache.storage_order());
    assert_ne!(empty.store_path(), cache.store_path());
}
