//! Directory discovery, filters, run logs and the library entry point on real temp trees.

mod common;

use common::{pattern, temp_dir, write_file};
use fanhash::engine::ExtensionFilter;
use fanhash::error::DiscoveryError;
use fanhash::pipeline::{DiscoveryOpts, PartitionSet, StreamProvider, WalkMode};
use fanhash::utils::{RunLog, load_skip_list};
use fanhash::{ConsumerValue, DigestOpts, FileDigests};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

fn serial(recursive: bool) -> DiscoveryOpts {
    DiscoveryOpts {
        recursive,
        walk_mode: WalkMode::Serial,
        ..Default::default()
    }
}

/// Discover under `root` with `accept`, returning totals, queued paths and error count.
fn discover(
    root: &Path,
    opts: &DiscoveryOpts,
    accept: &mut dyn FnMut(&Path) -> bool,
) -> (fanhash::DiscoveryTotals, usize, usize) {
    let mut provider = StreamProvider::new(&PartitionSet::global_only(1).unwrap());
    let mut errors = 0;
    let totals = provider.discover(&[root], opts, accept, &mut |_: DiscoveryError| errors += 1);
    let queued = provider.admission().stats().queued();
    (totals, queued, errors)
}

// --- traversal ---

#[test]
fn test_discovery_applies_filters_and_skip_list() {
    let dir = temp_dir("discover-filters");
    write_file(&dir, "a.mkv", &pattern(100));
    let skipped = write_file(&dir, "b.mkv", &pattern(200));
    write_file(&dir, "c.tmp", &pattern(300));
    write_file(&dir, "sub/d.mp4", &pattern(400));

    let skip_log = dir.join("logs/skip.txt");
    fs::create_dir_all(skip_log.parent().unwrap()).unwrap();
    fs::write(&skip_log, format!("{}\n", skipped.display())).unwrap();
    let skip = load_skip_list(&skip_log).unwrap();
    let filter: ExtensionFilter = "-tmp,txt".parse().unwrap();

    let (totals, queued, errors) = discover(&dir, &serial(true), &mut |p: &Path| {
        filter.accepts(p) && !skip.contains(&p.display().to_string())
    });
    assert_eq!(totals.file_count, 2);
    assert_eq!(totals.total_bytes, 500);
    assert_eq!(queued, 2);
    assert_eq!(errors, 0);
}

#[test]
fn test_non_recursive_lists_direct_children_only() {
    let dir = temp_dir("discover-flat");
    write_file(&dir, "top.bin", &pattern(10));
    write_file(&dir, "nested/deep.bin", &pattern(20));

    let (totals, _, _) = discover(&dir, &serial(false), &mut |_: &Path| true);
    assert_eq!(totals.file_count, 1);
    assert_eq!(totals.total_bytes, 10);

    let (totals, _, _) = discover(&dir, &serial(true), &mut |_: &Path| true);
    assert_eq!(totals.file_count, 2);
}

#[test]
fn test_parallel_walk_finds_same_files() {
    let dir = temp_dir("discover-parallel");
    for i in 0..20 {
        write_file(&dir, &format!("d{}/f{}.bin", i % 4, i), &pattern(i + 1));
    }
    let opts = DiscoveryOpts {
        walk_mode: WalkMode::Parallel,
        ..Default::default()
    };
    let (totals, queued, errors) = discover(&dir, &opts, &mut |_: &Path| true);
    assert_eq!(totals.file_count, 20);
    assert_eq!(totals.total_bytes, (1..=20).sum::<u64>());
    assert_eq!(queued, 20);
    assert_eq!(errors, 0);
}

#[test]
fn test_missing_root_reports_error_and_continues() {
    let dir = temp_dir("discover-missing");
    write_file(&dir, "ok.bin", &pattern(5));
    let missing = dir.join("does-not-exist");

    let mut provider = StreamProvider::new(&PartitionSet::global_only(1).unwrap());
    let mut errors: Vec<Option<PathBuf>> = Vec::new();
    let totals = provider.discover(
        &[missing.clone(), dir.clone()],
        &serial(true),
        &mut |_: &Path| true,
        &mut |e: DiscoveryError| errors.push(e.path),
    );
    assert_eq!(errors, vec![Some(missing)]);
    assert_eq!(totals.file_count, 1);
}

#[test]
fn test_root_that_is_a_file() {
    let dir = temp_dir("discover-file-root");
    let file = write_file(&dir, "single.bin", &pattern(77));
    let (totals, queued, _) = discover(&file, &serial(true), &mut |_: &Path| true);
    assert_eq!(totals.file_count, 1);
    assert_eq!(totals.total_bytes, 77);
    assert_eq!(queued, 1);
}

#[test]
fn test_files_land_in_matching_partition() {
    let dir = temp_dir("discover-partition");
    write_file(&dir, "fast/a.bin", &pattern(1));
    write_file(&dir, "fast/b.bin", &pattern(1));
    write_file(&dir, "slow/c.bin", &pattern(1));

    let set = PartitionSet::new(
        2,
        vec![fanhash::pipeline::PathPartition::new(
            dir.join("slow").display().to_string(),
            1,
        )],
    )
    .unwrap();
    let mut provider = StreamProvider::new(&set);
    provider.discover(
        &[&dir],
        &serial(true),
        &mut |_: &Path| true,
        &mut |_: DiscoveryError| {},
    );
    let stats = provider.admission().stats();
    assert_eq!(stats.partitions[0].queued, 1);
    assert_eq!(stats.partitions[1].queued, 2);
}

// --- run logs ---

#[test]
fn test_processed_log_appends_lines() {
    let dir = temp_dir("processed-log");
    let log_path = dir.join("nested/done.txt");
    {
        let log = RunLog::open(&log_path).unwrap();
        log.append(Path::new("/x/one.bin")).unwrap();
        log.append(Path::new("/x/two.bin")).unwrap();
    }
    {
        let log = RunLog::open(&log_path).unwrap();
        log.append(Path::new("/x/three.bin")).unwrap();
    }
    let skip = load_skip_list(&log_path).unwrap();
    let expected: HashSet<String> = ["/x/one.bin", "/x/two.bin", "/x/three.bin"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(skip, expected);
}

#[test]
fn test_missing_skip_list_is_empty() {
    let dir = temp_dir("skip-missing");
    assert!(load_skip_list(&dir.join("nope.txt")).unwrap().is_empty());
}

// --- library entry point ---

#[test]
fn test_digest_paths_end_to_end() {
    let dir = temp_dir("digest-paths");
    let a = pattern(3000);
    let b = pattern(12_345);
    write_file(&dir, "a.bin", &a);
    write_file(&dir, "sub/b.bin", &b);

    let opts = DigestOpts {
        consumers: vec!["crc32".to_string(), "SHA256".to_string()],
        partitions: Some("2".to_string()),
        buffer_length: 64 * 1024,
        read_window: fanhash::engine::ReadWindow::new(1024, 8192),
        ..Default::default()
    };
    let mut seen: Vec<FileDigests> = Vec::new();
    let summary = fanhash::digest_paths(&[&dir], &opts, |d| seen.push(d.clone())).unwrap();

    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.bytes, 15_345);
    assert_eq!(seen.len(), 2);
    for d in &seen {
        let data = if d.path.ends_with("a.bin") { &a } else { &b };
        assert_eq!(d.size, data.len() as u64);
        assert_eq!(
            d.get("CRC32"),
            Some(&ConsumerValue::Digest(
                crc32fast::hash(data).to_be_bytes().to_vec()
            ))
        );
        assert_eq!(d.results.len(), 2);
    }
}

#[test]
fn test_digest_paths_bad_partition_string() {
    let dir = temp_dir("digest-bad-partitions");
    let opts = DigestOpts {
        partitions: Some("0".to_string()),
        ..Default::default()
    };
    assert!(fanhash::digest_paths(&[&dir], &opts, |_| {}).is_err());
}
