//! Settings layering: defaults, config file, CLI flags, validation and the CLI entry point.

mod common;

use clap::Parser;
use fanhash::engine::cli::{apply_cli_to_settings, load_settings};
use fanhash::engine::{
    Cli, ExtensionFilter, NullStreamTest, ReadWindow, Settings, SettingsError, handle_run,
};
use fanhash::error::{DiscoveryError, ErrorReport};
use fanhash::pipeline::{PartitionSet, WalkMode};
use fanhash::utils::fanhash_toml::{FanhashToml, apply_file_to_settings, load_fanhash_toml};
use fanhash::{FileError, Phase};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const MIB: usize = 1 << 20;

fn cli(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("fanhash").chain(args.iter().copied())).unwrap()
}

// --- extension filter ---

#[test]
fn test_extension_allow_list() {
    let f: ExtensionFilter = "mkv, .MP4".parse().unwrap();
    assert!(f.accepts(Path::new("/a/movie.mkv")));
    assert!(f.accepts(Path::new("/a/clip.mp4")));
    assert!(!f.accepts(Path::new("/a/notes.txt")));
    assert!(!f.accepts(Path::new("/a/README")));
}

#[test]
fn test_extension_deny_list() {
    let f: ExtensionFilter = "-tmp,part".parse().unwrap();
    assert!(!f.accepts(Path::new("/a/download.PART")));
    assert!(!f.accepts(Path::new("/a/x.tmp")));
    assert!(f.accepts(Path::new("/a/movie.mkv")));
    assert!(f.accepts(Path::new("/a/README")));
}

#[test]
fn test_extension_empty_means_all() {
    assert_eq!("".parse::<ExtensionFilter>().unwrap(), ExtensionFilter::All);
    assert_eq!("-".parse::<ExtensionFilter>().unwrap(), ExtensionFilter::All);
    assert!("a/b".parse::<ExtensionFilter>().is_err());
}

// --- null stream ---

#[test]
fn test_null_stream_spec() {
    let t: NullStreamTest = "100:64:4".parse().unwrap();
    assert_eq!(
        t,
        NullStreamTest {
            count: 100,
            length: 64 * 1024 * 1024,
            parallel: 4
        }
    );
    assert_eq!(t.to_string(), "100:64:4");
    assert!("1:1".parse::<NullStreamTest>().is_err());
    assert!("1:1:0".parse::<NullStreamTest>().is_err());
    assert!("1:1:1:1".parse::<NullStreamTest>().is_err());
    assert!("a:1:1".parse::<NullStreamTest>().is_err());
}

// --- validation ---

#[test]
fn test_validate() {
    let mut s = Settings {
        roots: vec![PathBuf::from("/data")],
        ..Default::default()
    };
    assert_eq!(s.validate(), Ok(()));

    s.read_window = ReadWindow::new(2 * MIB, MIB);
    assert_eq!(
        s.validate(),
        Err(SettingsError::ReadWindow {
            min: 2 * MIB,
            max: MIB
        })
    );

    s.read_window = ReadWindow::new(MIB, 8 * MIB);
    s.buffer_length = 4 * MIB;
    assert!(matches!(
        s.validate(),
        Err(SettingsError::BufferTooSmall { .. })
    ));

    let empty = Settings::default();
    assert_eq!(empty.validate(), Err(SettingsError::NoRoots));
}

// --- command line ---

#[test]
fn test_cli_flags_override_defaults() {
    let c = cli(&[
        "/data",
        "/media",
        "-c",
        "crc32,sha1",
        "--concurrent",
        "3:/media,1",
        "--recursive",
        "false",
        "--walk",
        "serial",
        "--buffer-length",
        "16",
        "--min-read",
        "1",
        "--max-read",
        "2",
        "--retries",
        "5",
        "--exts",
        "-tmp",
        "-p",
    ]);
    let mut s = Settings::default();
    apply_cli_to_settings(&c, &mut s).unwrap();

    assert_eq!(s.roots, vec![PathBuf::from("/data"), PathBuf::from("/media")]);
    assert_eq!(s.consumers, vec!["crc32", "sha1"]);
    assert_eq!(s.partitions, Some("3:/media,1".parse::<PartitionSet>().unwrap()));
    assert!(!s.recursive);
    assert_eq!(s.walk_mode, WalkMode::Serial);
    assert_eq!(s.buffer_length, 16 * MIB);
    assert_eq!(s.read_window, ReadWindow::new(MIB, 2 * MIB));
    assert_eq!(s.max_retries, 5);
    assert!(!s.extensions.accepts(Path::new("x.tmp")));
    assert!(s.print_hashes);
    assert!(!s.json);
}

#[test]
fn test_done_log_sets_both_logs() {
    let c = cli(&["--done-log", "/tmp/done.txt", "/data"]);
    let mut s = Settings::default();
    apply_cli_to_settings(&c, &mut s).unwrap();
    assert_eq!(s.skip_log, Some(PathBuf::from("/tmp/done.txt")));
    assert_eq!(s.processed_log, Some(PathBuf::from("/tmp/done.txt")));
}

#[test]
fn test_bad_partition_flag_is_an_error() {
    let c = cli(&["--concurrent", "0", "/data"]);
    let mut s = Settings::default();
    assert!(apply_cli_to_settings(&c, &mut s).is_err());
}

// --- config file ---

#[test]
fn test_config_file_then_cli() {
    let file = FanhashToml::parse(
        r#"
[settings]
consumers = ["SHA256"]
concurrent = "2:/mnt/hdd,1"
walk = "parallel"
max_read_mib = 4
retries = 1
exts = "mkv,mp4"
progress = false
"#,
    )
    .unwrap();
    let mut s = Settings::default();
    apply_file_to_settings(&file, &mut s).unwrap();
    assert_eq!(s.consumers, vec!["SHA256"]);
    assert_eq!(s.walk_mode, WalkMode::Parallel);
    assert_eq!(s.read_window.max, 4 * MIB);
    assert_eq!(s.max_retries, 1);
    assert!(!s.progress);
    assert_eq!(s.partitions.as_ref().map(|p| p.global_limit), Some(2));

    // CLI wins over the file; untouched fields keep the file's value.
    apply_cli_to_settings(&cli(&["--retries", "4", "/x"]), &mut s).unwrap();
    assert_eq!(s.max_retries, 4);
    assert_eq!(s.consumers, vec!["SHA256"]);
}

#[test]
fn test_config_rejects_unknown_keys() {
    assert!(FanhashToml::parse("[settings]\nthreads = 4\n").is_err());
}

#[test]
fn test_explicit_config_path_must_exist() {
    let dir = common::temp_dir("config-missing");
    assert!(load_fanhash_toml(Some(dir.join("absent.toml").as_path())).is_err());

    let path = common::write_file(&dir, "fanhash.toml", b"[settings]\njson = true\n");
    let c = Cli {
        config: Some(path),
        paths: vec![dir.clone()],
        ..Default::default()
    };
    let s = load_settings(&c).unwrap();
    assert!(s.json);
    assert_eq!(s.roots, vec![dir]);
}

// --- error reports ---

#[test]
fn test_error_report_format() {
    let e = FileError {
        will_retry: true,
        ..FileError::new(
            Path::new("/a/b.bin"),
            Phase::Reading,
            1,
            io::Error::other("device gone").into(),
        )
    };
    let report = ErrorReport::from(&e);
    assert_eq!(
        report.to_string(),
        "[reading] /a/b.bin (retry 1): device gone, retrying"
    );

    let d = DiscoveryError {
        path: None,
        message: "walk aborted".to_string(),
    };
    assert_eq!(
        ErrorReport::from(&d).to_string(),
        "[discovery]: walk aborted"
    );
}

// --- entry point ---

fn debug_code(code: ExitCode) -> String {
    format!("{code:?}")
}

#[test]
fn test_handle_run_null_stream() {
    let c = cli(&[
        "-c",
        "CRC32",
        "--null-stream",
        "3:1:2",
        "--buffer-length",
        "2",
        "--min-read",
        "1",
        "--max-read",
        "1",
        "--progress",
        "false",
    ]);
    let code = handle_run(&c).unwrap();
    assert_eq!(debug_code(code), debug_code(ExitCode::SUCCESS));
}

#[test]
fn test_handle_run_processed_log() {
    let dir = common::temp_dir("handle-run");
    common::write_file(&dir, "in/a.bin", &common::pattern(100));
    common::write_file(&dir, "in/b.bin", &common::pattern(200));
    let done = dir.join("done.txt");
    let c = Cli {
        paths: vec![dir.join("in")],
        consumers: vec!["SHA1".to_string()],
        concurrent: Some("2".to_string()),
        buffer_length: Some(2),
        min_read: Some(1),
        max_read: Some(1),
        done_log: Some(done.clone()),
        progress: Some(false),
        ..Default::default()
    };
    let code = handle_run(&c).unwrap();
    assert_eq!(debug_code(code), debug_code(ExitCode::SUCCESS));
    let logged = fanhash::utils::load_skip_list(&done).unwrap();
    assert_eq!(logged.len(), 2);

    // Second run skips everything already processed.
    let code = handle_run(&c).unwrap();
    assert_eq!(debug_code(code), debug_code(ExitCode::SUCCESS));
    assert_eq!(fanhash::utils::load_skip_list(&done).unwrap().len(), 2);
    assert_eq!(std::fs::read_to_string(&done).unwrap().lines().count(), 2);
}

#[test]
fn test_done_log_paths_match_across_partition_modes() {
    let dir = common::temp_dir("handle-run-canonical");
    common::write_file(&dir, "in/a.bin", &common::pattern(100));
    common::write_file(&dir, "in/b.bin", &common::pattern(200));
    std::fs::create_dir_all(dir.join("other")).unwrap();
    let done = dir.join("done.txt");
    let explicit = Cli {
        // Non-canonical on purpose.
        paths: vec![dir.join("other").join("..").join("in")],
        consumers: vec!["CRC32".to_string()],
        concurrent: Some("2".to_string()),
        buffer_length: Some(2),
        min_read: Some(1),
        max_read: Some(1),
        done_log: Some(done.clone()),
        progress: Some(false),
        ..Default::default()
    };
    let code = handle_run(&explicit).unwrap();
    assert_eq!(debug_code(code), debug_code(ExitCode::SUCCESS));

    let canonical = dir.join("in").canonicalize().unwrap();
    let logged = fanhash::utils::load_skip_list(&done).unwrap();
    let expected: std::collections::HashSet<String> = ["a.bin", "b.bin"]
        .iter()
        .map(|f| canonical.join(f).display().to_string())
        .collect();
    assert_eq!(logged, expected);

    // Auto partitions on the rerun; nothing new is processed.
    let auto = Cli {
        concurrent: None,
        ..explicit
    };
    let code = handle_run(&auto).unwrap();
    assert_eq!(debug_code(code), debug_code(ExitCode::SUCCESS));
    assert_eq!(std::fs::read_to_string(&done).unwrap().lines().count(), 2);
}

#[test]
fn test_handle_run_unknown_consumer() {
    let c = cli(&["-c", "CRC32,Nope", "/data"]);
    assert!(handle_run(&c).is_err());
}
