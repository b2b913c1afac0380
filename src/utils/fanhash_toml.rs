//! Load `.fanhash.toml` (CLI only) and layer its values onto [`Settings`]. Library callers pass
//! [`DigestOpts`](crate::DigestOpts) instead.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::engine::settings::{Settings, mib_to_bytes};
use crate::pipeline::discovery::WalkMode;
use crate::utils::config::PackagePaths;

#[derive(Debug, Default, Deserialize)]
pub struct FanhashToml {
    #[serde(default)]
    settings: SettingsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsSection {
    consumers: Option<Vec<String>>,
    concurrent: Option<String>,
    recursive: Option<bool>,
    follow_links: Option<bool>,
    walk: Option<WalkMode>,
    buffer_length_mib: Option<usize>,
    min_read_mib: Option<usize>,
    max_read_mib: Option<usize>,
    retries: Option<u32>,
    exts: Option<String>,
    skip_log: Option<PathBuf>,
    processed_log: Option<PathBuf>,
    done_log: Option<PathBuf>,
    crc32_error_log: Option<String>,
    ext_diff_log: Option<PathBuf>,
    print_hashes: Option<bool>,
    json: Option<bool>,
    progress: Option<bool>,
    verbose: Option<bool>,
}

impl FanhashToml {
    pub fn parse(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

/// Load the config file. An explicit `path` must exist; otherwise `.fanhash.toml` in the current
/// directory is used when present. A file that exists but does not parse is an error.
pub fn load_fanhash_toml(path: Option<&Path>) -> Result<Option<FanhashToml>> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(PackagePaths::get().config_filename()), false),
    };
    let s = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("read config {}", path.display())),
    };
    let file =
        FanhashToml::parse(&s).with_context(|| format!("parse config {}", path.display()))?;
    log::debug!("Loaded config from {}", path.display());
    Ok(Some(file))
}

/// Overwrite settings field from file when present.
macro_rules! apply_file_opt {
    ($sec:expr, $settings:expr, $sec_field:ident => $settings_field:ident) => {
        if let Some(v) = $sec.$sec_field.clone() {
            $settings.$settings_field = v;
        }
    };
}

/// Apply file config to settings (only fields present in the file). Call before applying CLI.
pub fn apply_file_to_settings(file: &FanhashToml, settings: &mut Settings) -> Result<()> {
    let sec = &file.settings;
    apply_file_opt!(sec, settings, consumers => consumers);
    apply_file_opt!(sec, settings, recursive => recursive);
    apply_file_opt!(sec, settings, follow_links => follow_links);
    apply_file_opt!(sec, settings, walk => walk_mode);
    apply_file_opt!(sec, settings, retries => max_retries);
    apply_file_opt!(sec, settings, print_hashes => print_hashes);
    apply_file_opt!(sec, settings, json => json);
    apply_file_opt!(sec, settings, progress => progress);
    apply_file_opt!(sec, settings, verbose => verbose);
    if let Some(spec) = &sec.concurrent {
        settings.partitions = Some(spec.parse()?);
    }
    if let Some(mib) = sec.buffer_length_mib {
        settings.buffer_length = mib_to_bytes("buffer_length_mib", mib)?;
    }
    if let Some(mib) = sec.min_read_mib {
        settings.read_window.min = mib_to_bytes("min_read_mib", mib)?;
    }
    if let Some(mib) = sec.max_read_mib {
        settings.read_window.max = mib_to_bytes("max_read_mib", mib)?;
    }
    if let Some(exts) = &sec.exts {
        settings.extensions = exts.parse()?;
    }
    if let Some(p) = &sec.skip_log {
        settings.skip_log = Some(p.clone());
    }
    if let Some(p) = &sec.processed_log {
        settings.processed_log = Some(p.clone());
    }
    if let Some(p) = &sec.done_log {
        settings.set_done_log(p.clone());
    }
    if let Some(s) = &sec.crc32_error_log {
        settings.crc32_error_log = Some(s.parse()?);
    }
    if let Some(p) = &sec.ext_diff_log {
        settings.ext_diff_log = Some(p.clone());
    }
    Ok(())
}
