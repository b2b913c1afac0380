//! Per-file output: hash listings or JSON lines on stdout, plus the run logs (processed paths,
//! CRC32 mismatches, extension differences).

use anyhow::{Context, Result};
use std::io::Write;

use crate::engine::format::{extension_matches, suggested_extension};
use crate::engine::settings::Crc32ErrorLog;
use crate::utils::RunLog;
use crate::{ConsumerValue, FileDigests};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReportFormat {
    /// Nothing per file; only the run logs (if any) and the summary.
    #[default]
    Quiet,
    /// File path, then one `NAME => VALUE` line per consumer.
    Hashes,
    /// One JSON object per line.
    Json,
}

impl ReportFormat {
    pub fn from_flags(print_hashes: bool, json: bool) -> Self {
        match (json, print_hashes) {
            (true, _) => ReportFormat::Json,
            (false, true) => ReportFormat::Hashes,
            (false, false) => ReportFormat::Quiet,
        }
    }
}

/// Appends `HEX path` for files whose path does not carry their CRC32.
pub struct Crc32Check {
    pattern: Crc32ErrorLog,
    log: RunLog,
}

impl Crc32Check {
    pub fn open(pattern: &Crc32ErrorLog) -> Result<Self> {
        Ok(Self {
            pattern: pattern.clone(),
            log: RunLog::open(&pattern.path)?,
        })
    }

    /// Files without a CRC32 result are ignored.
    pub fn check(&self, digests: &FileDigests) -> Result<()> {
        let Some(crc) = digests.get("CRC32").and_then(ConsumerValue::digest) else {
            return Ok(());
        };
        let hex = hex::encode_upper(crc);
        let re = self
            .pattern
            .regex_for(&hex)
            .with_context(|| format!("CRC32 pattern {:?}", self.pattern.pattern))?;
        let full = digests.path.display().to_string();
        if !re.is_match(&full) {
            self.log.append_line(&format!("{} {}", hex, full))?;
        }
        Ok(())
    }
}

/// Appends `ext => detected<TAB>path` for files whose sniffed format does not fit the extension.
pub struct ExtensionCheck {
    log: RunLog,
}

impl ExtensionCheck {
    pub fn new(log: RunLog) -> Self {
        Self { log }
    }

    /// Files without a FORMAT result are ignored.
    pub fn check(&self, digests: &FileDigests) -> Result<()> {
        let Some(ConsumerValue::Format(format)) = digests.get("FORMAT") else {
            return Ok(());
        };
        let ext = digests
            .path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        if extension_matches(*format, &ext) {
            return Ok(());
        }
        let detected = (*format).map_or("unknown", suggested_extension);
        self.log
            .append_line(&format!("{} => {}\t{}", ext, detected, digests.path.display()))
    }
}

/// Writes results of completed files. Runs on the thread draining pipeline events.
pub struct Reporter<W: Write> {
    out: W,
    format: ReportFormat,
    processed_log: Option<RunLog>,
    crc32_check: Option<Crc32Check>,
    extension_check: Option<ExtensionCheck>,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, format: ReportFormat, processed_log: Option<RunLog>) -> Self {
        Self {
            out,
            format,
            processed_log,
            crc32_check: None,
            extension_check: None,
        }
    }

    pub fn with_crc32_check(mut self, check: Crc32Check) -> Self {
        self.crc32_check = Some(check);
        self
    }

    pub fn with_extension_check(mut self, check: ExtensionCheck) -> Self {
        self.extension_check = Some(check);
        self
    }

    /// Output `digests`, run the per-file checks, then record the file as processed.
    pub fn report(&mut self, digests: &FileDigests) -> Result<()> {
        match self.format {
            ReportFormat::Quiet => {}
            ReportFormat::Hashes => {
                writeln!(self.out, "{}", digests.path.display())?;
                for r in &digests.results {
                    writeln!(self.out, "  {} => {}", r.name, r.value.render())?;
                }
            }
            ReportFormat::Json => {
                let line = serde_json::to_string(&digests.to_report())
                    .context("serialize file report")?;
                writeln!(self.out, "{}", line)?;
            }
        }
        if let Some(check) = &self.crc32_check {
            check.check(digests)?;
        }
        if let Some(check) = &self.extension_check {
            check.check(digests)?;
        }
        if let Some(log) = &self.processed_log {
            log.append(&digests.path)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().context("flush report output")
    }
}
