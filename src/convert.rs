use std::path::Path;
use std::sync::LazyLock;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Local;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

static YEAR_MONTH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{4})(\d{2})").unwrap());
static QNUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^問題?(\d+)[.)]?\s*$").unwrap());
static QNUM_INLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^問題?(\d+)[.)]?\s+(.*)$").unwrap());
static NUMBERED_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)[.)]\s+(.*)$").unwrap());
static CHOICE_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[(]?([1-4abcdABCD])[.)]\s+(.*)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionStatus {
    Success,
    Error,
    Skipped,
}

/// One conversion attempt for one source document. Immutable once built;
/// appended to the run-scoped conversion log.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    pub source_file: String,
    pub output_file: String,
    pub file_size: u64,
    pub checksum: String,
    pub status: ConversionStatus,
    pub error_message: Option<String>,
    pub conversion_ms: Option<u64>,
    pub created_at: String,
}

/// Parse (exam year, month) from a `YYYYMM` pattern in the filename;
/// defaults to 2024/1.
pub fn parse_year_month(filename: &str) -> (i32, u32) {
    if let Some(caps) = YEAR_MONTH_RE.captures(filename) {
        let year = caps[1].parse().unwrap_or(2024);
        let month = caps[2].parse().unwrap_or(1);
        if (1..=12).contains(&month) {
            return (year, month);
        }
    }
    (2024, 1)
}

/// Normalize a raw exam text into structured Markdown: a metadata
/// header, `## 問題N` question headings and `(N) ` answer choices.
pub fn normalize_markdown(raw: &str, source_name: &str) -> String {
    let (year, month) = parse_year_month(source_name);

    let mut out = String::new();
    out.push_str("---\n");
    out.push_str(&format!("exam_year: {year}\n"));
    out.push_str(&format!("exam_month: {month}\n"));
    out.push_str(&format!("source: {source_name}\n"));
    out.push_str("---\n\n");

    for line in raw.lines() {
        let trimmed = line.trim();
        if let Some(caps) = QNUM_RE.captures(trimmed) {
            out.push_str(&format!("## 問題{}\n\n", &caps[1]));
        } else if let Some(caps) = QNUM_INLINE_RE.captures(trimmed) {
            out.push_str(&format!("## 問題{}\n\n{}\n", &caps[1], &caps[2]));
        } else if let Some(caps) = NUMBERED_LINE_RE.captures(trimmed) {
            out.push_str(&format!("## 問題{}\n\n{}\n", &caps[1], &caps[2]));
        } else if let Some(caps) = CHOICE_LINE_RE.captures(trimmed) {
            out.push_str(&format!("({}) {}\n", &caps[1], &caps[2]));
        } else {
            out.push_str(line);
            out.push('\n');
        }
    }

    out
}

fn checksum_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Convert one source document into normalized Markdown under
/// `output_dir`. Existing outputs are skipped unless `force`.
pub fn convert_file(input: &Path, output_dir: &Path, force: bool) -> ConversionResult {
    let started = Instant::now();
    let source_name = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| input.display().to_string());
    let output_path = output_dir.join(Path::new(&source_name).with_extension("md"));
    let created_at = Local::now().to_rfc3339();

    let make = |status: ConversionStatus,
                file_size: u64,
                checksum: String,
                error: Option<String>,
                elapsed: Option<u64>| ConversionResult {
        source_file: input.display().to_string(),
        output_file: output_path.display().to_string(),
        file_size,
        checksum,
        status,
        error_message: error,
        conversion_ms: elapsed,
        created_at: created_at.clone(),
    };

    let bytes = match std::fs::read(input) {
        Ok(bytes) => bytes,
        Err(e) => {
            return make(
                ConversionStatus::Error,
                0,
                String::new(),
                Some(format!("Failed to read source: {e}")),
                None,
            )
        }
    };
    let checksum = checksum_hex(&bytes);

    if output_path.exists() && !force {
        return make(
            ConversionStatus::Skipped,
            bytes.len() as u64,
            checksum,
            Some("File already exists (use --force to overwrite)".to_string()),
            None,
        );
    }

    let raw = String::from_utf8_lossy(&bytes);
    let markdown = normalize_markdown(&raw, &source_name);

    if let Err(e) = std::fs::create_dir_all(output_dir)
        .and_then(|_| std::fs::write(&output_path, markdown))
    {
        return make(
            ConversionStatus::Error,
            bytes.len() as u64,
            checksum,
            Some(format!("Failed to write output: {e}")),
            None,
        );
    }

    let elapsed = started.elapsed().as_millis() as u64;
    make(
        ConversionStatus::Success,
        bytes.len() as u64,
        checksum,
        None,
        Some(elapsed),
    )
}

/// Persist the run's conversion log as JSON with a summary block.
pub fn save_conversion_log(results: &[ConversionResult], path: &Path) -> Result<()> {
    let successful = results
        .iter()
        .filter(|r| r.status == ConversionStatus::Success)
        .count();
    let failed = results
        .iter()
        .filter(|r| r.status == ConversionStatus::Error)
        .count();
    let skipped = results
        .iter()
        .filter(|r| r.status == ConversionStatus::Skipped)
        .count();

    let log = serde_json::json!({
        "conversion_summary": {
            "total_files": results.len(),
            "successful": successful,
            "failed": failed,
            "skipped": skipped,
            "timestamp": Local::now().to_rfc3339(),
        },
        "results": results,
    });

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&log)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
