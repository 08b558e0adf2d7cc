use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::convert::{self, ConversionResult, ConversionStatus};
use crate::db;
use crate::emit;
use crate::parser::{self, SourceDocument};

// Store courtesy pauses, matching the hosted backend's rate limit.
const INSERT_BATCH_SIZE: usize = 10;
const BATCH_PAUSE: Duration = Duration::from_millis(500);
const FILE_PAUSE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub file: String,
    pub error: String,
}

/// Accumulated totals for one batch run; serialized as the JSON summary.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub started_at: String,
    pub finished_at: String,
    pub files_processed: usize,
    pub files_failed: usize,
    pub questions_extracted: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub dry_run: bool,
    pub failures: Vec<FileFailure>,
    pub conversions: Vec<ConversionResult>,
}

struct FileOutcome {
    conversion: ConversionResult,
    questions: usize,
    outcome: db::InsertOutcome,
}

/// Run the full pipeline over an explicit file list, or over every
/// document in the input directory when the list is empty. One bad file
/// never aborts the batch.
pub fn run_batch(config: &Config, files: &[String]) -> Result<RunSummary> {
    if !config.input_dir.is_dir() {
        bail!("Input directory does not exist: {}", config.input_dir.display());
    }

    let mut paths = resolve_files(config, files)?;
    if let Some(year) = config.year {
        paths.retain(|p| year_of(p) == year);
    }
    if paths.is_empty() {
        bail!("No source documents to process");
    }

    let conn = if config.dry_run {
        None
    } else {
        let conn = db::connect(&config.db_path)?;
        db::init_schema(&conn)?;
        Some(conn)
    };

    let mut summary = RunSummary {
        started_at: Local::now().to_rfc3339(),
        dry_run: config.dry_run,
        ..RunSummary::default()
    };

    let pb = ProgressBar::new(paths.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let total = paths.len();
    for (i, path) in paths.iter().enumerate() {
        pb.set_message(
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        );

        match process_file(config, conn.as_ref(), path) {
            Ok(outcome) => {
                summary.files_processed += 1;
                summary.questions_extracted += outcome.questions;
                summary.inserted += outcome.outcome.inserted;
                summary.skipped += outcome.outcome.skipped;
                summary.failed += outcome.outcome.failed;
                summary.conversions.push(outcome.conversion);
            }
            Err(e) => {
                let name = path.display().to_string();
                warn!("Processing failed for {}: {:#}", name, e);
                summary.files_failed += 1;
                summary.failures.push(FileFailure {
                    file: name,
                    error: format!("{e:#}"),
                });
            }
        }
        pb.inc(1);

        if !config.dry_run && i + 1 < total {
            std::thread::sleep(FILE_PAUSE);
        }
    }
    pb.finish_and_clear();

    summary.finished_at = Local::now().to_rfc3339();
    write_summary(config, &summary)?;
    Ok(summary)
}

/// Convert → extract → classify/score → SQL artifact → store insert,
/// strictly in sequence for one document.
fn process_file(config: &Config, conn: Option<&Connection>, path: &Path) -> Result<FileOutcome> {
    let conversion = convert::convert_file(path, &config.output_dir, config.force);
    if conversion.status == ConversionStatus::Error {
        bail!(
            "Conversion failed: {}",
            conversion
                .error_message
                .clone()
                .unwrap_or_else(|| "unknown error".to_string())
        );
    }

    let markdown = std::fs::read_to_string(&conversion.output_file)
        .with_context(|| format!("Failed to read {}", conversion.output_file))?;

    let source_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let (year, month) = convert::parse_year_month(&source_name);
    let source = SourceDocument {
        file: source_name.clone(),
        year,
        month,
    };

    let questions = parser::process_document(&markdown, &source);
    if questions.is_empty() {
        warn!("No questions detected in {}", source_name);
    } else {
        info!("{}: extracted {} questions", source_name, questions.len());
    }

    if !questions.is_empty() {
        let sql_name = format!(
            "insert_{}.sql",
            Path::new(&source_name)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| source_name.clone())
        );
        emit::sql::write_insert(&config.sql_dir.join(sql_name), &questions)?;
    }

    let mut outcome = db::InsertOutcome::default();
    if let Some(conn) = conn {
        for (i, chunk) in questions.chunks(INSERT_BATCH_SIZE).enumerate() {
            if i > 0 {
                std::thread::sleep(BATCH_PAUSE);
            }
            match db::insert_questions(conn, chunk) {
                Ok(batch) => outcome.absorb(batch),
                Err(e) => {
                    // Store trouble marks the batch failed, never the run.
                    warn!("Store insert failed for {}: {:#}", source_name, e);
                    outcome.failed += chunk.len();
                }
            }
        }
    }

    Ok(FileOutcome {
        conversion,
        questions: questions.len(),
        outcome,
    })
}

fn resolve_files(config: &Config, files: &[String]) -> Result<Vec<PathBuf>> {
    if !files.is_empty() {
        return Ok(files.iter().map(|f| config.input_dir.join(f)).collect());
    }

    // Generic variant: scan the input directory.
    let mut paths: Vec<PathBuf> = std::fs::read_dir(&config.input_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| {
            p.extension()
                .map(|ext| ext == "md" || ext == "txt")
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    Ok(paths)
}

fn year_of(path: &Path) -> i32 {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    convert::parse_year_month(&name).0
}

fn write_summary(config: &Config, summary: &RunSummary) -> Result<()> {
    let reports = config.reports_dir();
    std::fs::create_dir_all(&reports)?;

    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let json_path = reports.join(format!("batch_summary_{stamp}.json"));
    std::fs::write(&json_path, serde_json::to_string_pretty(summary)?)?;

    let md_path = reports.join(format!("batch_summary_{stamp}.md"));
    std::fs::write(&md_path, summary_markdown(summary))?;

    info!(
        "Run summary written to {} and {}",
        json_path.display(),
        md_path.display()
    );
    Ok(())
}

fn summary_markdown(summary: &RunSummary) -> String {
    let mut out = String::new();
    out.push_str("# バッチ処理サマリー\n\n");
    out.push_str(&format!("- **開始:** {}\n", summary.started_at));
    out.push_str(&format!("- **終了:** {}\n", summary.finished_at));
    out.push_str(&format!("- **処理ファイル数:** {}\n", summary.files_processed));
    out.push_str(&format!("- **失敗ファイル数:** {}\n", summary.files_failed));
    out.push_str(&format!(
        "- **抽出問題総数:** {}問\n",
        summary.questions_extracted
    ));
    out.push_str(&format!(
        "- **投入:** {} / スキップ: {} / 失敗: {}\n",
        summary.inserted, summary.skipped, summary.failed
    ));
    if summary.dry_run {
        out.push_str("- **モード:** dry-run（ストア書き込みなし）\n");
    }

    out.push_str("\n## ファイル別結果\n\n");
    out.push_str("| ファイル名 | 状態 | チェックサム |\n");
    out.push_str("|-----------|------|-------------|\n");
    for c in &summary.conversions {
        let status = match c.status {
            ConversionStatus::Success => "成功",
            ConversionStatus::Skipped => "スキップ",
            ConversionStatus::Error => "エラー",
        };
        let short_checksum: String = c.checksum.chars().take(12).collect();
        out.push_str(&format!(
            "| {} | {} | {} |\n",
            c.source_file, status, short_checksum
        ));
    }

    if !summary.failures.is_empty() {
        out.push_str("\n## 失敗一覧\n\n");
        for failure in &summary.failures {
            out.push_str(&format!("- {}: {}\n", failure.file, failure.error));
        }
    }

    out
}

/// Console recap printed at the end of a run.
pub fn print_summary(summary: &RunSummary) {
    println!("処理ファイル数: {}", summary.files_processed);
    println!("失敗ファイル数: {}", summary.files_failed);
    println!("抽出問題総数:   {}問", summary.questions_extracted);
    if summary.dry_run {
        println!("dry-run のためストアへは投入していません");
    } else {
        println!(
            "投入: {} / スキップ: {} / 失敗: {}",
            summary.inserted, summary.skipped, summary.failed
        );
    }
    for failure in &summary.failures {
        println!("  ✗ {}: {}", failure.file, failure.error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(root: &Path) -> Config {
        Config {
            input_dir: root.join("raw"),
            output_dir: root.join("out"),
            sql_dir: root.join("sql"),
            db_path: root.join("cpl.sqlite"),
            force: false,
            dry_run: true,
            year: None,
        }
    }

    fn write_doc(dir: &Path, name: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(
            dir.join(name),
            "問題1\nピトー管が閉塞した場合の速度計の指示について、次の記述のうち正しいものはどれか。なお、ピトー孔の排水孔は正常であるものとする。\n\n\
             問題2\n台風の中心付近で予想される気象現象について、次の記述のうち正しいものはどれか。なお、台風は北半球のものとする。\n",
        )
        .unwrap();
    }

    #[test]
    fn dry_run_batch_processes_files_without_store() {
        let root = std::env::temp_dir().join(format!("cpl_driver_test_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        let config = test_config(&root);
        write_doc(&config.input_dir, "202408_CPLTest.txt");

        let summary = run_batch(&config, &[]).unwrap();
        assert_eq!(summary.files_processed, 1);
        assert_eq!(summary.files_failed, 0);
        assert_eq!(summary.questions_extracted, 2);
        assert_eq!(summary.inserted, 0);
        assert!(config.output_dir.join("202408_CPLTest.md").exists());
        assert!(config.sql_dir.join("insert_202408_CPLTest.sql").exists());
        assert!(!config.db_path.exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn missing_file_fails_soft() {
        let root =
            std::env::temp_dir().join(format!("cpl_driver_missing_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        let config = test_config(&root);
        write_doc(&config.input_dir, "202408_CPLTest.txt");

        let summary = run_batch(
            &config,
            &["does_not_exist.txt".to_string(), "202408_CPLTest.txt".to_string()],
        )
        .unwrap();
        assert_eq!(summary.files_failed, 1);
        assert_eq!(summary.files_processed, 1);
        assert_eq!(summary.failures.len(), 1);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn year_filter_drops_other_years() {
        let root = std::env::temp_dir().join(format!("cpl_driver_year_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        let mut config = test_config(&root);
        config.year = Some(2023);
        write_doc(&config.input_dir, "202408_CPLTest.txt");
        write_doc(&config.input_dir, "202311_CPLTest.txt");

        let summary = run_batch(&config, &[]).unwrap();
        assert_eq!(summary.files_processed, 1);
        assert_eq!(summary.conversions.len(), 1);
        assert!(summary.conversions[0].source_file.contains("202311"));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn missing_input_dir_is_a_setup_error() {
        let root = std::env::temp_dir().join(format!("cpl_driver_setup_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        let config = test_config(&root);
        assert!(run_batch(&config, &[]).is_err());
    }
}
