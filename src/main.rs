mod config;
mod convert;
mod db;
mod driver;
mod emit;
mod parser;
mod trend;
mod waypoints;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::bail;
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::warn;

use config::Config;
use convert::ConversionStatus;

#[derive(Parser)]
#[command(
    name = "cpl_pipeline",
    about = "CPL exam content pipeline: convert, extract, classify, score, analyze"
)]
struct Cli {
    /// Question/trend store location
    #[arg(long, global = true, default_value = "data/cpl.sqlite")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize raw exam documents into structured Markdown
    Convert {
        /// Directory with raw source documents
        #[arg(short, long, default_value = "data/raw")]
        input: PathBuf,
        /// Directory for converted Markdown
        #[arg(short, long, default_value = "data/converted_md")]
        output: PathBuf,
        /// Overwrite already-converted documents
        #[arg(long)]
        force: bool,
    },
    /// Convert + extract + classify + score + store, one file at a time
    Run {
        /// Directory with raw source documents
        #[arg(short, long, default_value = "data/raw")]
        input: PathBuf,
        /// Directory for converted Markdown and run reports
        #[arg(short, long, default_value = "data/converted_md")]
        output: PathBuf,
        /// Directory for generated INSERT artifacts
        #[arg(long, default_value = "data/sql")]
        sql_dir: PathBuf,
        /// Explicit source filenames (default: scan the input directory)
        files: Vec<String>,
        /// Overwrite already-converted documents
        #[arg(long)]
        force: bool,
        /// Parse, score and emit without store writes
        #[arg(long)]
        dry_run: bool,
        /// Only process documents from this exam year
        #[arg(long)]
        year: Option<i32>,
    },
    /// Analyze stored questions: trends, recommendations, reports
    Analyze {
        /// Directory for analysis reports
        #[arg(short, long, default_value = "data/analysis_reports")]
        output: PathBuf,
        /// Restrict the analysis to one exam year
        #[arg(long)]
        year: Option<i32>,
        /// Compute and report without persisting results
        #[arg(long)]
        dry_run: bool,
    },
    /// Show store statistics
    Stats,
    /// GeoJSON waypoint maintenance
    Waypoint {
        #[command(subcommand)]
        command: WaypointCommands,
    },
}

#[derive(Subcommand)]
enum WaypointCommands {
    /// Convert DMS coordinate strings to decimal degrees
    Convert {
        /// e.g. 430001N 1413903E
        coords: Vec<String>,
    },
    /// Add one waypoint to a GeoJSON file (duplicate ids are rejected)
    Add {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        /// DMS latitude, e.g. 275408N
        #[arg(long)]
        lat: String,
        /// DMS longitude, e.g. 1285353E
        #[arg(long)]
        lon: String,
        #[arg(long, default_value = "Non-Compulsory")]
        kind: String,
    },
    /// Merge waypoint collections into one id-sorted file
    Merge {
        /// Destination collection
        #[arg(long)]
        into: PathBuf,
        /// Source collections to fold in
        sources: Vec<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Convert {
            input,
            output,
            force,
        } => run_convert(&input, &output, force),
        Commands::Run {
            input,
            output,
            sql_dir,
            files,
            force,
            dry_run,
            year,
        } => {
            let config = Config {
                input_dir: input,
                output_dir: output,
                sql_dir,
                db_path: cli.db,
                force,
                dry_run,
                year,
            };
            let summary = driver::run_batch(&config, &files)?;
            println!();
            driver::print_summary(&summary);
            Ok(())
        }
        Commands::Analyze {
            output,
            year,
            dry_run,
        } => run_analyze(&cli.db, &output, year, dry_run),
        Commands::Stats => {
            let conn = db::connect(&cli.db)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Questions:       {}", s.questions);
            println!("Subjects:        {}", s.subjects);
            println!("Exam years:      {}", s.years);
            println!("Trend rows:      {}", s.trend_rows);
            println!("Recommendations: {}", s.recommendations);
            println!("Content maps:    {}", s.mappings);
            Ok(())
        }
        Commands::Waypoint { command } => run_waypoint(command),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn run_convert(input: &Path, output: &Path, force: bool) -> anyhow::Result<()> {
    if !input.is_dir() {
        bail!("Input directory does not exist: {}", input.display());
    }
    let paths = list_documents(input)?;
    if paths.is_empty() {
        println!("No source documents found in {}", input.display());
        return Ok(());
    }

    println!("Converting {} documents...", paths.len());
    let mut results = Vec::new();
    for (i, path) in paths.iter().enumerate() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        println!("Converting [{}/{}]: {}", i + 1, paths.len(), name);

        let result = convert::convert_file(path, output, force);
        match result.status {
            ConversionStatus::Success => println!("  ✓ {}", result.output_file),
            ConversionStatus::Skipped => println!(
                "  ⚠ Skipped: {}",
                result.error_message.as_deref().unwrap_or("")
            ),
            ConversionStatus::Error => println!(
                "  ✗ Error: {}",
                result.error_message.as_deref().unwrap_or("")
            ),
        }
        results.push(result);
    }

    let ok = results
        .iter()
        .filter(|r| r.status == ConversionStatus::Success)
        .count();
    let skipped = results
        .iter()
        .filter(|r| r.status == ConversionStatus::Skipped)
        .count();
    let errors = results.len() - ok - skipped;

    convert::save_conversion_log(&results, &output.join("conversion_log.json"))?;
    println!(
        "Done: {} converted, {} skipped, {} errors.",
        ok, skipped, errors
    );
    Ok(())
}

fn run_analyze(
    db_path: &Path,
    output: &Path,
    year: Option<i32>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let conn = db::connect(db_path)?;
    db::init_schema(&conn)?;

    let questions = db::fetch_questions(&conn, year)?;
    if questions.is_empty() {
        println!("No stored questions. Run 'run' first.");
        return Ok(());
    }
    println!("Analyzing {} stored questions...", questions.len());

    let analysis_date = Local::now().date_naive();
    let trends = trend::analyze(&questions, analysis_date);
    let mapped = match db::fetch_mapping_counts(&conn) {
        Ok(mapped) => Some(mapped),
        Err(e) => {
            warn!("Coverage lookup failed, using default gap: {:#}", e);
            None
        }
    };
    let recommendations = trend::recommendations(&trends, mapped.as_ref(), analysis_date);

    if !dry_run {
        let saved_trends = db::upsert_trend_analysis(&conn, &trends)?;
        let saved_recs = db::upsert_recommendations(&conn, &recommendations)?;
        println!(
            "Saved {} trend rows and {} recommendations.",
            saved_trends, saved_recs
        );
    }

    std::fs::create_dir_all(output)?;
    let report_path = output.join(format!("trend_analysis_{analysis_date}.md"));
    emit::report::write_trend_report(&report_path, &trends, &recommendations, analysis_date)?;
    let json_path = output.join(format!("trend_analysis_{analysis_date}.json"));
    let payload = serde_json::json!({
        "analysis_date": analysis_date,
        "trends": trends,
        "recommendations": recommendations,
    });
    std::fs::write(&json_path, serde_json::to_string_pretty(&payload)?)?;
    println!("Report written to {}", report_path.display());

    // Compact console table, top entries only
    println!(
        "\n{:>3} | {:<12} | {:<24} | {:>6} | {:<10} | {:>5}",
        "#", "科目", "サブカテゴリ", "問題数", "傾向", "スコア"
    );
    println!("{}", "-".repeat(78));
    for t in trends.iter().take(5) {
        println!(
            "{:>3} | {:<12} | {:<24} | {:>6} | {:<10} | {:>5}",
            t.importance_rank,
            truncate(&t.subject_category, 12),
            truncate(&t.sub_category, 24),
            t.question_count,
            t.frequency_trend.as_str(),
            t.trend_score,
        );
    }
    if !recommendations.is_empty() {
        println!("\n--- 推奨コンテンツ ---");
        for (i, rec) in recommendations.iter().take(5).enumerate() {
            println!(
                "  {}. {} (優先度: {})",
                i + 1,
                rec.recommended_title,
                rec.priority_score
            );
        }
    }
    Ok(())
}

fn run_waypoint(command: WaypointCommands) -> anyhow::Result<()> {
    match command {
        WaypointCommands::Convert { coords } => {
            if coords.is_empty() {
                bail!("No coordinate strings given");
            }
            for coord in &coords {
                match waypoints::dms_to_decimal(coord) {
                    Ok(value) => println!("{} -> {:.4}", coord, value),
                    Err(e) => println!("{} -> error: {}", coord, e),
                }
            }
            Ok(())
        }
        WaypointCommands::Add {
            file,
            id,
            name,
            lat,
            lon,
            kind,
        } => {
            let mut collection = if file.exists() {
                waypoints::load_collection(&file)?
            } else {
                waypoints::FeatureCollection::empty()
            };

            let feature = waypoints::waypoint_feature(&id, &name, &kind, &lat, &lon)?;
            let [lon_v, lat_v] = feature.geometry.coordinates;
            if waypoints::add_waypoint(&mut collection, feature) {
                waypoints::save_collection(&file, &collection)?;
                println!("追加: {} - {} [{}, {}]", id, name, lon_v, lat_v);
                println!("合計 {} 件になりました。", collection.features.len());
            } else {
                println!("警告: {} は既に存在します。", id);
            }
            Ok(())
        }
        WaypointCommands::Merge { into, sources } => {
            if sources.is_empty() {
                bail!("No source collections given");
            }
            let mut dst = if into.exists() {
                waypoints::load_collection(&into)?
            } else {
                waypoints::FeatureCollection::empty()
            };

            let mut added = 0;
            let mut duplicates = 0;
            for source in &sources {
                match waypoints::load_collection(source) {
                    Ok(collection) => {
                        let stats = waypoints::merge_collections(&mut dst, collection);
                        println!(
                            "{}: {} 件追加 ({} 件重複)",
                            source.display(),
                            stats.added,
                            stats.duplicates
                        );
                        added += stats.added;
                        duplicates += stats.duplicates;
                    }
                    Err(e) => println!("{} の読み込みエラー: {:#}", source.display(), e),
                }
            }

            waypoints::save_collection(&into, &dst)?;
            println!(
                "マージ完了: {} 件追加, {} 件重複, 合計 {} 件を {} に保存しました。",
                added,
                duplicates,
                dst.features.len(),
                into.display()
            );
            Ok(())
        }
    }
}

fn list_documents(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
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

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
