use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use rusqlite::Connection;
use tracing::warn;

use crate::parser::Question;
use crate::trend::{ContentRecommendation, TrendAnalysis};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

#[cfg(test)]
pub fn connect_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS exam_questions (
            id                INTEGER PRIMARY KEY,
            exam_year         INTEGER NOT NULL,
            exam_month        INTEGER NOT NULL,
            question_number   INTEGER NOT NULL,
            subject_category  TEXT NOT NULL,
            sub_category      TEXT NOT NULL,
            difficulty_level  INTEGER NOT NULL CHECK(difficulty_level BETWEEN 1 AND 5),
            importance_score  REAL NOT NULL,
            question_text     TEXT NOT NULL,
            options           TEXT,
            correct_answer    INTEGER,
            tags              TEXT,
            source_document   TEXT NOT NULL,
            created_at        TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(exam_year, exam_month, question_number)
        );
        CREATE INDEX IF NOT EXISTS idx_questions_subject
            ON exam_questions(subject_category, sub_category);

        CREATE TABLE IF NOT EXISTS trend_analysis (
            id               INTEGER PRIMARY KEY,
            analysis_date    TEXT NOT NULL,
            subject_category TEXT NOT NULL,
            sub_category     TEXT NOT NULL,
            question_count   INTEGER NOT NULL,
            avg_difficulty   REAL NOT NULL,
            frequency_trend  TEXT NOT NULL
                CHECK(frequency_trend IN ('increasing','stable','decreasing')),
            importance_rank  INTEGER NOT NULL DEFAULT 0,
            trend_score      REAL NOT NULL,
            yearly_data      TEXT NOT NULL,
            analysis_notes   TEXT,
            UNIQUE(analysis_date, subject_category, sub_category)
        );

        CREATE TABLE IF NOT EXISTS content_recommendations (
            id                       INTEGER PRIMARY KEY,
            analysis_date            TEXT NOT NULL,
            subject_category         TEXT NOT NULL,
            sub_category             TEXT NOT NULL,
            priority_score           INTEGER NOT NULL,
            recommended_title        TEXT NOT NULL,
            coverage_gap_percentage  REAL NOT NULL,
            estimated_study_minutes  INTEGER NOT NULL,
            target_difficulty_level  INTEGER NOT NULL,
            suggested_outline        TEXT NOT NULL,
            UNIQUE(analysis_date, subject_category, sub_category)
        );

        -- Owned by the learning-content side; this pipeline only reads it.
        CREATE TABLE IF NOT EXISTS learning_content_mapping (
            id              INTEGER PRIMARY KEY,
            content_id      TEXT NOT NULL,
            topic_category  TEXT NOT NULL,
            sub_category    TEXT,
            UNIQUE(content_id, topic_category)
        );
        ",
    )?;
    Ok(())
}

// ── Questions ──

#[derive(Debug, Default, Clone, Copy)]
pub struct InsertOutcome {
    pub inserted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl InsertOutcome {
    pub fn absorb(&mut self, other: InsertOutcome) {
        self.inserted += other.inserted;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Insert questions with a duplicate-check read on the natural key
/// (exam year, month, question number) before each insert. A failed
/// insert is counted, logged and skipped, never escalated.
pub fn insert_questions(conn: &Connection, questions: &[Question]) -> Result<InsertOutcome> {
    let tx = conn.unchecked_transaction()?;
    let mut outcome = InsertOutcome::default();
    {
        let mut exists_stmt = tx.prepare(
            "SELECT 1 FROM exam_questions
             WHERE exam_year = ?1 AND exam_month = ?2 AND question_number = ?3",
        )?;
        let mut insert_stmt = tx.prepare(
            "INSERT INTO exam_questions
             (exam_year, exam_month, question_number, subject_category, sub_category,
              difficulty_level, importance_score, question_text, options,
              correct_answer, tags, source_document)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;

        for q in questions {
            let duplicate = exists_stmt.exists(rusqlite::params![
                q.source.year,
                q.source.month,
                q.number
            ])?;
            if duplicate {
                outcome.skipped += 1;
                continue;
            }

            let options = serde_json::to_string(&q.options)?;
            let tags = serde_json::to_string(&q.tags)?;
            let result = insert_stmt.execute(rusqlite::params![
                q.source.year,
                q.source.month,
                q.number,
                q.subject,
                q.sub_category,
                q.difficulty,
                q.importance,
                q.text,
                options,
                q.correct_answer,
                tags,
                q.source.file,
            ]);
            match result {
                Ok(_) => outcome.inserted += 1,
                Err(e) => {
                    warn!("Insert failed for Q{} ({}): {}", q.number, q.source.file, e);
                    outcome.failed += 1;
                }
            }
        }
    }
    tx.commit()?;
    Ok(outcome)
}

#[derive(Debug, Clone)]
pub struct StoredQuestion {
    pub exam_year: i32,
    pub exam_month: u32,
    pub question_number: u32,
    pub subject_category: String,
    pub sub_category: String,
    pub difficulty_level: u8,
    pub importance_score: f64,
}

pub fn fetch_questions(conn: &Connection, year: Option<i32>) -> Result<Vec<StoredQuestion>> {
    let sql = match year {
        Some(_) => {
            "SELECT exam_year, exam_month, question_number, subject_category,
                    sub_category, difficulty_level, importance_score
             FROM exam_questions WHERE exam_year = ?1
             ORDER BY exam_year, exam_month, question_number"
        }
        None => {
            "SELECT exam_year, exam_month, question_number, subject_category,
                    sub_category, difficulty_level, importance_score
             FROM exam_questions
             ORDER BY exam_year, exam_month, question_number"
        }
    };
    let mut stmt = conn.prepare(sql)?;
    let map_row = |row: &rusqlite::Row| {
        Ok(StoredQuestion {
            exam_year: row.get(0)?,
            exam_month: row.get(1)?,
            question_number: row.get(2)?,
            subject_category: row.get(3)?,
            sub_category: row.get(4)?,
            difficulty_level: row.get(5)?,
            importance_score: row.get(6)?,
        })
    };
    let rows = match year {
        Some(y) => stmt.query_map([y], map_row)?.collect::<Result<Vec<_>, _>>()?,
        None => stmt.query_map([], map_row)?.collect::<Result<Vec<_>, _>>()?,
    };
    Ok(rows)
}

// ── Trend analysis ──

/// Upsert keyed on (analysis date, subject, sub-category).
pub fn upsert_trend_analysis(conn: &Connection, trends: &[TrendAnalysis]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO trend_analysis
             (analysis_date, subject_category, sub_category, question_count,
              avg_difficulty, frequency_trend, importance_rank, trend_score,
              yearly_data, analysis_notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for t in trends {
            let yearly = serde_json::to_string(&t.yearly_data)?;
            count += stmt.execute(rusqlite::params![
                t.analysis_date.to_string(),
                t.subject_category,
                t.sub_category,
                t.question_count,
                t.avg_difficulty,
                t.frequency_trend.as_str(),
                t.importance_rank,
                t.trend_score,
                yearly,
                t.analysis_notes,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn upsert_recommendations(
    conn: &Connection,
    recommendations: &[ContentRecommendation],
) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO content_recommendations
             (analysis_date, subject_category, sub_category, priority_score,
              recommended_title, coverage_gap_percentage, estimated_study_minutes,
              target_difficulty_level, suggested_outline)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for r in recommendations {
            let outline = serde_json::to_string(&r.suggested_outline)?;
            count += stmt.execute(rusqlite::params![
                r.analysis_date.to_string(),
                r.subject_category,
                r.sub_category,
                r.priority_score,
                r.recommended_title,
                r.coverage_gap_percentage,
                r.estimated_study_minutes,
                r.target_difficulty_level,
                outline,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// Mapped learning-content entries per topic category, for coverage-gap
/// computation.
pub fn fetch_mapping_counts(conn: &Connection) -> Result<HashMap<String, usize>> {
    let mut stmt = conn.prepare(
        "SELECT topic_category, COUNT(*) FROM learning_content_mapping GROUP BY topic_category",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?))
        })?
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub questions: usize,
    pub subjects: usize,
    pub years: usize,
    pub trend_rows: usize,
    pub recommendations: usize,
    pub mappings: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let questions: usize =
        conn.query_row("SELECT COUNT(*) FROM exam_questions", [], |r| r.get(0))?;
    let subjects: usize = conn.query_row(
        "SELECT COUNT(DISTINCT subject_category) FROM exam_questions",
        [],
        |r| r.get(0),
    )?;
    let years: usize = conn.query_row(
        "SELECT COUNT(DISTINCT exam_year) FROM exam_questions",
        [],
        |r| r.get(0),
    )?;
    let trend_rows: usize =
        conn.query_row("SELECT COUNT(*) FROM trend_analysis", [], |r| r.get(0))?;
    let recommendations: usize = conn.query_row(
        "SELECT COUNT(*) FROM content_recommendations",
        [],
        |r| r.get(0),
    )?;
    let mappings: usize = conn.query_row(
        "SELECT COUNT(*) FROM learning_content_mapping",
        [],
        |r| r.get(0),
    )?;
    Ok(Stats {
        questions,
        subjects,
        years,
        trend_rows,
        recommendations,
        mappings,
    })
}
