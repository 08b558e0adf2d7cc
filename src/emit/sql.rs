use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;

use crate::parser::Question;

/// SQL-escape by doubling single quotes.
pub fn escape(text: &str) -> String {
    text.replace('\'', "''")
}

fn quoted(text: &str) -> String {
    format!("'{}'", escape(text))
}

fn array_literal(items: &[String]) -> String {
    if items.is_empty() {
        return "ARRAY[]::text[]".to_string();
    }
    let rendered: Vec<String> = items.iter().map(|i| quoted(i)).collect();
    format!("ARRAY[{}]", rendered.join(","))
}

fn jsonb_literal(value: &serde_json::Value) -> String {
    format!("{}::jsonb", quoted(&value.to_string()))
}

/// Render one parameterless INSERT statement covering every question of a
/// document, with a `--` comment header.
pub fn render_insert(questions: &[Question]) -> String {
    if questions.is_empty() {
        return String::new();
    }

    let source = &questions[0].source;
    let mut lines: Vec<String> = Vec::new();
    lines.push(format!("-- CPL試験データ投入 ({})", source.file));
    lines.push(format!("-- 投入件数: {} 問", questions.len()));
    lines.push(format!(
        "-- 生成日時: {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    lines.push(String::new());
    lines.push("INSERT INTO exam_questions (".to_string());
    lines.push("    exam_year, exam_month, question_number,".to_string());
    lines.push("    subject_category, sub_category, difficulty_level,".to_string());
    lines.push("    importance_score, question_text, options, correct_answer,".to_string());
    lines.push("    tags, source_documents, created_at, updated_at".to_string());
    lines.push(") VALUES".to_string());

    let tuples: Vec<String> = questions.iter().map(value_tuple).collect();
    lines.push(tuples.join(",\n"));
    lines.push(";".to_string());

    lines.join("\n")
}

fn value_tuple(q: &Question) -> String {
    let options = serde_json::json!(q
        .options
        .iter()
        .map(|(label, text)| serde_json::json!({ "label": label, "text": text }))
        .collect::<Vec<_>>());
    let metadata = serde_json::json!({
        "sources": [{
            "type": "official_exam",
            "year": q.source.year,
            "month": q.source.month,
            "question_num": q.number,
            "file": q.source.file,
            "extraction_confidence": 0.9,
        }],
        "weight": 3.0,
        "originality": "official",
    });
    let correct = q
        .correct_answer
        .map(|n| n.to_string())
        .unwrap_or_else(|| "NULL".to_string());

    format!(
        "    (\n        {}, {}, {},\n        {}, {}, {},\n        {}, {},\n        {},\n        {},\n        {},\n        {},\n        now(), now()\n    )",
        q.source.year,
        q.source.month,
        q.number,
        quoted(q.subject),
        quoted(q.sub_category),
        q.difficulty,
        q.importance,
        quoted(&q.text),
        jsonb_literal(&options),
        correct,
        array_literal(&q.tags),
        jsonb_literal(&metadata),
    )
}

/// Write the INSERT artifact for one document. The file write is the
/// only side effect.
pub fn write_insert(path: &Path, questions: &[Question]) -> Result<()> {
    let sql = render_insert(questions);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, sql)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
