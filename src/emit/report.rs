use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::trend::{ContentRecommendation, TrendAnalysis};

/// Markdown trend report with a fixed section order: summary ranking
/// table, per-subject detail, coverage-gap table, recommended actions.
pub fn trend_report_markdown(
    trends: &[TrendAnalysis],
    recommendations: &[ContentRecommendation],
    analysis_date: NaiveDate,
) -> String {
    let mut out = String::new();

    out.push_str("# CPL学科試験 出題傾向分析レポート\n\n");
    out.push_str(&format!(
        "**分析日:** {}  \n",
        analysis_date.format("%Y年%m月%d日")
    ));
    out.push_str("**分析対象:** 蓄積された全出題データ\n\n");

    // ── Summary ranking table ──
    out.push_str("## エグゼクティブサマリー\n\n");
    out.push_str("### 重要度ランキング TOP 10\n\n");
    out.push_str("| 順位 | 科目 | サブカテゴリ | 問題数 | 傾向 | スコア |\n");
    out.push_str("|------|------|-------------|--------|------|--------|\n");
    for trend in trends.iter().take(10) {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            trend.importance_rank,
            trend.subject_category,
            trend.sub_category,
            trend.question_count,
            trend.frequency_trend.as_str(),
            trend.trend_score,
        ));
    }

    // ── Per-subject detail ──
    out.push_str("\n## 科目別詳細分析\n\n");
    let mut by_subject: BTreeMap<&str, Vec<&TrendAnalysis>> = BTreeMap::new();
    for trend in trends {
        by_subject
            .entry(trend.subject_category.as_str())
            .or_default()
            .push(trend);
    }
    for (subject, entries) in &by_subject {
        out.push_str(&format!("### {subject}\n\n"));

        let total: u32 = entries.iter().map(|t| t.question_count).sum();
        let weighted_difficulty = if total > 0 {
            entries
                .iter()
                .map(|t| t.avg_difficulty * f64::from(t.question_count))
                .sum::<f64>()
                / f64::from(total)
        } else {
            0.0
        };
        out.push_str(&format!("- **総問題数:** {total}\n"));
        out.push_str(&format!("- **平均難易度:** {weighted_difficulty:.1}\n"));
        out.push_str(&format!("- **サブカテゴリ数:** {}\n\n", entries.len()));

        for trend in entries {
            out.push_str(&format!("#### {}\n\n", trend.sub_category));
            out.push_str(&format!("- **問題数:** {}\n", trend.question_count));
            out.push_str(&format!("- **平均難易度:** {:.1}\n", trend.avg_difficulty));
            out.push_str(&format!(
                "- **出題傾向:** {}\n",
                trend.frequency_trend.as_str()
            ));
            out.push_str(&format!("- **トレンドスコア:** {}\n", trend.trend_score));
            if !trend.analysis_notes.is_empty() {
                out.push_str(&format!("- **分析メモ:** {}\n", trend.analysis_notes));
            }
            out.push('\n');
        }
    }

    // ── Coverage-gap table ──
    out.push_str("## コンテンツカバレッジギャップ\n\n");
    if recommendations.is_empty() {
        out.push_str("ギャップ対象の分野はありません。\n\n");
    } else {
        out.push_str("| 科目 | サブカテゴリ | ギャップ率 | 優先度 |\n");
        out.push_str("|------|-------------|-----------|--------|\n");
        for rec in recommendations {
            out.push_str(&format!(
                "| {} | {} | {:.1}% | {} |\n",
                rec.subject_category,
                rec.sub_category,
                rec.coverage_gap_percentage,
                rec.priority_score,
            ));
        }
        out.push('\n');
    }

    // ── Recommended actions ──
    out.push_str("## 推奨アクション\n\n");
    if recommendations.is_empty() {
        out.push_str("推奨コンテンツはありません。\n");
    } else {
        for (i, rec) in recommendations.iter().enumerate() {
            out.push_str(&format!(
                "{}. **{}** (優先度: {}, 推定学習時間: {}分)\n",
                i + 1,
                rec.recommended_title,
                rec.priority_score,
                rec.estimated_study_minutes,
            ));
            for line in &rec.suggested_outline {
                out.push_str(&format!("   - {line}\n"));
            }
        }
    }

    out
}

pub fn write_trend_report(
    path: &Path,
    trends: &[TrendAnalysis],
    recommendations: &[ContentRecommendation],
    analysis_date: NaiveDate,
) -> Result<()> {
    let markdown = trend_report_markdown(trends, recommendations, analysis_date);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, markdown)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoredQuestion;
    use crate::trend;

    fn sample_trends() -> (Vec<TrendAnalysis>, Vec<ContentRecommendation>, NaiveDate) {
        let date = NaiveDate::from_ymd_opt(2025, 6, 21).unwrap();
        let mut questions = Vec::new();
        for year in [2022, 2023, 2024] {
            for n in 0..4 {
                questions.push(StoredQuestion {
                    exam_year: year,
                    exam_month: 8,
                    question_number: n,
                    subject_category: "航空工学".to_string(),
                    sub_category: "動力装置".to_string(),
                    difficulty_level: 3,
                    importance_score: 6.0,
                });
            }
        }
        let trends = trend::analyze(&questions, date);
        let recs = trend::recommendations(&trends, None, date);
        (trends, recs, date)
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let (trends, recs, date) = sample_trends();
        let report = trend_report_markdown(&trends, &recs, date);

        let summary = report.find("## エグゼクティブサマリー").unwrap();
        let detail = report.find("## 科目別詳細分析").unwrap();
        let gaps = report.find("## コンテンツカバレッジギャップ").unwrap();
        let actions = report.find("## 推奨アクション").unwrap();
        assert!(summary < detail && detail < gaps && gaps < actions);
    }

    #[test]
    fn ranking_table_lists_entries() {
        let (trends, recs, date) = sample_trends();
        let report = trend_report_markdown(&trends, &recs, date);
        assert!(report.contains("| 1 | 航空工学 | 動力装置 |"));
        assert!(report.contains("2025年06月21日"));
    }

    #[test]
    fn recommendations_render_with_outline() {
        let (trends, recs, date) = sample_trends();
        assert!(!recs.is_empty());
        let report = trend_report_markdown(&trends, &recs, date);
        assert!(report.contains("完全攻略"));
        assert!(report.contains("1. 基礎理論の解説"));
    }

    #[test]
    fn empty_input_still_produces_all_sections() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 21).unwrap();
        let report = trend_report_markdown(&[], &[], date);
        assert!(report.contains("## 推奨アクション"));
        assert!(report.contains("推奨コンテンツはありません。"));
    }
}
