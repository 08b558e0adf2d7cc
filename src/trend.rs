use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

use crate::db::StoredQuestion;

// Sub-score caps and weights. Weights sum to 1.0.
const FREQUENCY_CAP: f64 = 10.0;
const CONTINUITY_CAP: f64 = 5.0;
const W_FREQUENCY: f64 = 0.4;
const W_CONTINUITY: f64 = 0.3;
const W_DIRECTION: f64 = 0.3;

// Recommendation thresholds.
const MIN_TREND_SCORE: f64 = 3.0;
const MIN_QUESTION_COUNT: u32 = 5;
const MAX_RECOMMENDATIONS: usize = 20;
const DEFAULT_COVERAGE_GAP: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyTrend {
    Increasing,
    Stable,
    Decreasing,
}

impl FrequencyTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrequencyTrend::Increasing => "increasing",
            FrequencyTrend::Stable => "stable",
            FrequencyTrend::Decreasing => "decreasing",
        }
    }

    fn direction_score(&self) -> f64 {
        match self {
            FrequencyTrend::Increasing => 3.0,
            FrequencyTrend::Stable => 2.0,
            FrequencyTrend::Decreasing => 1.0,
        }
    }
}

/// Aggregate view of one (subject, sub-category) group. Recomputed
/// wholesale on every analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct TrendAnalysis {
    pub analysis_date: NaiveDate,
    pub subject_category: String,
    pub sub_category: String,
    pub question_count: u32,
    pub avg_difficulty: f64,
    pub frequency_trend: FrequencyTrend,
    pub importance_rank: u32,
    pub trend_score: f64,
    pub yearly_data: BTreeMap<i32, u32>,
    pub analysis_notes: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentRecommendation {
    pub analysis_date: NaiveDate,
    pub subject_category: String,
    pub sub_category: String,
    pub priority_score: i32,
    pub recommended_title: String,
    pub coverage_gap_percentage: f64,
    pub estimated_study_minutes: u32,
    pub target_difficulty_level: u8,
    pub suggested_outline: Vec<String>,
}

/// Group stored questions by (subject, sub-category) and compute trend
/// entries, ranked by descending trend score.
pub fn analyze(questions: &[StoredQuestion], analysis_date: NaiveDate) -> Vec<TrendAnalysis> {
    let mut groups: BTreeMap<(String, String), Vec<&StoredQuestion>> = BTreeMap::new();
    for q in questions {
        groups
            .entry((q.subject_category.clone(), q.sub_category.clone()))
            .or_default()
            .push(q);
    }

    let mut trends: Vec<TrendAnalysis> = groups
        .into_iter()
        .map(|((subject, sub), group)| {
            let mut yearly: BTreeMap<i32, u32> = BTreeMap::new();
            for q in &group {
                *yearly.entry(q.exam_year).or_insert(0) += 1;
            }

            let avg_difficulty =
                group.iter().map(|q| f64::from(q.difficulty_level)).sum::<f64>()
                    / group.len() as f64;
            let frequency_trend = classify_frequency_trend(&yearly);
            let score = trend_score(group.len(), yearly.len(), frequency_trend);
            let notes = analysis_notes(group.len(), avg_difficulty, &yearly, frequency_trend);

            TrendAnalysis {
                analysis_date,
                subject_category: subject,
                sub_category: sub,
                question_count: group.len() as u32,
                avg_difficulty: round2(avg_difficulty),
                frequency_trend,
                importance_rank: 0,
                trend_score: score,
                yearly_data: yearly,
                analysis_notes: notes,
            }
        })
        .collect();

    trends.sort_by(|a, b| {
        b.trend_score
            .partial_cmp(&a.trend_score)
            .unwrap_or(Ordering::Equal)
    });
    for (i, trend) in trends.iter_mut().enumerate() {
        trend.importance_rank = (i + 1) as u32;
    }
    trends
}

/// Compare mean counts of the first vs. second half of the most recent
/// up-to-3 years. Fewer than 2 data points is always stable.
pub fn classify_frequency_trend(yearly: &BTreeMap<i32, u32>) -> FrequencyTrend {
    if yearly.len() < 2 {
        return FrequencyTrend::Stable;
    }

    let counts: Vec<f64> = yearly.values().map(|c| f64::from(*c)).collect();
    let recent = &counts[counts.len().saturating_sub(3)..];
    let mid = recent.len() / 2;
    let first = mean(&recent[..mid]);
    let second = mean(&recent[mid..]);

    if second > first * 1.2 {
        FrequencyTrend::Increasing
    } else if second < first * 0.8 {
        FrequencyTrend::Decreasing
    } else {
        FrequencyTrend::Stable
    }
}

/// Weighted combination of capped frequency, continuity and direction
/// sub-scores, rounded to 2 decimals.
pub fn trend_score(count: usize, distinct_years: usize, trend: FrequencyTrend) -> f64 {
    let frequency = (count as f64 * 0.5).min(FREQUENCY_CAP);
    let continuity = (distinct_years as f64 * CONTINUITY_CAP / 3.0).min(CONTINUITY_CAP);
    let direction = trend.direction_score();
    round2(W_FREQUENCY * frequency + W_CONTINUITY * continuity + W_DIRECTION * direction)
}

/// Derive recommendations from trend entries over the score/count
/// thresholds. `mapped_counts` is the learning-content mapping per
/// subject; `None` (lookup failed) falls back to the default gap.
pub fn recommendations(
    trends: &[TrendAnalysis],
    mapped_counts: Option<&HashMap<String, usize>>,
    analysis_date: NaiveDate,
) -> Vec<ContentRecommendation> {
    let mut recs: Vec<ContentRecommendation> = trends
        .iter()
        .filter(|t| t.trend_score >= MIN_TREND_SCORE && t.question_count >= MIN_QUESTION_COUNT)
        .map(|t| {
            let coverage_gap = match mapped_counts {
                None => DEFAULT_COVERAGE_GAP,
                Some(mapped) => {
                    let covered = mapped
                        .get(t.subject_category.as_str())
                        .copied()
                        .unwrap_or(0);
                    let rate = (covered as f64 / f64::from(t.question_count)).min(1.0);
                    round1((1.0 - rate) * 100.0)
                }
            };

            ContentRecommendation {
                analysis_date,
                subject_category: t.subject_category.clone(),
                sub_category: t.sub_category.clone(),
                priority_score: ((t.trend_score * 2.0) as i32).clamp(1, 10),
                recommended_title: format!(
                    "{} - {} 完全攻略",
                    t.subject_category, t.sub_category
                ),
                coverage_gap_percentage: coverage_gap,
                estimated_study_minutes: estimate_study_minutes(
                    t.question_count,
                    t.avg_difficulty,
                ),
                target_difficulty_level: (t.avg_difficulty as u8).clamp(1, 5),
                suggested_outline: outline_for(&t.subject_category),
            }
        })
        .collect();

    recs.sort_by(|a, b| b.priority_score.cmp(&a.priority_score));
    recs.truncate(MAX_RECOMMENDATIONS);
    recs
}

/// 5 minutes per question, scaled up with average difficulty.
fn estimate_study_minutes(question_count: u32, avg_difficulty: f64) -> u32 {
    let base = f64::from(question_count) * 5.0;
    let multiplier = 1.0 + (avg_difficulty - 1.0) * 0.3;
    (base * multiplier) as u32
}

/// Fixed per-subject outline templates.
fn outline_for(subject: &str) -> Vec<String> {
    let outline: &[&str] = match subject {
        "航空法規" => &[
            "1. 基本概念と定義",
            "2. 関連法令の構造",
            "3. 実務上の注意点",
            "4. 過去問題分析",
            "5. 実践演習",
        ],
        "航空工学" => &[
            "1. 基礎理論の解説",
            "2. 計算方法とコツ",
            "3. 図表の読み方",
            "4. 典型問題パターン",
            "5. 応用問題対策",
        ],
        "航空気象" => &[
            "1. 気象現象の基礎",
            "2. 観測データの読み方",
            "3. 予報の活用方法",
            "4. 安全運航への応用",
            "5. 事例研究",
        ],
        "空中航法" => &[
            "1. 航法の基本原理",
            "2. 機器の使用方法",
            "3. 計算手順とコツ",
            "4. エラー回避法",
            "5. 実戦的演習",
        ],
        "航空通信" => &[
            "1. 通信の基本ルール",
            "2. 標準用語と表現",
            "3. 緊急時の対応",
            "4. 実践的会話例",
            "5. 演習問題",
        ],
        _ => &[
            "1. 基本概念の理解",
            "2. 重要ポイントの整理",
            "3. 過去問題の分析",
            "4. 実践的演習",
            "5. まとめと確認",
        ],
    };
    outline.iter().map(|s| s.to_string()).collect()
}

fn analysis_notes(
    count: usize,
    avg_difficulty: f64,
    yearly: &BTreeMap<i32, u32>,
    trend: FrequencyTrend,
) -> String {
    let mut notes: Vec<String> = Vec::new();

    notes.push(
        if count > 15 {
            "高頻出分野"
        } else if count > 5 {
            "中頻出分野"
        } else {
            "低頻出分野"
        }
        .to_string(),
    );

    notes.push(
        match trend {
            FrequencyTrend::Increasing => "出題傾向が増加している重要分野",
            FrequencyTrend::Decreasing => "出題頻度が減少傾向",
            FrequencyTrend::Stable => "安定した出題パターン",
        }
        .to_string(),
    );

    notes.push(
        if avg_difficulty > 4.0 {
            "高難易度分野"
        } else if avg_difficulty > 3.0 {
            "中難易度分野"
        } else {
            "基本レベル分野"
        }
        .to_string(),
    );

    let years: Vec<i32> = yearly.keys().copied().collect();
    if years.len() >= 2 {
        let latest = i64::from(yearly[&years[years.len() - 1]]);
        let previous = i64::from(yearly[&years[years.len() - 2]]);
        let delta = latest - previous;
        match delta.cmp(&0) {
            Ordering::Greater => notes.push(format!("前年比+{delta}問")),
            Ordering::Less => notes.push(format!("前年比{delta}問")),
            Ordering::Equal => {}
        }
    }

    notes.join(" | ")
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yearly(pairs: &[(i32, u32)]) -> BTreeMap<i32, u32> {
        pairs.iter().copied().collect()
    }

    fn question(subject: &str, sub: &str, year: i32, difficulty: u8) -> StoredQuestion {
        StoredQuestion {
            exam_year: year,
            exam_month: 8,
            question_number: 1,
            subject_category: subject.to_string(),
            sub_category: sub.to_string(),
            difficulty_level: difficulty,
            importance_score: 6.0,
        }
    }

    #[test]
    fn rising_counts_classify_as_increasing() {
        let t = classify_frequency_trend(&yearly(&[(2022, 5), (2023, 5), (2024, 12)]));
        assert_eq!(t, FrequencyTrend::Increasing);
    }

    #[test]
    fn falling_counts_classify_as_decreasing() {
        let t = classify_frequency_trend(&yearly(&[(2022, 10), (2023, 5), (2024, 4)]));
        assert_eq!(t, FrequencyTrend::Decreasing);
    }

    #[test]
    fn flat_counts_classify_as_stable() {
        let t = classify_frequency_trend(&yearly(&[(2022, 5), (2023, 5), (2024, 5)]));
        assert_eq!(t, FrequencyTrend::Stable);
    }

    #[test]
    fn fewer_than_two_years_is_stable() {
        assert_eq!(
            classify_frequency_trend(&yearly(&[(2024, 30)])),
            FrequencyTrend::Stable
        );
        assert_eq!(classify_frequency_trend(&yearly(&[])), FrequencyTrend::Stable);
    }

    #[test]
    fn only_recent_three_years_count() {
        // Old spike outside the 3-year window must not affect the result.
        let t = classify_frequency_trend(&yearly(&[
            (2020, 100),
            (2022, 5),
            (2023, 5),
            (2024, 12),
        ]));
        assert_eq!(t, FrequencyTrend::Increasing);
    }

    #[test]
    fn trend_score_is_weighted_and_rounded() {
        // freq = min(10, 20*0.5) = 10, cont = min(5, 3*5/3) = 5,
        // dir = 3 → 0.4*10 + 0.3*5 + 0.3*3 = 6.4
        assert_eq!(trend_score(20, 3, FrequencyTrend::Increasing), 6.4);
        // freq = 1.0, cont = 5/3, dir = 2 → 0.4 + 0.5 + 0.6 = 1.5
        assert_eq!(trend_score(2, 1, FrequencyTrend::Stable), 1.5);
    }

    #[test]
    fn sub_scores_are_capped() {
        // freq capped at 10, cont capped at 5 → same as the (20, 3) case.
        let huge = trend_score(10_000, 50, FrequencyTrend::Increasing);
        assert_eq!(huge, 6.4);
    }

    #[test]
    fn analyze_groups_and_ranks() {
        let mut questions = Vec::new();
        for year in [2022, 2023, 2024] {
            for _ in 0..6 {
                questions.push(question("航空工学", "動力装置", year, 3));
            }
        }
        questions.push(question("航空法規", "国際条約", 2024, 2));

        let date = NaiveDate::from_ymd_opt(2025, 6, 21).unwrap();
        let trends = analyze(&questions, date);
        assert_eq!(trends.len(), 2);
        // The bigger group ranks first.
        assert_eq!(trends[0].subject_category, "航空工学");
        assert_eq!(trends[0].importance_rank, 1);
        assert_eq!(trends[1].importance_rank, 2);
        assert_eq!(trends[0].question_count, 18);
        assert_eq!(trends[0].yearly_data[&2024], 6);
        assert!(trends[0].analysis_notes.contains("高頻出分野"));
    }

    #[test]
    fn recommendations_apply_thresholds() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 21).unwrap();
        let mut questions = Vec::new();
        for year in [2022, 2023, 2024] {
            for _ in 0..4 {
                questions.push(question("航空気象", "気象情報", year, 4));
            }
        }
        // Too small a group for a recommendation.
        questions.push(question("航空通信", "管制業務", 2024, 3));

        let trends = analyze(&questions, date);
        let recs = recommendations(&trends, None, date);
        assert_eq!(recs.len(), 1);
        let rec = &recs[0];
        assert_eq!(rec.subject_category, "航空気象");
        assert_eq!(rec.coverage_gap_percentage, 50.0);
        assert!(rec.priority_score >= 1 && rec.priority_score <= 10);
        assert_eq!(rec.suggested_outline.len(), 5);
        assert!(rec.recommended_title.contains("完全攻略"));
    }

    #[test]
    fn coverage_gap_uses_mapping_counts() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 21).unwrap();
        let mut questions = Vec::new();
        for year in [2022, 2023, 2024] {
            for _ in 0..4 {
                questions.push(question("航空気象", "気象情報", year, 4));
            }
        }
        let trends = analyze(&questions, date);

        let mut mapped = HashMap::new();
        mapped.insert("航空気象".to_string(), 6usize);
        let recs = recommendations(&trends, Some(&mapped), date);
        // covered 6 of 12 questions → 50% gap
        assert_eq!(recs[0].coverage_gap_percentage, 50.0);

        let empty = HashMap::new();
        let recs = recommendations(&trends, Some(&empty), date);
        assert_eq!(recs[0].coverage_gap_percentage, 100.0);
    }

    #[test]
    fn study_minutes_scale_with_difficulty() {
        assert_eq!(estimate_study_minutes(10, 1.0), 50);
        let scaled = estimate_study_minutes(12, 4.0);
        assert!((113..=114).contains(&scaled), "got {scaled}");
        assert!(estimate_study_minutes(12, 5.0) > scaled);
    }
}
