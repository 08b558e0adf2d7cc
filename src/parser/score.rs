use std::collections::BTreeSet;

// Distinct technical-term hits push difficulty up at 3 and 5.
const TECHNICAL_TERMS: &[&str] = &[
    "空港", "航空機", "計器", "飛行場", "管制塔", "滑走路",
    "ils", "vor", "dme", "rnav", "gps", "tacan",
];

const COMPLEX_MARKERS: &[&str] = &["計算", "図表", "複数", "組み合わせ", "いくつ"];
const BASIC_MARKERS: &[&str] = &["正しい", "誤り", "どれか", "説明"];

const SUBJECT_WEIGHTS: &[(&str, f64)] = &[
    ("航空工学", 1.2),
    ("航空気象", 1.1),
    ("空中航法", 1.0),
    ("航空通信", 0.9),
    ("航空法規", 0.8),
];

// Tag expansion per trigger keyword.
const KEYWORD_TAGS: &[(&str, &[&str])] = &[
    ("計器", &["計器飛行"]),
    ("気象", &["天候", "気象現象"]),
    ("管制", &["ATC", "交信"]),
    ("航法", &["ナビゲーション"]),
    ("法規", &["規則", "法令"]),
];

/// Estimate difficulty on a 1-5 scale from text length, technical-term
/// density and complexity markers.
pub fn estimate_difficulty(text: &str) -> u8 {
    let lower = text.to_lowercase();
    let chars = text.chars().count();
    let mut level: i32 = 3;

    if chars > 400 {
        level += 1;
    } else if chars < 150 {
        level -= 1;
    }

    let term_hits = TECHNICAL_TERMS.iter().filter(|t| lower.contains(*t)).count();
    if term_hits >= 3 {
        level += 1;
    }
    if term_hits >= 5 {
        level += 1;
    }

    if COMPLEX_MARKERS.iter().any(|m| lower.contains(*m)) {
        level += 1;
    }
    if BASIC_MARKERS.iter().all(|m| lower.contains(*m)) {
        level -= 1;
    }

    level.clamp(1, 5) as u8
}

/// Importance on a 1.0-10.0 scale: subject-weighted base, difficulty
/// offset, text-length adjustment; one decimal place.
pub fn importance_score(subject: &str, difficulty: u8, text_chars: usize) -> f64 {
    let weight = SUBJECT_WEIGHTS
        .iter()
        .find(|(s, _)| *s == subject)
        .map(|(_, w)| *w)
        .unwrap_or(1.0);

    let mut score = 5.0 * weight;
    score += (f64::from(difficulty) - 3.0) * 0.5;

    if text_chars > 300 {
        score += 0.3;
    } else if text_chars < 100 {
        score -= 0.3;
    }

    (score.clamp(1.0, 10.0) * 10.0).round() / 10.0
}

/// Base tags (CPL, exam year, subject) plus keyword-triggered tags,
/// deduplicated and sorted.
pub fn generate_tags(text: &str, subject: &str, year: i32) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut tags: BTreeSet<String> = BTreeSet::new();
    tags.insert("CPL".to_string());
    tags.insert(format!("{year}年"));
    tags.insert(subject.to_string());

    for (keyword, extra) in KEYWORD_TAGS {
        if lower.contains(keyword) {
            for tag in *extra {
                tags.insert((*tag).to_string());
            }
        }
    }

    tags.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_plain_text_scores_low() {
        assert_eq!(estimate_difficulty("短い問題文"), 2);
    }

    #[test]
    fn medium_text_stays_at_base() {
        let text = "あ".repeat(200);
        assert_eq!(estimate_difficulty(&text), 3);
    }

    #[test]
    fn complexity_marker_raises_difficulty() {
        let text = format!("{}この値を計算せよ", "あ".repeat(200));
        assert_eq!(estimate_difficulty(&text), 4);
    }

    #[test]
    fn difficulty_is_clamped_to_five() {
        // Long text + 5 technical terms + complexity marker would be 7
        // unclamped.
        let text = format!(
            "{}空港の滑走路でILSとVORとGPSの計算を行う",
            "あ".repeat(450)
        );
        assert_eq!(estimate_difficulty(&text), 5);
    }

    #[test]
    fn difficulty_is_clamped_to_one() {
        // Short text with every basic marker: 3 - 1 - 1 = 1.
        let text = "正しい記述はどれか。誤りの説明を選べ。";
        assert_eq!(estimate_difficulty(text), 1);
    }

    #[test]
    fn difficulty_always_within_range() {
        let samples = [
            String::new(),
            "あ".repeat(10_000),
            format!("{}空港 航空機 計器 飛行場 管制塔 滑走路 計算 図表", "あ".repeat(500)),
        ];
        for text in &samples {
            let d = estimate_difficulty(text);
            assert!((1..=5).contains(&d), "difficulty {} out of range", d);
        }
    }

    #[test]
    fn importance_uses_subject_weight() {
        // Base 5.0 * 1.2 at difficulty 3, mid-length text.
        assert_eq!(importance_score("航空工学", 3, 200), 6.0);
        assert_eq!(importance_score("航空法規", 3, 200), 4.0);
    }

    #[test]
    fn importance_adjusts_for_difficulty_and_length() {
        // 5.0 * 1.0 + (5-3)*0.5 + 0.3 = 6.3
        assert_eq!(importance_score("空中航法", 5, 400), 6.3);
        // 5.0 * 1.0 + (1-3)*0.5 - 0.3 = 3.7
        assert_eq!(importance_score("空中航法", 1, 50), 3.7);
    }

    #[test]
    fn importance_is_clamped_and_rounded() {
        let v = importance_score("航空工学", 5, 400);
        assert!(v <= 10.0);
        assert_eq!(v, (v * 10.0).round() / 10.0);
        assert!(importance_score("航空法規", 1, 10) >= 1.0);
    }

    #[test]
    fn tags_include_base_and_keyword_tags() {
        let tags = generate_tags("計器の気象条件", "航空工学", 2024);
        assert!(tags.contains(&"CPL".to_string()));
        assert!(tags.contains(&"2024年".to_string()));
        assert!(tags.contains(&"航空工学".to_string()));
        assert!(tags.contains(&"計器飛行".to_string()));
        assert!(tags.contains(&"天候".to_string()));
    }

    #[test]
    fn tags_are_deduplicated() {
        let tags = generate_tags("計器 計器 計器", "航空工学", 2024);
        let unique: std::collections::HashSet<_> = tags.iter().collect();
        assert_eq!(unique.len(), tags.len());
    }
}
