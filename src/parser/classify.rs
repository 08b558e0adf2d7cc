/// Fallback subject when no keyword table matches.
pub const DEFAULT_SUBJECT: &str = "航空工学";

// Ordered rule table: the first subject with any substring hit wins.
// Reordering entries changes historical classifications; keep as-is.
const SUBJECT_RULES: &[(&str, &[&str])] = &[
    (
        "航空工学",
        &[
            "ピトー", "静圧", "計器", "速度計", "cas", "ias", "tas",
            "プロペラ", "エンジン", "動力", "燃料", "油圧", "電気",
            "翼", "機体", "構造", "材料", "強度", "応力",
            "航空力学", "揚力", "抗力", "失速", "マッハ",
            "重量", "重心", "荷重", "バランス",
        ],
    ),
    (
        "航空気象",
        &[
            "気温", "気圧", "湿度", "露点", "雲", "霧", "雨", "雪",
            "風", "乱気流", "雷", "台風", "前線", "高気圧", "低気圧",
            "逆転", "対流", "安定", "不安定", "大気", "気象",
            "視程", "icao", "標準大気",
        ],
    ),
    (
        "空中航法",
        &[
            "航法", "gps", "vor", "dme", "ils", "rnav",
            "磁方位", "真方位", "偏差", "自差", "コンパス",
            "地図", "チャート", "座標", "経度", "緯度",
            "crm", "人的要因", "疲労", "ヒューマンエラー",
        ],
    ),
    (
        "航空通信",
        &[
            "管制", "atc", "交信", "無線", "周波数", "vhf", "hf",
            "トランスポンダ", "squawk", "レーダー",
            "飛行計画", "fir", "コールサイン", "管制圏",
            "進入", "出発", "着陸", "離陸",
        ],
    ),
    (
        "航空法規",
        &[
            "航空法", "規則", "条約", "icao", "国際",
            "免許", "資格", "医学適性", "身体検査",
            "飛行規則", "vfr", "ifr", "最低気象条件",
            "禁止区域", "制限区域", "危険区域",
            "航空機登録", "耐空証明",
        ],
    ),
];

// Per-subject sub-category tables, same first-match-wins policy, with a
// fixed default label per subject.
const SUB_CATEGORY_RULES: &[(&str, &[(&str, &[&str])], &str)] = &[
    (
        "航空工学",
        &[
            ("航空計器", &["ピトー", "計器", "速度計", "高度計"]),
            ("動力装置", &["プロペラ", "エンジン", "動力"]),
            ("航空機構造", &["翼", "機体", "構造"]),
            ("航空力学", &["揚力", "抗力", "航空力学"]),
        ],
        "航空機装備",
    ),
    (
        "航空気象",
        &[
            ("大気の物理", &["大気", "気温", "気圧"]),
            ("大気の運動", &["風", "前線", "高気圧"]),
            ("高層気象と気象障害", &["雲", "乱気流", "雷"]),
        ],
        "気象情報",
    ),
    (
        "空中航法",
        &[
            ("航法", &["vor", "dme", "gps", "航法"]),
            ("人間の能力及び限界に関する一般知識", &["crm", "人的要因"]),
        ],
        "運航方式に関する一般知識",
    ),
    (
        "航空通信",
        &[("管制業務", &["管制", "atc"])],
        "航空交通業務",
    ),
    (
        "航空法規",
        &[("国際条約", &["条約", "icao", "国際"])],
        "航空法及び航空法施行規則",
    ),
];

/// Map question text to its subject category: first table entry with a
/// substring hit in the lowercased text wins.
pub fn classify_subject(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    for (subject, keywords) in SUBJECT_RULES {
        if keywords.iter().any(|k| lower.contains(k)) {
            return subject;
        }
    }
    DEFAULT_SUBJECT
}

/// Assign the finer-grained label within an already-chosen subject.
pub fn classify_sub_category(text: &str, subject: &'static str) -> &'static str {
    let lower = text.to_lowercase();
    for (subj, rules, default) in SUB_CATEGORY_RULES {
        if *subj != subject {
            continue;
        }
        for (label, keywords) in *rules {
            if keywords.iter().any(|k| lower.contains(k)) {
                return label;
            }
        }
        return default;
    }
    subject
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_hit_picks_subject() {
        assert_eq!(classify_subject("エンジンの滑油系統について"), "航空工学");
        assert_eq!(classify_subject("台風の進路と勢力について"), "航空気象");
        assert_eq!(classify_subject("コールサインの使用方法"), "航空通信");
        assert_eq!(classify_subject("耐空証明の有効期間"), "航空法規");
    }

    #[test]
    fn no_hit_falls_back_to_default() {
        assert_eq!(classify_subject("全く関係のない文章です"), DEFAULT_SUBJECT);
    }

    #[test]
    fn ascii_keywords_match_case_insensitively() {
        assert_eq!(classify_subject("GPS を用いた位置決定"), "空中航法");
        assert_eq!(classify_subject("gps を用いた位置決定"), "空中航法");
    }

    #[test]
    fn first_table_entry_wins_on_multi_match() {
        // 計器 (航空工学) and 管制 (航空通信) both hit; 航空工学 is listed
        // first so it must win.
        let text = "計器の指示を管制に通報する";
        assert_eq!(classify_subject(text), "航空工学");
        // 乱気流 (航空気象) and レーダー (航空通信): 航空気象 wins.
        assert_eq!(classify_subject("乱気流をレーダーで検出する"), "航空気象");
    }

    #[test]
    fn classification_is_idempotent() {
        let text = "VOR と DME を併用する航法";
        let first = classify_subject(text);
        assert_eq!(classify_subject(text), first);
        assert_eq!(classify_subject(text), first);
    }

    #[test]
    fn sub_category_first_match_wins() {
        // ピトー (航空計器) before エンジン (動力装置) in table order.
        assert_eq!(
            classify_sub_category("ピトー管とエンジンの整備", "航空工学"),
            "航空計器"
        );
        assert_eq!(
            classify_sub_category("エンジンの出力低下", "航空工学"),
            "動力装置"
        );
    }

    #[test]
    fn sub_category_defaults_per_subject() {
        assert_eq!(classify_sub_category("該当なし", "航空工学"), "航空機装備");
        assert_eq!(classify_sub_category("該当なし", "航空気象"), "気象情報");
        assert_eq!(
            classify_sub_category("該当なし", "航空法規"),
            "航空法及び航空法施行規則"
        );
    }

    #[test]
    fn unknown_subject_falls_back_to_itself() {
        assert_eq!(classify_sub_category("何か", "その他"), "その他");
    }
}
