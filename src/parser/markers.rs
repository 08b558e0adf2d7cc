use std::sync::LazyLock;

use regex::Regex;

// Boundary markers in priority order: 問題N / 問N, 例題N, then bare "N."
static QUESTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"問題?\s*(\d+)").unwrap());
static EXAMPLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"例題\s*(\d+)").unwrap());
static NUMBERED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*[.．]\s").unwrap());

/// Markers closer than this (in chars) to the previous raw match are
/// treated as the same boundary.
const MERGE_WINDOW: usize = 50;
/// Question bodies are cut off at this many chars.
const MAX_CONTENT_CHARS: usize = 2000;
/// Candidates shorter than this are dropped as noise.
const MIN_CONTENT_CHARS: usize = 20;

#[derive(Debug, Clone, Copy)]
pub struct Marker {
    /// Byte offset of the match start.
    pub pos: usize,
    pub number: u32,
}

#[derive(Debug, Clone)]
pub struct QuestionBlock {
    pub number: u32,
    pub content: String,
}

/// Scan the document for question-boundary markers: collect matches from
/// every pattern, sort by position (stable, so the earlier pattern wins a
/// tie), then collapse matches within MERGE_WINDOW chars of the previous
/// raw match.
pub fn scan_markers(text: &str) -> Vec<Marker> {
    let mut all: Vec<Marker> = Vec::new();
    for re in [&*QUESTION_RE, &*EXAMPLE_RE, &*NUMBERED_RE] {
        for caps in re.captures_iter(text) {
            let whole = caps.get(0).unwrap();
            if let Ok(number) = caps[1].parse::<u32>() {
                all.push(Marker {
                    pos: whole.start(),
                    number,
                });
            }
        }
    }
    all.sort_by_key(|m| m.pos);

    let mut kept: Vec<Marker> = Vec::with_capacity(all.len());
    let mut prev_pos: Option<usize> = None;
    for marker in all {
        let collapsed = prev_pos
            .is_some_and(|p| text[p..marker.pos].chars().count() <= MERGE_WINDOW);
        if !collapsed {
            kept.push(marker);
        }
        prev_pos = Some(marker.pos);
    }
    kept
}

/// Lazy iterator over (number, content) pairs; restartable by calling
/// [`question_blocks`] again on the same text.
pub struct QuestionBlocks<'a> {
    text: &'a str,
    markers: Vec<Marker>,
    idx: usize,
}

impl Iterator for QuestionBlocks<'_> {
    type Item = QuestionBlock;

    fn next(&mut self) -> Option<QuestionBlock> {
        while self.idx < self.markers.len() {
            let marker = self.markers[self.idx];
            let end = self
                .markers
                .get(self.idx + 1)
                .map(|m| m.pos)
                .unwrap_or(self.text.len());
            self.idx += 1;

            let content = truncate_chars(self.text[marker.pos..end].trim(), MAX_CONTENT_CHARS);
            if content.chars().count() < MIN_CONTENT_CHARS {
                continue;
            }
            return Some(QuestionBlock {
                number: marker.number,
                content,
            });
        }
        None
    }
}

pub fn question_blocks(text: &str) -> QuestionBlocks<'_> {
    QuestionBlocks {
        text,
        markers: scan_markers(text),
        idx: 0,
    }
}

/// Collect all blocks ordered by question number.
pub fn extract_sorted(text: &str) -> Vec<QuestionBlock> {
    let mut blocks: Vec<QuestionBlock> = question_blocks(text).collect();
    blocks.sort_by_key(|b| b.number);
    blocks
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => s[..i].trim_end().to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Long enough that consecutive markers sit outside the merge window.
    const FILLER: &str = "航空機の重心位置が後方限界を超えた場合に生じる縦の静安定性への影響として、次の記述のうち最も適切なものはどれか。なお、巡航高度および対気速度は一定とする。";

    #[test]
    fn two_question_document() {
        let doc = format!("問題1 {FILLER}\n\n問題2 {FILLER}\n");
        let numbers: Vec<u32> = question_blocks(&doc).map(|b| b.number).collect();
        assert_eq!(numbers, [1, 2]);
    }

    #[test]
    fn example_marker_is_recognized() {
        let doc = format!("例題1 {FILLER}");
        let blocks: Vec<_> = question_blocks(&doc).collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].number, 1);
    }

    #[test]
    fn numbered_dot_marker_is_recognized() {
        let doc = format!("1. {FILLER}");
        let blocks: Vec<_> = question_blocks(&doc).collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].number, 1);
    }

    #[test]
    fn nearby_markers_collapse_into_one() {
        // "問題1" and the "1." on the same heading line must not
        // produce two blocks.
        let doc = format!("問題1 1. {FILLER}\n");
        let blocks: Vec<_> = question_blocks(&doc).collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].number, 1);
    }

    #[test]
    fn short_blocks_are_skipped() {
        let padding = "\n".repeat(80);
        let doc = format!("問題1 短い{padding}問題2 {FILLER}");
        let numbers: Vec<u32> = question_blocks(&doc).map(|b| b.number).collect();
        assert!(!numbers.contains(&1));
        assert!(numbers.contains(&2));
    }

    #[test]
    fn content_is_truncated() {
        let long_body = FILLER.repeat(50);
        let doc = format!("問題1 {long_body}");
        let blocks: Vec<_> = question_blocks(&doc).collect();
        assert!(blocks[0].content.chars().count() <= 2000);
    }

    #[test]
    fn iterator_is_restartable() {
        let doc = format!("問題1 {FILLER}\n\n問題2 {FILLER}\n");
        let first: Vec<u32> = question_blocks(&doc).map(|b| b.number).collect();
        let second: Vec<u32> = question_blocks(&doc).map(|b| b.number).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn blocks_sort_by_number() {
        // Numbering out of document order still comes back sorted.
        let doc = format!("問題2 {FILLER}\n\n問題1 {FILLER}\n");
        let numbers: Vec<u32> = extract_sorted(&doc).iter().map(|b| b.number).collect();
        assert_eq!(numbers, [1, 2]);
    }

    #[test]
    fn fixture_extraction() {
        let doc = std::fs::read_to_string("tests/fixtures/202408_cpltest.md").unwrap();
        let blocks = extract_sorted(&doc);
        assert!(blocks.len() >= 5, "expected at least 5 questions, got {}", blocks.len());
        assert_eq!(blocks[0].number, 1);
    }
}
