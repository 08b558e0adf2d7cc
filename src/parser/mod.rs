pub mod classify;
pub mod markers;
pub mod score;

use std::sync::LazyLock;

use regex::Regex;

static CHOICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\(([1-4])\)\s*(.+)$").unwrap());
static ANSWER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*正解[:：]\s*\((\d+)\)").unwrap());

#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub file: String,
    pub year: i32,
    pub month: u32,
}

/// One classified, scored exam question. Built once per extraction pass;
/// never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Question {
    pub number: u32,
    pub text: String,
    pub options: Vec<(String, String)>,
    pub correct_answer: Option<u32>,
    pub subject: &'static str,
    pub sub_category: &'static str,
    pub difficulty: u8,
    pub importance: f64,
    pub tags: Vec<String>,
    pub source: SourceDocument,
}

/// Full pipeline over one document: boundary markers → question blocks →
/// classified and scored records, ordered by question number.
pub fn process_document(text: &str, source: &SourceDocument) -> Vec<Question> {
    let mut questions: Vec<Question> = markers::question_blocks(text)
        .map(|block| build_question(block, source))
        .collect();
    questions.sort_by_key(|q| q.number);
    questions
}

fn build_question(block: markers::QuestionBlock, source: &SourceDocument) -> Question {
    let (options, correct_answer) = parse_choices(&block.content);
    let subject = classify::classify_subject(&block.content);
    let sub_category = classify::classify_sub_category(&block.content, subject);
    let difficulty = score::estimate_difficulty(&block.content);
    let chars = block.content.chars().count();
    let importance = score::importance_score(subject, difficulty, chars);
    let tags = score::generate_tags(&block.content, subject, source.year);

    Question {
        number: block.number,
        text: block.content,
        options,
        correct_answer,
        subject,
        sub_category,
        difficulty,
        importance,
        tags,
        source: source.clone(),
    }
}

/// Pull labeled answer choices "(1) …" and the "**正解: (N)" marker out
/// of a question body. Both are optional.
fn parse_choices(content: &str) -> (Vec<(String, String)>, Option<u32>) {
    let options: Vec<(String, String)> = CHOICE_RE
        .captures_iter(content)
        .map(|caps| (caps[1].to_string(), caps[2].trim().to_string()))
        .collect();

    let correct = ANSWER_RE
        .captures(content)
        .and_then(|caps| caps[1].parse::<u32>().ok());

    (options, correct)
}
