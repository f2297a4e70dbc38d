use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const STATEMENT_KEYWORDS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "CREATE", "ALTER", "DROP", "TRUNCATE",
];

// A language hint only counts when it runs to the end of its line, so
// "```SELECT 1```" keeps its SELECT.
static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)```(?:[a-z0-9_+\-]+[ \t\r]*$)?").expect("fence pattern is valid")
});

static REASONING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<think>.*?</think>|<thinking>.*?</thinking>")
        .expect("reasoning pattern is valid")
});

static KEYWORD_SUBSTRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("(?i)(?:{})", STATEMENT_KEYWORDS.join("|")))
        .expect("keyword pattern is valid")
});

static KEYWORD_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(?:{})\b", STATEMENT_KEYWORDS.join("|")))
        .expect("keyword pattern is valid")
});

/// How the statement keyword is located in the cleaned completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeywordMatch {
    /// Any occurrence, including inside identifiers such as `CREATE_DATE`.
    #[default]
    Substring,
    /// Only whole words.
    WordBoundary,
}

impl KeywordMatch {
    fn pattern(self) -> &'static Regex {
        match self {
            KeywordMatch::Substring => &KEYWORD_SUBSTRING,
            KeywordMatch::WordBoundary => &KEYWORD_WORD,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlExtractor {
    keyword_match: KeywordMatch,
}

impl SqlExtractor {
    pub fn new(keyword_match: KeywordMatch) -> Self {
        Self { keyword_match }
    }

    /// Strips formatting artifacts from a model completion and cuts it at the
    /// first statement keyword. Without a keyword the trimmed text is
    /// returned as is.
    pub fn clean(&self, raw: &str) -> String {
        let mut text = raw.to_owned();
        // Removing one marker can join the halves of another.
        loop {
            let stripped = FENCE.replace_all(&text, "");
            let stripped = REASONING.replace_all(&stripped, "").into_owned();
            if stripped == text {
                break;
            }
            text = stripped;
        }
        let text = text.trim();
        match self.keyword_match.pattern().find(text) {
            Some(keyword) => text[keyword.start()..].trim().to_owned(),
            None => text.to_owned(),
        }
    }
}

/// Whether `sql` begins with one of [`STATEMENT_KEYWORDS`].
pub fn starts_with_statement_keyword(sql: &str) -> bool {
    let sql = sql.trim_start();
    STATEMENT_KEYWORDS.iter().any(|keyword| {
        sql.get(..keyword.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(keyword))
    })
}

pub fn clean_sql_output(raw: &str) -> String {
    SqlExtractor::default().clean(raw)
}
