//! Structured Extraction
//!
//! Best-effort recovery of structure (SQL text, chart specs, suggestion
//! objects) from free-form model output. A [`FallbackChain`] tries total
//! parsers in order and the first structural success wins; a miss is never an
//! error, callers apply their own deterministic fallback.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// A parser that never fails, it either finds something or returns `None`
pub trait TextParser<T>: Send + Sync {
    fn name(&self) -> &str;
    fn parse(&self, text: &str) -> Option<T>;
}

pub struct FallbackChain<T> {
    parsers: Vec<Box<dyn TextParser<T>>>,
}

impl<T> FallbackChain<T> {
    pub fn new() -> Self {
        Self { parsers: Vec::new() }
    }

    pub fn then(mut self, parser: impl TextParser<T> + 'static) -> Self {
        self.parsers.push(Box::new(parser));
        self
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }

    pub fn extract(&self, text: &str) -> Option<T> {
        for parser in &self.parsers {
            if let Some(found) = parser.parse(text) {
                debug!(parser = parser.name(), "Extraction matched");
                return Some(found);
            }
        }
        None
    }
}

impl<T> Default for FallbackChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// JSON objects
// ---------------------------------------------------------------------------

/// Target shape of a JSON object: the keys a complete object carries, and the
/// discriminant key every accepted object must at least contain.
#[derive(Debug, Clone)]
pub struct JsonShape {
    pub required_keys: Vec<&'static str>,
    pub discriminant: &'static str,
}

impl JsonShape {
    pub fn new(required_keys: &[&'static str], discriminant: &'static str) -> Self {
        Self {
            required_keys: required_keys.to_vec(),
            discriminant,
        }
    }

    /// Strict, loose, then generic pattern
    pub fn chain(&self) -> FallbackChain<Map<String, Value>> {
        let mut chain = FallbackChain::new();

        let strict = format!(
            r#"\{{[^{{}}]*{}[^{{}}]*\}}"#,
            self.required_keys
                .iter()
                .map(|key| regex::escape(&format!("\"{}\"", key)))
                .collect::<Vec<_>>()
                .join("[^{}]*")
        );
        let loose = format!(
            r#"\{{[^{{}}]*{}[^{{}}]*\}}"#,
            regex::escape(&format!("\"{}\"", self.discriminant))
        );

        for (name, pattern) in [("strict", strict), ("loose", loose)] {
            match Regex::new(&pattern) {
                Ok(regex) => {
                    chain = chain.then(JsonPatternParser {
                        name,
                        regex,
                        discriminant: self.discriminant,
                    });
                }
                Err(e) => warn!("Skipping {} extraction pattern: {}", name, e),
            }
        }

        chain.then(JsonPatternParser {
            name: "generic",
            regex: GENERIC_OBJECT.clone(),
            discriminant: self.discriminant,
        })
    }
}

lazy_static! {
    static ref GENERIC_OBJECT: Regex = Regex::new(r"(?s)\{.*\}").expect("static pattern");
    static ref FENCED_BLOCK: Regex =
        Regex::new(r"(?is)```[a-z]*[ \t]*\r?\n?(.*?)```").expect("static pattern");
    static ref SELECT_KEYWORD: Regex = Regex::new(r"(?i)\bselect\b").expect("static pattern");
    static ref LEADING_WITH: Regex = Regex::new(r"(?i)^with\b").expect("static pattern");
}

/// Tries every match of one pattern; a match that does not parse as an
/// object carrying the discriminant moves on to the next match.
struct JsonPatternParser {
    name: &'static str,
    regex: Regex,
    discriminant: &'static str,
}

impl TextParser<Map<String, Value>> for JsonPatternParser {
    fn name(&self) -> &str {
        self.name
    }

    fn parse(&self, text: &str) -> Option<Map<String, Value>> {
        self.regex.find_iter(text).find_map(|m| {
            match serde_json::from_str::<Value>(m.as_str()) {
                Ok(Value::Object(map)) if map.contains_key(self.discriminant) => Some(map),
                _ => None,
            }
        })
    }
}

/// Extract the first JSON object matching `shape`
pub fn extract_json_object(text: &str, shape: &JsonShape) -> Option<Map<String, Value>> {
    shape.chain().extract(text)
}

// ---------------------------------------------------------------------------
// SQL text
// ---------------------------------------------------------------------------

/// Drop conversational preamble: the query starts at the first SELECT unless
/// the text already opens with a CTE.
fn trim_to_query(text: &str) -> String {
    let text = text.trim();
    if LEADING_WITH.is_match(text) {
        return text.to_string();
    }
    match SELECT_KEYWORD.find(text) {
        Some(m) => text[m.start()..].trim().to_string(),
        None => text.to_string(),
    }
}

/// Contents of the first fenced code block
struct FencedSqlParser;

impl TextParser<String> for FencedSqlParser {
    fn name(&self) -> &str {
        "fenced-block"
    }

    fn parse(&self, text: &str) -> Option<String> {
        let caps = FENCED_BLOCK.captures(text)?;
        let sql = trim_to_query(caps.get(1)?.as_str());
        (!sql.is_empty()).then_some(sql)
    }
}

/// Whole response with stray fence markers removed
struct BareSqlParser;

impl TextParser<String> for BareSqlParser {
    fn name(&self) -> &str {
        "bare-text"
    }

    fn parse(&self, text: &str) -> Option<String> {
        let stripped = text.replace("```sql", "").replace("```SQL", "").replace("```", "");
        let sql = trim_to_query(&stripped);
        (!sql.is_empty()).then_some(sql)
    }
}

pub fn sql_chain() -> FallbackChain<String> {
    FallbackChain::new().then(FencedSqlParser).then(BareSqlParser)
}

/// Extract SQL text from a generation response, `None` if nothing is left
pub fn extract_sql(text: &str) -> Option<String> {
    sql_chain().extract(text)
}
