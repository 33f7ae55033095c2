//! Topic gate: keyword filter that runs before the LLM.
//!
//! A message is forwarded to the generation backend only when it contains at
//! least one configured keyword. Matching is a case-insensitive substring
//! test, not a word-boundary match: `"fat"` matches `"fatigued"` and
//! `"rest"` matches `"interest"`. Off-topic messages get a fixed refusal and
//! never reach the LLM.

use tracing::debug;

/// Canned reply for messages that fail the topic gate.
pub const REFUSAL_MESSAGE: &str = "The topic is irrelevant, I can only answer questions related to gym topics like nutrition and workout.";

/// Built-in gym keywords.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "gym",
    "workout",
    "exercise",
    "fitness",
    "nutrition",
    "diet",
    "training",
    "muscle",
    "strength",
    "cardio",
    "weights",
    "bodybuilding",
    "health",
    "wellness",
    "supplements",
    "protein",
    "calories",
    "sleep",
    "rest",
    "recovery",
    "flexibility",
    "endurance",
    "aerobics",
    "yoga",
    "pilates",
    "HIIT",
    "crossfit",
    "stretching",
    "mobility",
];

/// Ordered, lower-cased trigger strings.
///
/// Empty entries are dropped at construction, so an empty message never
/// matches. Duplicates are kept; they only cost a redundant comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordSet {
    keywords: Vec<String>,
}

impl KeywordSet {
    /// Build a set from any list of keywords.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    /// The built-in gym keyword list.
    pub fn gym_defaults() -> Self {
        Self::new(DEFAULT_KEYWORDS)
    }

    /// Parse a comma-separated list (`"gym, yoga,cardio"`).
    pub fn from_csv(list: &str) -> Self {
        Self::new(list.split(','))
    }

    /// Parse one keyword per line. Blank lines and `#` comments are skipped.
    pub fn from_lines(text: &str) -> Self {
        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.starts_with('#')),
        )
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keywords.iter().map(String::as_str)
    }

    /// First keyword contained in `message`, if any.
    pub fn first_match(&self, message: &str) -> Option<&str> {
        let message = message.to_lowercase();
        self.iter().find(|keyword| message.contains(keyword))
    }
}

impl Default for KeywordSet {
    fn default() -> Self {
        Self::gym_defaults()
    }
}

/// `true` if any keyword occurs anywhere in `message`, ignoring case.
pub fn classify(message: &str, keywords: &KeywordSet) -> bool {
    keywords.first_match(message).is_some()
}

/// Outcome of running a message through the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicVerdict {
    /// Forward to the generation backend.
    Relevant,
    /// Answer with the refusal string.
    Irrelevant,
}

impl TopicVerdict {
    pub fn is_relevant(self) -> bool {
        matches!(self, TopicVerdict::Relevant)
    }
}

/// Keyword set in front of the generation backend.
///
/// Immutable after construction; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct TopicGate {
    keywords: KeywordSet,
}

impl TopicGate {
    pub fn new(keywords: KeywordSet) -> Self {
        Self { keywords }
    }

    pub fn keywords(&self) -> &KeywordSet {
        &self.keywords
    }

    /// Reply for messages the gate turns away.
    pub fn refusal(&self) -> &'static str {
        REFUSAL_MESSAGE
    }

    /// Classify a message.
    pub fn evaluate(&self, message: &str) -> TopicVerdict {
        match self.keywords.first_match(message) {
            Some(keyword) => {
                debug!(keyword, "Message matched topic keyword");
                TopicVerdict::Relevant
            }
            None => {
                debug!(chars = message.chars().count(), "Message matched no topic keyword");
                TopicVerdict::Irrelevant
            }
        }
    }
}

impl Default for TopicGate {
    fn default() -> Self {
        Self::new(KeywordSet::gym_defaults())
    }
}
