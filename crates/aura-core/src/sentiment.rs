//! Text-to-emotion classification.
//!
//! [`EmotionClassifier`] is the port the presence engine calls for both the
//! agent's turn text and the user's transcripts. [`LexiconClassifier`] is the
//! built-in implementation: the AFINN-165 word-valence lexicon with simple
//! negation handling, normalised by token count.
//!
//! | comparative score `s` | emotion |
//! |---|---|
//! | `s >= 0.5`  | [`Emotion::Happy`] |
//! | `s <= -0.5` | [`Emotion::Sad`] |
//! | otherwise   | [`Emotion::Neutral`] |

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use crate::emotion::Emotion;

/// Comparative score at or above which text reads as happy.
pub const HAPPY_THRESHOLD: f32 = 0.5;

/// Comparative score at or below which text reads as sad.
pub const SAD_THRESHOLD: f32 = -0.5;

/// Pure, deterministic mapping from a text fragment to an [`Emotion`].
pub trait EmotionClassifier: Send + Sync {
    /// Classify a text fragment.
    fn classify(&self, text: &str) -> Emotion;
}

impl<F> EmotionClassifier for F
where
    F: Fn(&str) -> Emotion + Send + Sync,
{
    fn classify(&self, text: &str) -> Emotion {
        self(text)
    }
}

/// Raw result of scoring a text fragment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentScore {
    /// Sum of word valences (after negation).
    pub score: i32,
    /// `score / tokens`, or 0 for empty input.
    pub comparative: f32,
    /// Number of tokens the text was split into.
    pub tokens: usize,
}

impl SentimentScore {
    /// Map the comparative score onto an [`Emotion`].
    #[must_use]
    pub fn emotion(&self) -> Emotion {
        emotion_from_comparative(self.comparative)
    }
}

/// Apply the happy/sad thresholds to a normalised sentiment score.
#[must_use]
pub fn emotion_from_comparative(comparative: f32) -> Emotion {
    if comparative >= HAPPY_THRESHOLD {
        Emotion::Happy
    } else if comparative <= SAD_THRESHOLD {
        Emotion::Sad
    } else {
        Emotion::Neutral
    }
}

/// Lexicon-based classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexiconClassifier;

impl LexiconClassifier {
    /// Create a classifier backed by the built-in lexicon.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Score a text fragment without thresholding it.
    #[must_use]
    pub fn score(&self, text: &str) -> SentimentScore {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return SentimentScore {
                score: 0,
                comparative: 0.0,
                tokens: 0,
            };
        }

        let mut score = 0;
        for (i, token) in tokens.iter().enumerate() {
            let Some(&valence) = LEXICON.get(token.as_str()) else {
                continue;
            };
            let negated = i > 0 && NEGATORS.contains(tokens[i - 1].as_str());
            score += if negated { -valence } else { valence };
        }

        #[allow(clippy::cast_precision_loss)]
        let comparative = score as f32 / tokens.len() as f32;

        SentimentScore {
            score,
            comparative,
            tokens: tokens.len(),
        }
    }
}

impl EmotionClassifier for LexiconClassifier {
    fn classify(&self, text: &str) -> Emotion {
        let result = self.score(text);
        tracing::trace!(
            score = result.score,
            comparative = result.comparative,
            tokens = result.tokens,
            "Scored text"
        );
        result.emotion()
    }
}

/// Lower-case, blank out punctuation (apostrophes and hyphens survive) and
/// split on whitespace.
fn tokenize(text: &str) -> Vec<String> {
    const STRIPPED: &[char] = &[
        '.', ',', '/', '#', '!', '$', '%', '^', '&', '*', ';', ':', '{', '}', '=', '_', '`', '"',
        '~', '(', ')',
    ];

    text.to_lowercase()
        .chars()
        .map(|c| if STRIPPED.contains(&c) { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

static NEGATORS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "not", "no", "never", "none", "nobody", "nothing", "neither", "nor", "nowhere", "cannot",
        "cant", "can't", "dont", "don't", "doesnt", "doesn't", "didnt", "didn't", "isnt",
        "isn't", "arent", "aren't", "wasnt", "wasn't", "werent", "weren't", "wont", "won't",
        "wouldnt", "wouldn't", "shouldnt", "shouldn't", "couldnt", "couldn't", "havent",
        "haven't", "hasnt", "hasn't", "hadnt", "hadn't", "aint", "ain't", "without", "rarely",
        "seldom",
    ]
    .into_iter()
    .collect()
});

/// AFINN-165 word list, one `word<TAB>valence` pair per line.
const AFINN_165: &str = include_str!("../data/afinn-165.txt");

static LEXICON: LazyLock<HashMap<&'static str, i32>> = LazyLock::new(|| parse_lexicon(AFINN_165));

/// Malformed lines are skipped.
fn parse_lexicon(source: &'static str) -> HashMap<&'static str, i32> {
    source
        .lines()
        .filter_map(|line| {
            let (word, valence) = line.split_once('\t')?;
            Some((word.trim(), valence.trim().parse().ok()?))
        })
        .collect()
}
