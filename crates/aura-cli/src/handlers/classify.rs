//! Classify command handler.

use anyhow::Result;
use aura_core::LexiconClassifier;
use serde_json::json;

/// Score `text` with the built-in lexicon and print the resulting emotion.
pub fn execute(text: &str, json: bool) -> Result<()> {
    let score = LexiconClassifier::new().score(text);
    let emotion = score.emotion();

    if json {
        let value = json!({
            "text": text,
            "emotion": emotion,
            "score": score.score,
            "comparative": score.comparative,
            "tokens": score.tokens,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!(
            "{emotion} (score {}, comparative {:.3}, {} tokens)",
            score.score, score.comparative, score.tokens
        );
    }
    Ok(())
}
