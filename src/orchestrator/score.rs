//! Auto-score parsing: JSON object → numeric-keyword heuristic → neutral
//! default, mirroring the parse-cascade shape of
//! `advisory/synthesis.rs::CouncilSynthesis::parse` (structured JSON first,
//! looser format second, give up to a safe default last).

use serde::Deserialize;
use tracing::warn;

/// Used when every parse strategy fails (§9 "auto-score failure handling").
pub const NEUTRAL_DEFAULT_SCORE: u8 = 5;

#[derive(Deserialize)]
struct ScoreReply {
    score: i64,
}

/// Parse the Auto-Scorer's raw reply into a clamped `1..=10` score. Never
/// fails: auto-score failure is non-fatal per spec.md §4.5(d).
pub fn parse_auto_score(raw: &str) -> u8 {
    if let Some(score) = parse_json_object(raw) {
        return score;
    }
    warn!("auto-score JSON parse failed, falling back to numeric-keyword heuristic");
    if let Some(score) = numeric_keyword_heuristic(raw) {
        return score;
    }
    warn!(default = NEUTRAL_DEFAULT_SCORE, "auto-score heuristic failed, using neutral default");
    NEUTRAL_DEFAULT_SCORE
}

fn parse_json_object(raw: &str) -> Option<u8> {
    let candidate = extract_json_block(raw);
    let reply: ScoreReply = serde_json::from_str(candidate).ok()?;
    Some(clamp(reply.score))
}

/// Strip a ```json fenced block if present; otherwise try the raw text, then
/// the first `{...}` span found anywhere in it.
fn extract_json_block(text: &str) -> &str {
    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if end >= start {
            return text[start..=end].trim();
        }
    }
    text.trim()
}

/// Looks for the first standalone integer 1..=10 in the text as a last
/// resort when the reply wasn't valid JSON at all.
fn numeric_keyword_heuristic(raw: &str) -> Option<u8> {
    for token in raw.split(|c: char| !c.is_ascii_digit()) {
        if token.is_empty() {
            continue;
        }
        if let Ok(n) = token.parse::<i64>() {
            if (1..=10).contains(&n) {
                return Some(n as u8);
            }
        }
    }
    None
}

fn clamp(score: i64) -> u8 {
    score.clamp(1, 10) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_json() {
        assert_eq!(parse_auto_score(r#"{"score": 7, "reasoning": "solid"}"#), 7);
    }

    #[test]
    fn parses_fenced_json() {
        assert_eq!(parse_auto_score("```json\n{\"score\": 9}\n```"), 9);
    }

    #[test]
    fn clamps_out_of_range_scores() {
        assert_eq!(parse_auto_score(r#"{"score": 42}"#), 10);
        assert_eq!(parse_auto_score(r#"{"score": -3}"#), 1);
    }

    #[test]
    fn falls_back_to_numeric_keyword() {
        assert_eq!(parse_auto_score("I'd rate this an 8 out of 10."), 8);
    }

    #[test]
    fn falls_back_to_neutral_default() {
        assert_eq!(parse_auto_score("no numbers here at all"), NEUTRAL_DEFAULT_SCORE);
    }
}
