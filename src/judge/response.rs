//! Defensive extraction of a score and rationale from evaluator text.
//!
//! Evaluators are asked for JSON but often wrap it in prose or code fences,
//! or answer in free text ("Score: 85/100"). Strategies, in order:
//! 1. A JSON object anywhere in the text with a `score` field
//! 2. A labelled `score: NN` or `score: NN/100`
//! 3. A bare `NN/100` or `NN%`
//!
//! Every score is on the 0-100 scale the prompt asks for. Scale echoes such
//! as "(0-100)" are ignored before matching.

use std::sync::LazyLock;

use regex::Regex;

use super::error::{JudgeError, JudgeResult};

static SCALE_ECHO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\(?\s*\b(?:0\s*(?:-|–|to)\s*|out\s+of\s+)100\b\s*\)?").expect("valid regex")
});

static LABELLED_SCORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bscore[^\d\n]{0,12}?(\d{1,3}(?:\.\d+)?)").expect("valid regex")
});

static PERCENT_SCORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3}(?:\.\d+)?)\s*(?:/\s*100\b|%)").expect("valid regex")
});

static LABELLED_RATIONALE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)(?:explanation|reason|rationale)\s*:\s*(.+)").expect("valid regex")
});

/// Extract `(score, rationale)` from raw evaluator output.
pub fn parse_judgment(raw: &str) -> JudgeResult<(f64, String)> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(JudgeError::MalformedResponse("empty response".to_string()));
    }

    if let Some(parsed) = parse_json_judgment(text) {
        return Ok(parsed);
    }

    let stripped = SCALE_ECHO.replace_all(text, " ");
    let score = LABELLED_SCORE
        .captures(&stripped)
        .or_else(|| PERCENT_SCORE.captures(&stripped))
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .ok_or_else(|| JudgeError::MalformedResponse(preview(text)))?;

    let rationale = LABELLED_RATIONALE
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
        .unwrap_or_else(|| text.to_string());

    Ok((normalize_score(score), rationale))
}

fn parse_json_judgment(text: &str) -> Option<(f64, String)> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(&text[start..=end]).ok()?;

    let score = match &value["score"] {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s
            .trim()
            .trim_end_matches('%')
            .trim_end_matches("/100")
            .trim()
            .parse()
            .ok()?,
        _ => return None,
    };

    let rationale = ["explanation", "reason", "rationale"]
        .iter()
        .find_map(|key| value[*key].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| text.to_string());

    Some((normalize_score(score), rationale))
}

/// Map a 0-100 score onto [0, 1].
fn normalize_score(score: f64) -> f64 {
    (score / 100.0).clamp(0.0, 1.0)
}

fn preview(text: &str) -> String {
    let head: String = text.chars().take(200).collect();
    format!("no score found in: {}", head)
}
