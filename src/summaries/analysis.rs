use serde::Serialize;
use serde_json::Value;

use crate::llm::json_block;

const DEFAULT_SCORE: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Scores {
    pub health: i64,
    pub exercise: i64,
    pub mental: i64,
    pub social: i64,
    pub productivity: i64,
}

impl Default for Scores {
    fn default() -> Self {
        Scores {
            health: DEFAULT_SCORE,
            exercise: DEFAULT_SCORE,
            mental: DEFAULT_SCORE,
            social: DEFAULT_SCORE,
            productivity: DEFAULT_SCORE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub summary: String,
    pub scores: Scores,
    pub analysis: String,
}

fn score(scores: Option<&Value>, key: &str) -> i64 {
    scores
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f.round() as i64)))
        .map_or(DEFAULT_SCORE, |s| s.clamp(1, 10))
}

/// Reads the model's JSON reply. Scores are clamped to 1..=10 and default
/// to 5; an unreadable reply keeps the raw text as the analysis.
pub fn parse_analysis(reply: &str) -> Analysis {
    let parsed = json_block(reply, '{', '}').and_then(|block| serde_json::from_str::<Value>(block).ok());
    let Some(body) = parsed else {
        return Analysis {
            summary: "Unable to parse AI response".to_owned(),
            scores: Scores::default(),
            analysis: reply.to_owned(),
        };
    };

    let text = |key: &str| body.get(key).and_then(Value::as_str).unwrap_or_default().trim().to_owned();
    let scores = body.get("scores");
    Analysis {
        summary: text("summary"),
        scores: Scores {
            health: score(scores, "health"),
            exercise: score(scores, "exercise"),
            mental: score(scores, "mental"),
            social: score(scores, "social"),
            productivity: score(scores, "productivity"),
        },
        analysis: text("analysis"),
    }
}
