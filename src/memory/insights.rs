use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::{
    llm::{json_block, TextGenerator},
    prompt, users,
};

/// What the model pulled out of one exchange.
#[derive(Debug, Default, PartialEq, Deserialize)]
pub struct Insights {
    #[serde(default)]
    pub core: Vec<String>,
    #[serde(default)]
    pub contextual: Vec<String>,
}

pub fn parse_insights(text: &str) -> Insights {
    let Some(block) = json_block(text, '{', '}') else {
        return Insights::default();
    };
    match serde_json::from_str::<Insights>(block) {
        Ok(mut insights) => {
            insights.core.retain(|s| !s.trim().is_empty());
            insights.contextual.retain(|s| !s.trim().is_empty());
            insights
        }
        Err(err) => {
            warn!(error = %err, "unparsable insight extraction output");
            Insights::default()
        }
    }
}

pub async fn extract_and_store(
    llm: &dyn TextGenerator,
    db_pool: &SqlitePool,
    user_id: &str,
    user_text: &str,
    assistant_text: &str,
) -> anyhow::Result<()> {
    let user = users::require(db_pool, user_id).await?;
    let prompt = prompt::insight_extraction(user_text, assistant_text, user.core_information());
    let insights = parse_insights(&llm.generate(&prompt).await?);

    let mut core_added = 0;
    for fact in &insights.core {
        if users::append_core_information(db_pool, user_id, fact).await? {
            core_added += 1;
        }
    }
    for sentence in &insights.contextual {
        super::add(db_pool, user_id, sentence).await?;
    }

    info!(user_id, core_added, contextual = insights.contextual.len(), "insights stored");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_insights_from_fenced_json() {
        let text = "```json\n{\"core\": [\"Has diabetes\", \"\"], \"contextual\": [\"Visited the park today\"]}\n```";
        let insights = parse_insights(text);
        assert_eq!(insights.core, ["Has diabetes"]);
        assert_eq!(insights.contextual, ["Visited the park today"]);
    }

    #[test]
    fn test_parse_insights_garbage_is_empty() {
        assert_eq!(parse_insights("nothing to note"), Insights::default());
        assert_eq!(parse_insights("{not json}"), Insights::default());
    }
}
