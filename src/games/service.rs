use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tracing::info;

use crate::{
    llm::{json_block, TextGenerator},
    prompt,
    users::User,
    AppError, AppResult,
};

use super::{GameMessage, GameSession, GameType, CONTEXT_TURNS};

pub const CATEGORIES: [&str; 20] = [
    "Logic & Problem-Solving Games",
    "Pattern Recognition & Sequences",
    "Spatial & Visual Thinking",
    "Language & Word Games",
    "Music & Rhythm Activities",
    "Art & Creative Expression",
    "Science & Nature Discovery",
    "Cultural & Historical Games",
    "Mathematics & Numbers",
    "Decision Making & Strategy",
    "Observation & Attention Games",
    "Adventure & Exploration",
    "Mystery & Detective Games",
    "Community & Social Games",
    "Fantasy & Imagination",
    "Sensory & Observation Games",
    "Creative Problem-Solving",
    "Pattern Matching & Sequences",
    "Visual Puzzle Games",
    "Interactive Learning Games",
];

const FALLBACK_TITLE: &str = "Cognitive Game";
const FALLBACK_DESCRIPTION: &str = "A friendly brain game played through conversation.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
    pub title: String,
    pub description: String,
}

#[derive(Deserialize)]
struct RawPreview {
    title: Option<String>,
    description: Option<String>,
}

/// `{title, description}` out of model output, with fallbacks for
/// anything missing.
pub fn parse_game_json(text: &str) -> Preview {
    let raw = json_block(text, '{', '}').and_then(|block| serde_json::from_str::<RawPreview>(block).ok());
    let (title, description) = match raw {
        Some(RawPreview { title, description }) => (title, description),
        None => (None, None),
    };
    let clean = |s: Option<String>, fallback: &str| {
        s.map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| fallback.to_owned())
    };
    Preview {
        title: clean(title, FALLBACK_TITLE),
        description: clean(description, FALLBACK_DESCRIPTION),
    }
}

pub async fn preview(llm: &dyn TextGenerator, user: &User) -> AppResult<Preview> {
    let category = *CATEGORIES.choose(&mut rand::rng()).unwrap_or(&CATEGORIES[0]);
    let reply = llm.generate(&prompt::game_preview(user.core_information(), category)).await?;
    Ok(parse_game_json(&reply))
}

/// Creates a session and stores the game master's opening turn.
///
/// A generated game whose description reads `Title: Description` comes
/// from an accepted preview and is used as is.
pub async fn create(
    llm: &dyn TextGenerator,
    db_pool: &SqlitePool,
    user: &User,
    game_type: GameType,
    user_description: Option<&str>,
) -> AppResult<GameSession> {
    let user_description = user_description.map(str::trim).filter(|d| !d.is_empty());

    let game = match (game_type, user_description) {
        (GameType::Generated, Some(accepted)) if accepted.contains(':') => {
            let (title, description) = accepted.split_once(':').unwrap_or((accepted, ""));
            Preview { title: title.trim().to_owned(), description: description.trim().to_owned() }
        }
        (GameType::Generated, _) => {
            parse_game_json(&llm.generate(&prompt::game_generated(user.core_information())).await?)
        }
        (GameType::Custom, Some(description)) => {
            parse_game_json(&llm.generate(&prompt::game_custom(description, user.core_information())).await?)
        }
        (GameType::Custom, None) => return Err(AppError::validation("A description is required for custom games")),
    };

    let opening = llm
        .generate(&prompt::game_opening(&game.title, &game.description, game_type.as_str()))
        .await?;

    let session = super::insert_session(
        db_pool,
        &user.id,
        &game.title,
        &game.description,
        game_type,
        user_description.unwrap_or_default(),
    )
    .await?;
    super::append_message(db_pool, &session, &opening, false, OffsetDateTime::now_utc()).await?;

    info!(user_id = %user.id, session_id = %session.id, game_type = game_type.as_str(), "game session created");
    Ok(session)
}

/// One game master turn. Persists both sides and returns the reply.
pub async fn play_turn(
    llm: &dyn TextGenerator,
    db_pool: &SqlitePool,
    user: &User,
    session_id: &str,
    message: &str,
) -> AppResult<GameMessage> {
    let message = message.trim();
    if message.is_empty() {
        return Err(AppError::validation("Message is required"));
    }
    let received_at = OffsetDateTime::now_utc();
    let session = super::get_owned(db_pool, &user.id, session_id).await?;

    let context = super::recent_messages(db_pool, &session.id, CONTEXT_TURNS).await?;
    let context = context.iter().fold(String::new(), |mut out, m| {
        out.push_str(if m.is_from_user { "User: " } else { "Assistant: " });
        out.push_str(&m.text);
        out.push('\n');
        out
    });

    let reply = llm
        .generate(&prompt::game_turn(
            &session.title,
            &session.description,
            session.game_type.as_str(),
            user.core_information(),
            &context,
            message,
        ))
        .await?;

    super::append_message(db_pool, &session, message, true, received_at).await?;
    let now = OffsetDateTime::now_utc();
    let answer = super::append_message(db_pool, &session, &reply, false, now).await?;
    super::touch(db_pool, &session.id, now).await?;
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FakeLlm};

    #[test]
    fn test_parse_game_json_with_fallbacks() {
        let parsed = parse_game_json("```json\n{\"title\": \"Number Navigator\", \"description\": \"Solve sums.\"}\n```");
        assert_eq!(parsed.title, "Number Navigator");

        let parsed = parse_game_json("I could not think of one");
        assert_eq!(parsed.title, "Cognitive Game");
        assert_eq!(parsed.description, FALLBACK_DESCRIPTION);
    }

    #[tokio::test]
    async fn test_accepted_preview_skips_generation() {
        let db_pool = testing::memory_pool().await;
        let user = testing::user(&db_pool, "sub-1", "Ada").await;
        let llm = FakeLlm::replying("Welcome to Pattern Detective!");

        let session = create(&llm, &db_pool, &user, GameType::Generated, Some("Pattern Detective: Find the rule"))
            .await
            .unwrap();

        assert_eq!(session.title, "Pattern Detective");
        assert_eq!(session.description, "Find the rule");
        assert_eq!(llm.prompts().len(), 1);
        let messages = super::super::list_messages(&db_pool, &session.id, 50, 0).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert!(!messages[0].is_from_user);
    }

    #[tokio::test]
    async fn test_custom_game_needs_description() {
        let db_pool = testing::memory_pool().await;
        let user = testing::user(&db_pool, "sub-1", "Ada").await;
        let err = create(&FakeLlm::replying("{}"), &db_pool, &user, GameType::Custom, Some("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_turn_persists_both_sides() {
        let db_pool = testing::memory_pool().await;
        let user = testing::user(&db_pool, "sub-1", "Ada").await;
        let llm = FakeLlm::replying("Correct! Next riddle...");
        let session = create(&llm, &db_pool, &user, GameType::Generated, Some("Riddles: Guess the answer"))
            .await
            .unwrap();

        let answer = play_turn(&llm, &db_pool, &user, &session.id, "A clock").await.unwrap();
        assert_eq!(answer.text, "Correct! Next riddle...");

        let texts: Vec<_> = super::super::list_messages(&db_pool, &session.id, 50, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|m| (m.is_from_user, m.text))
            .collect();
        assert_eq!(texts.len(), 3);
        assert_eq!(texts[1], (true, "A clock".to_owned()));
        assert!(llm.prompts().last().unwrap().contains("User's Latest Message: \"A clock\""));
    }
}
