use serde::Deserialize;
use sqlx::SqlitePool;
use time::{format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime, PrimitiveDateTime};
use tracing::{debug, info};

use crate::{
    llm::{json_block, TextGenerator},
    prompt,
};

use super::{NewReminder, Tag};

#[derive(Deserialize)]
struct Extracted {
    title: String,
    #[serde(default)]
    description: Option<String>,
    timestamp: String,
    #[serde(default)]
    tags: Vec<String>,
}

fn parse_when(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    OffsetDateTime::parse(raw, &Rfc3339).ok().or_else(|| {
        PrimitiveDateTime::parse(raw, format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"))
            .or_else(|_| PrimitiveDateTime::parse(raw, format_description!("[year]-[month]-[day] [hour]:[minute]")))
            .ok()
            .or_else(|| {
                Date::parse(raw, format_description!("[year]-[month]-[day]"))
                    .ok()
                    .map(Date::midnight)
            })
            .map(PrimitiveDateTime::assume_utc)
    })
}

/// Reminders from the model's JSON array. Entries without a title or with
/// an unreadable timestamp are dropped; past due times are kept. A bare
/// date means midnight UTC.
pub fn parse_extracted(text: &str) -> Vec<NewReminder> {
    let Some(block) = json_block(text, '[', ']') else {
        return Vec::new();
    };
    let Ok(entries) = serde_json::from_str::<Vec<Extracted>>(block) else {
        debug!("reminder extraction output was not a JSON array of reminders");
        return Vec::new();
    };

    entries
        .into_iter()
        .filter(|e| !e.title.trim().is_empty())
        .filter_map(|e| {
            let timestamp = parse_when(&e.timestamp)?;
            Some(NewReminder {
                title: e.title.trim().to_owned(),
                description: e.description,
                timestamp,
                tags: e.tags.iter().map(|t| Tag::parse_lenient(t)).collect(),
            })
        })
        .collect()
}

pub async fn extract_reminders(
    llm: &dyn TextGenerator,
    db_pool: &SqlitePool,
    user_id: &str,
    message: &str,
    now: OffsetDateTime,
) -> anyhow::Result<usize> {
    let reply = llm.generate(&prompt::reminder_extraction(message, now)).await?;
    let found = parse_extracted(&reply);
    for new in &found {
        super::insert(db_pool, user_id, new).await?;
    }
    if !found.is_empty() {
        info!(user_id, count = found.len(), "reminders extracted");
    }
    Ok(found.len())
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::testing::{self, FakeLlm};

    #[test]
    fn test_parses_array_keeping_past_and_date_only_entries() {
        let text = r#"Here you go:
        [
          {"title": "Take blood pressure pills", "timestamp": "2025-03-01T18:00:00Z", "tags": ["medication", "health"]},
          {"title": "Take morning pills", "timestamp": "2025-03-01T09:00:00Z"},
          {"title": "Call Mary", "description": "Her birthday", "timestamp": "2025-03-02 10:30", "tags": ["family"]},
          {"title": "Dentist", "timestamp": "2025-03-04"}
        ]"#;
        let found = parse_extracted(text);

        assert_eq!(found.len(), 4);
        assert_eq!(found[0].tags, [Tag::Medication, Tag::Health]);
        assert_eq!(found[1].timestamp, datetime!(2025-03-01 09:00 UTC));
        assert_eq!(found[2].timestamp, datetime!(2025-03-02 10:30 UTC));
        assert_eq!(found[2].tags, [Tag::Other]);
        assert_eq!(found[3].timestamp, datetime!(2025-03-04 00:00 UTC));
    }

    #[test]
    fn test_empty_or_garbage() {
        assert!(parse_extracted("[]").is_empty());
        assert!(parse_extracted("No reminders.").is_empty());
        assert!(parse_extracted(r#"[{"title": "x", "timestamp": "someday"}]"#).is_empty());
    }

    #[tokio::test]
    async fn test_reminder_said_after_its_time_is_still_stored() {
        let db_pool = testing::memory_pool().await;
        let llm = FakeLlm::replying(r#"[{"title": "Take pills", "timestamp": "2025-03-01T09:00:00Z"}]"#);
        let said_at = datetime!(2025-03-01 09:05 UTC);

        let stored = extract_reminders(&llm, &db_pool, "u1", "Remind me to take my pills at 9", said_at)
            .await
            .unwrap();

        assert_eq!(stored, 1);
        let reminders = crate::reminders::list(&db_pool, "u1", 0).await.unwrap();
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].title, "Take pills");
    }
}
