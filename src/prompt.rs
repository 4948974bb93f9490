//! Prompt construction. Every function here is pure: same profile, turns
//! and clock in, same string out.

use std::fmt::Write;

use time::{format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime};

use crate::{chat::Message, memory::Memory, reminders::Reminder, users::User};

pub const DEFAULT_NAME: &str = "there";

/// How many recent turns feed the returning-contact greeting.
pub const GREETING_WINDOW: u32 = 10;

const MINUTES_PER_HOUR: i64 = 60;
const MINUTES_PER_DAY: i64 = 1440;

/// Buckets the minutes since the last turn into a phrase.
pub fn time_context(minutes: i64) -> String {
    let minutes = minutes.max(0);
    if minutes < MINUTES_PER_HOUR {
        "just a few minutes ago".to_owned()
    } else if minutes < MINUTES_PER_DAY {
        if minutes / MINUTES_PER_HOUR == 1 {
            "about an hour ago".to_owned()
        } else {
            "a few hours ago".to_owned()
        }
    } else {
        match minutes / MINUTES_PER_DAY {
            1 => "yesterday".to_owned(),
            days => format!("{days} days ago"),
        }
    }
}

pub fn minutes_between(earlier: OffsetDateTime, now: OffsetDateTime) -> i64 {
    (now - earlier).whole_minutes().max(0)
}

fn profile_note(core_information: Option<&str>) -> String {
    match core_information {
        Some(note) => format!("Consider this profile note: {note}. "),
        None => String::new(),
    }
}

/// `User: ...` / `Assistant: ...` lines, one per turn, in the given order.
pub fn transcript(turns: &[Message]) -> String {
    turns.iter().fold(String::new(), |mut out, m| {
        let speaker = if m.is_from_user { "User: " } else { "Assistant: " };
        let _ = writeln!(out, "{speaker}{}", m.text);
        out
    })
}

pub fn first_contact(name: &str, core_information: Option<&str>) -> String {
    format!(
        "You are a warm, friendly AI companion for elderly care. \
         Greet the user by name ({name}) in a short, gentle way (1-2 sentences). \
         Offer help and invite them to speak. \
         End your message by reassuring them that you're always here to help. \
         Keep it natural and encouraging. \
         {note}\
         Do not ask multiple questions; one simple invitation is enough. No emojis.",
        note = profile_note(core_information),
    )
}

pub fn returning_contact(name: &str, core_information: Option<&str>, turns: &[Message], time_context: &str) -> String {
    format!(
        "You are a warm, friendly AI companion for elderly care. \
         The user is returning to the app. Greet them warmly by name ({name}) and ask how they're doing. \
         Reference something from their last conversation to show you remember and care, using the appropriate time reference. \
         The following are the last few messages from their previous conversation (most recent last):\n\
         {context}\n\
         The last conversation was {time_context}. \
         Use phrases like 'I remember you were talking about...' or 'How did that go with...' to reference their last topic with the correct time context. \
         Then ask how they're doing and what you can help with. \
         End your message by reassuring them that you're always here to help. \
         Keep it warm and personal (2-3 sentences). \
         {note}\
         No emojis.",
        context = transcript(turns),
        note = profile_note(core_information),
    )
}

/// Greeting for an app (re)entry. `recent` is oldest first; an empty window
/// means first contact.
pub fn auto_greeting(user: &User, recent: &[Message], now: OffsetDateTime) -> String {
    let name = user.display_name().unwrap_or(DEFAULT_NAME);
    match recent.last() {
        None => first_contact(name, user.core_information()),
        Some(last) => {
            let elapsed = time_context(minutes_between(last.timestamp, now));
            returning_contact(name, user.core_information(), recent, &elapsed)
        }
    }
}

pub struct ChatContext<'a> {
    pub today: Date,
    pub core_information: Option<&'a str>,
    pub memories: &'a [Memory],
    pub history: &'a [Message],
    pub reminders: &'a [Reminder],
    pub location: Option<&'a str>,
    pub question: &'a str,
}

fn or_none(block: String) -> String {
    if block.trim().is_empty() { "none".to_owned() } else { block }
}

fn reminders_block(reminders: &[Reminder]) -> String {
    reminders.iter().fold(String::new(), |mut out, r| {
        let due = r.timestamp.format(&Rfc3339).unwrap_or_default();
        let tags: Vec<&str> = r.tags.iter().map(|t| t.as_str()).collect();
        let _ = write!(
            out,
            "Title: {}\nDescription: {}\nDue: {due}\nTags: {}\nStatus: {}\n\n",
            r.title,
            r.description.as_deref().unwrap_or("none"),
            if tags.is_empty() { "none".to_owned() } else { tags.join(", ") },
            r.status.as_str(),
        );
        out
    })
}

pub fn chat(ctx: &ChatContext<'_>) -> String {
    let today = ctx
        .today
        .format(format_description!("[weekday], [month repr:long] [day padding:none], [year]"))
        .unwrap_or_else(|_| ctx.today.to_string());
    let memories = ctx.memories.iter().map(|m| format!("- {}", m.content)).collect::<Vec<_>>().join("\n");

    format!(
        "Today is {today}.\n\
         You are a personalised virtual assistant designed for elderly care. Your role is to respond supportively and clearly, considering the user's health, personal background, daily context, and emotional needs.\n\n\
         --- USER PROFILE (Long-Term Core Info) ---\n{core}\n\n\
         --- RECENT MEMORIES (Contextual Events) ---\n{memories}\n\n\
         --- CHAT HISTORY (Recent Conversation) ---\n{history}\n\n\
         --- UPCOMING REMINDERS (Tasks to Remember, include time if needed) ---\n{reminders}\n\n\
         --- USER LOCATION (If available) ---\n{location}\n\n\
         --- USER QUESTION ---\nThe user said: \"{question}\"\n\n\
         You can automatically create reminders for users when they mention tasks or appointments. If someone asks you to remind them of something or mentions a future task, reassure them that you will remember it for them.\n\n\
         Respond in a way that shows:\n\
         - Kindness and patience\n\
         - Clear and simple language suitable for older adults\n\
         - Lighthearted charm\n\
         - No technical jargon and no emojis\n\
         - Use the user's location only when it helps\n\
         - Keep responses short (2-3 sentences) unless more detail is genuinely needed\n\
         - When users mention tasks, appointments, or ask for reminders, confirm that you'll remember it for them",
        core = ctx.core_information.unwrap_or("none"),
        memories = or_none(memories),
        history = or_none(transcript(ctx.history)),
        reminders = or_none(reminders_block(ctx.reminders)),
        location = ctx.location.unwrap_or("none"),
        question = ctx.question,
    )
}

pub fn welcome(user: &User, introduction: &str) -> String {
    let mut profile = String::new();
    if let (Some(full), Some(first)) = (user.display_name(), user.first_name()) {
        let _ = writeln!(profile, "- Name: {full} (call them {first})");
    }
    for (label, value) in [
        ("Location", user.address.as_deref()),
        ("Date of Birth", user.date_of_birth.as_deref()),
        ("Core Information", user.core_information()),
    ] {
        if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
            let _ = writeln!(profile, "- {label}: {value}");
        }
    }

    format!(
        "You are a warm, friendly AI companion designed specifically for elderly care. \
         You're meeting a new elderly user for the first time after they've completed their profile setup. \
         Generate a personalized welcome message that incorporates their information.\n\n\
         USER PROFILE INFORMATION:\n{profile}\n\
         USER'S INTRODUCTION:\n{introduction}\n\n\
         Create a warm, personalized welcome message that:\n\
         - Uses their first name naturally\n\
         - References their location if available\n\
         - Incorporates their core information (daily life, relationships, medical needs, hobbies)\n\
         - Explains your role as their AI companion\n\
         - Mentions key features you can help with (daily check-ins, reminders, brain games, chat)\n\
         - Uses clear, simple language without technical jargon or emojis\n\
         - Keeps the message welcoming but concise (2-3 sentences)\n\n\
         Respond with a natural, conversational welcome message that makes the user feel comfortable and supported."
    )
}

pub fn insight_extraction(user_text: &str, assistant_text: &str, core_information: Option<&str>) -> String {
    format!(
        "You maintain long-term notes about an elderly user of a companion app.\n\n\
         Known profile notes: {known}\n\n\
         Latest exchange:\nUser: {user_text}\nAssistant: {assistant_text}\n\n\
         Extract new information from what the USER said.\n\
         - \"core\": lasting facts about the user (health conditions, family members, preferences, routines) not already in the known notes.\n\
         - \"contextual\": short memory-style sentences about recent events or plans worth recalling later.\n\
         Return ONLY a JSON object: {{\"core\": [\"...\"], \"contextual\": [\"...\"]}}. Use empty arrays when there is nothing new.",
        known = core_information.unwrap_or("none"),
    )
}

pub fn reminder_extraction(message: &str, now: OffsetDateTime) -> String {
    let now = now.format(&Rfc3339).unwrap_or_default();
    format!(
        "The current date and time is {now}.\n\
         An elderly user said: \"{message}\"\n\n\
         If the message mentions a task, appointment, medication, event or anything they want to be reminded of, \
         return ONLY a JSON array of reminders like \
         [{{\"title\": \"...\", \"description\": \"...\", \"timestamp\": \"RFC 3339 date-time\", \"tags\": [\"MEDICATION\"]}}]. \
         Allowed tags: MEDICATION, APPOINTMENT, EVENT, TASK, PERSONAL, WORK, FINANCE, HEALTH, TRAVEL, SOCIAL, EDUCATION, LEISURE, OTHER. \
         Resolve relative times such as \"tomorrow at 3\" against the current date and time. \
         Return [] when there is nothing to remember."
    )
}

pub fn game_preview(core_information: Option<&str>, category: &str) -> String {
    format!(
        "You are a game designer creating diverse cognitive games for elderly users. \
         Avoid memory and storytelling games.\n\n\
         User Profile: {profile}\n\n\
         Design a game in this category: {category}.\n\n\
         Game requirements:\n\
         - Playable entirely through conversation\n\
         - Mentally stimulating but not overwhelming\n\
         - Short description (2-3 sentences max)\n\n\
         Return ONLY a JSON object: {{\"title\": \"Game Title\", \"description\": \"Brief description of the game\"}}",
        profile = core_information.unwrap_or("none"),
    )
}

pub fn game_generated(core_information: Option<&str>) -> String {
    format!(
        "You are a cognitive game master. Create a fun, engaging game for an elderly user.\n\n\
         User Profile: {profile}\n\n\
         Generate a game that is:\n\
         - Mentally stimulating but not overwhelming\n\
         - Fun and engaging\n\
         - Appropriate for elderly users\n\
         - Can be played through conversation\n\n\
         Return ONLY a JSON object: {{\"title\": \"Game Title\", \"description\": \"Brief description of the game\"}}",
        profile = core_information.unwrap_or("none"),
    )
}

pub fn game_custom(description: &str, core_information: Option<&str>) -> String {
    format!(
        "You are a cognitive game master. Create a game based on the user's description.\n\n\
         User Description: {description}\n\
         User Profile: {profile}\n\n\
         Generate a game that matches their request while being:\n\
         - Mentally stimulating\n\
         - Fun and engaging\n\
         - Appropriate for elderly users\n\
         - Can be played through conversation\n\n\
         Return ONLY a JSON object: {{\"title\": \"Game Title\", \"description\": \"Brief description of the game\"}}",
        profile = core_information.unwrap_or("none"),
    )
}

pub fn game_opening(title: &str, description: &str, game_type: &str) -> String {
    format!(
        "You are starting a new cognitive game called \"{title}\".\n\n\
         Game Description: {description}\n\
         Game Type: {game_type}\n\n\
         Create an engaging opening message that welcomes the user warmly, explains the game, \
         gives clear instructions on how to play and invites the user to start.\n\
         Keep the message concise (2-3 sentences maximum). \
         Don't ask multiple questions, just one clear invitation to start."
    )
}

pub fn game_turn(
    title: &str,
    description: &str,
    game_type: &str,
    core_information: Option<&str>,
    context: &str,
    message: &str,
) -> String {
    format!(
        "You are an AI-powered Cognitive Game Master hosting a game called \"{title}\".\n\n\
         Game Description: {description}\n\
         Game Type: {game_type}\n\n\
         Your role is to:\n\
         - Keep the game engaging and fun\n\
         - Provide appropriate challenges\n\
         - Give encouraging feedback\n\
         - Adapt difficulty based on user responses\n\
         - Keep responses conversational and warm\n\n\
         User Profile: {profile}\n\n\
         Recent Game Context:\n{context}\n\n\
         User's Latest Message: \"{message}\"\n\n\
         Respond as the game master, continuing the game naturally. Keep your response engaging and game-focused.",
        profile = core_information.unwrap_or("none"),
    )
}

pub fn daily_summary(date: Date, turns: &[Message]) -> String {
    let history = turns.iter().fold(String::new(), |mut out, m| {
        let time = m
            .timestamp
            .format(format_description!("[hour]:[minute]"))
            .unwrap_or_default();
        let speaker = if m.is_from_user { "User" } else { "Assistant" };
        let _ = writeln!(out, "[{time}] {speaker}: {}", m.text);
        out
    });

    format!(
        "Analyze the following chat history from {date} and provide a comprehensive daily summary. \
         Please respond in the following JSON format:\n\
         {{\n  \"summary\": \"A concise summary of what the person did and discussed today\",\n  \
         \"scores\": {{\n    \"health\": <score 1-10>,\n    \"exercise\": <score 1-10>,\n    \
         \"mental\": <score 1-10>,\n    \"social\": <score 1-10>,\n    \"productivity\": <score 1-10>\n  }},\n  \
         \"analysis\": \"Detailed analysis of their day including mood, activities, and insights\"\n}}\n\n\
         Chat History:\n{history}"
    )
}

#[cfg(test)]
mod tests {
    use time::{macros::datetime, Duration};

    use super::*;
    use crate::testing;

    #[test]
    fn test_time_context_buckets() {
        assert_eq!(time_context(45), "just a few minutes ago");
        assert_eq!(time_context(61), "about an hour ago");
        assert_eq!(time_context(200), "a few hours ago");
        assert_eq!(time_context(1500), "yesterday");
        assert_eq!(time_context(4000), "2 days ago");
    }

    #[test]
    fn test_time_context_edges() {
        assert_eq!(time_context(-5), "just a few minutes ago");
        assert_eq!(time_context(59), "just a few minutes ago");
        assert_eq!(time_context(60), "about an hour ago");
        assert_eq!(time_context(119), "about an hour ago");
        assert_eq!(time_context(120), "a few hours ago");
        assert_eq!(time_context(1439), "a few hours ago");
        assert_eq!(time_context(1440), "yesterday");
        assert_eq!(time_context(2880), "2 days ago");
    }

    #[test]
    fn test_no_turns_means_first_contact() {
        let user = testing::sample_user("Margaret Hill", Some("Loves roses"));
        let prompt = auto_greeting(&user, &[], datetime!(2025-03-01 10:00 UTC));

        assert!(prompt.contains("Greet the user by name (Margaret Hill)"));
        assert!(prompt.contains("Consider this profile note: Loves roses. "));
        assert!(!prompt.contains("returning"));
    }

    #[test]
    fn test_unknown_name_defaults() {
        let user = testing::sample_user("  ", None);
        let prompt = auto_greeting(&user, &[], datetime!(2025-03-01 10:00 UTC));
        assert!(prompt.contains("(there)"));
        assert!(!prompt.contains("profile note"));
    }

    #[test]
    fn test_turns_mean_continuation_with_elapsed_time() {
        let user = testing::sample_user("Margaret", None);
        let last = datetime!(2025-03-01 10:00 UTC);
        let turns = vec![
            testing::message("I planted tulips", true, last - Duration::minutes(1)),
            testing::message("Lovely!", false, last),
        ];
        let prompt = auto_greeting(&user, &turns, last + Duration::minutes(1500));

        assert!(prompt.contains("The user is returning to the app"));
        assert!(prompt.contains("User: I planted tulips\nAssistant: Lovely!\n"));
        assert!(prompt.contains("The last conversation was yesterday."));
    }

    #[test]
    fn test_chat_prompt_fills_empty_blocks() {
        let prompt = chat(&ChatContext {
            today: datetime!(2025-03-01 10:00 UTC).date(),
            core_information: None,
            memories: &[],
            history: &[],
            reminders: &[],
            location: None,
            question: "What's on today?",
        });
        assert!(prompt.starts_with("Today is Saturday, March 1, 2025."));
        assert!(prompt.contains("--- CHAT HISTORY (Recent Conversation) ---\nnone"));
        assert!(prompt.contains("The user said: \"What's on today?\""));
    }

    #[test]
    fn test_daily_summary_lists_turns_with_times() {
        let turns = vec![testing::message("Went for a walk", true, datetime!(2025-03-01 13:05 UTC))];
        let prompt = daily_summary(datetime!(2025-03-01 0:00 UTC).date(), &turns);
        assert!(prompt.contains("chat history from 2025-03-01"));
        assert!(prompt.contains("[13:05] User: Went for a walk"));
    }
}
