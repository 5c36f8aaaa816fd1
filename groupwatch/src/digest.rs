//! Plain-text digests of group activity.
//!
//! A digest is built from the messages captured in a time window and is fully deterministic:
//! the same messages and window always produce the same text.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::db::models::messages::MessageDBResponse;

/// Longest excerpt kept from a single message, in characters
pub const EXCERPT_CHARS: usize = 200;

/// How many senders the ranking shows
const TOP_SENDERS: usize = 3;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

/// Inputs for [`build_digest`]. `messages` must be ordered oldest first.
#[derive(Debug, Clone, Copy)]
pub struct DigestRequest<'a> {
    pub group_name: &'a str,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub messages: &'a [MessageDBResponse],
    pub max_excerpts: usize,
}

fn sender_key(message: &MessageDBResponse) -> &str {
    message
        .sender_jid
        .as_deref()
        .or(message.sender_name.as_deref())
        .unwrap_or("unknown")
}

fn display_name(message: &MessageDBResponse) -> String {
    if let Some(name) = message.sender_name.as_deref().filter(|name| !name.trim().is_empty()) {
        return name.trim().to_string();
    }
    match message.sender_jid.as_deref() {
        Some(jid) => jid.split('@').next().unwrap_or(jid).to_string(),
        None => "Unknown".to_string(),
    }
}

fn excerpt(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= EXCERPT_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(EXCERPT_CHARS).collect();
    cut.push_str("...");
    cut
}

/// Senders ranked by message count, ties broken by name.
fn top_senders(messages: &[MessageDBResponse]) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, (String, usize)> = HashMap::new();
    for message in messages {
        let entry = counts.entry(sender_key(message)).or_insert_with(|| (display_name(message), 0));
        entry.1 += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_values().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(TOP_SENDERS);
    ranked
}

pub fn build_digest(request: &DigestRequest<'_>) -> String {
    let mut out = format!(
        "Summary for {}\nPeriod: {} to {}\n",
        request.group_name,
        request.period_start.format(TIME_FORMAT),
        request.period_end.format(TIME_FORMAT)
    );

    if request.messages.is_empty() {
        out.push_str("\nNo activity in this period.");
        return out;
    }

    let participants = request
        .messages
        .iter()
        .map(sender_key)
        .collect::<HashSet<_>>()
        .len();
    out.push_str(&format!("\nMessages: {}\nParticipants: {participants}\n", request.messages.len()));

    out.push_str("\nTop senders:\n");
    for (rank, (name, count)) in top_senders(request.messages).iter().enumerate() {
        out.push_str(&format!("{}. {name} ({count})\n", rank + 1));
    }

    let skip = request.messages.len().saturating_sub(request.max_excerpts);
    let recent = &request.messages[skip..];
    if !recent.is_empty() {
        out.push_str("\nRecent messages:\n");
        for message in recent {
            out.push_str(&format!(
                "[{}] {}: {}\n",
                message.sent_at.format("%H:%M"),
                display_name(message),
                excerpt(&message.content)
            ));
        }
    }

    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    fn message(minute: i64, sender: &str, content: &str) -> MessageDBResponse {
        MessageDBResponse {
            id: Uuid::new_v4(),
            group_selection_id: Uuid::nil(),
            gateway_message_id: format!("m{minute}"),
            sender_jid: Some(format!("{}@s.whatsapp.net", sender.to_lowercase())),
            sender_name: Some(sender.to_string()),
            content: content.to_string(),
            sent_at: start() + Duration::minutes(minute),
            created_at: start(),
        }
    }

    fn digest(messages: &[MessageDBResponse], max_excerpts: usize) -> String {
        build_digest(&DigestRequest {
            group_name: "Family",
            period_start: start(),
            period_end: start() + Duration::days(1),
            messages,
            max_excerpts,
        })
    }

    #[test]
    fn test_empty_window_mentions_no_activity() {
        let text = digest(&[], 5);
        assert!(text.starts_with("Summary for Family\nPeriod: 2025-03-01 00:00 UTC to 2025-03-02 00:00 UTC"));
        assert!(text.contains("No activity"));
        assert!(!text.contains("Top senders"));
    }

    #[test]
    fn test_counts_and_ranking() {
        let messages = vec![
            message(1, "Bob", "hi"),
            message(2, "Alice", "hello"),
            message(3, "Carol", "hey"),
            message(4, "Dave", "yo"),
            message(5, "Carol", "again"),
            message(6, "Bob", "still here"),
        ];
        let text = digest(&messages, 10);

        assert!(text.contains("Messages: 6\nParticipants: 4"));
        // Bob and Carol tie on 2, broken by name; Alice beats Dave on name
        assert!(text.contains("Top senders:\n1. Bob (2)\n2. Carol (2)\n3. Alice (1)\n"));
        assert!(!text.contains("Dave (1)"));
    }

    #[test]
    fn test_excerpts_are_bounded_and_oldest_first() {
        let messages: Vec<_> = (0..8).map(|i| message(i, "Alice", &format!("message {i}"))).collect();
        let text = digest(&messages, 3);

        let excerpts: Vec<&str> = text.lines().skip_while(|l| *l != "Recent messages:").skip(1).collect();
        assert_eq!(excerpts, vec!["[00:05] Alice: message 5", "[00:06] Alice: message 6", "[00:07] Alice: message 7"]);
    }

    #[test]
    fn test_long_messages_are_truncated() {
        let long = "a".repeat(500);
        let text = digest(&[message(0, "Alice", &long)], 5);
        let line = text.lines().last().unwrap();
        assert!(line.ends_with("..."));
        assert_eq!(line.matches('a').count(), EXCERPT_CHARS);
    }

    #[test]
    fn test_deterministic() {
        let messages = vec![message(1, "Bob", "one"), message(2, "Alice", "two\n\nlines")];
        assert_eq!(digest(&messages, 5), digest(&messages, 5));
        assert!(digest(&messages, 5).contains("Alice: two lines"));
    }
}
