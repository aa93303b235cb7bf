//! Outgoing messages and their rendering
//!
//! Handlers produce [`Reply`] values; the transport decides how to deliver
//! them. [`Reply::to_slack_payload`] gives the `chat.postMessage` body.

use serde_json::{json, Value};

use crate::cloud::Instance;

/// Emoji used for header lines
pub const HEADER_EMOJI: &str = "ledger";

/// One message from the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Plain message in the originating channel
    Say(String),
    /// Bold header line with a leading emoji
    Header { emoji: String, text: String },
    /// Direct message to a user
    Direct { user: String, text: String },
}

impl Reply {
    pub fn say(text: impl Into<String>) -> Self {
        Reply::Say(text.into())
    }

    pub fn header(text: impl Into<String>) -> Self {
        Reply::Header {
            emoji: HEADER_EMOJI.to_string(),
            text: text.into(),
        }
    }

    pub fn direct(user: impl Into<String>, text: impl Into<String>) -> Self {
        Reply::Direct {
            user: user.into(),
            text: text.into(),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Reply::Say(text) => text,
            Reply::Header { text, .. } => text,
            Reply::Direct { text, .. } => text,
        }
    }

    /// Slack `chat.postMessage` body for this reply
    pub fn to_slack_payload(&self, channel: &str) -> Value {
        match self {
            Reply::Say(text) => json!({ "channel": channel, "text": text }),
            Reply::Header { emoji, text } => json!({
                "channel": channel,
                "text": ".",
                "blocks": [{
                    "type": "rich_text",
                    "elements": [{
                        "type": "rich_text_section",
                        "elements": [
                            { "type": "emoji", "name": emoji },
                            { "type": "text", "text": text, "style": { "bold": true } }
                        ]
                    }]
                }]
            }),
            Reply::Direct { user, text } => json!({ "channel": user, "text": text }),
        }
    }
}

/// Monospace table inside a code fence
///
/// Each column is as wide as its longest cell or header.
pub fn render_table(columns: &[&str], rows: &[Vec<String>]) -> String {
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            rows.iter()
                .filter_map(|row| row.get(i))
                .map(|cell| cell.chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let pad = |text: &str, width: usize| format!("{:<width$}", text, width = width);

    let header = columns
        .iter()
        .zip(&widths)
        .map(|(name, &w)| pad(name, w))
        .collect::<Vec<_>>()
        .join(" | ");
    let divider = widths
        .iter()
        .map(|&w| "-".repeat(w))
        .collect::<Vec<_>>()
        .join("-+-");

    let mut lines = vec![header, divider];
    for row in rows {
        lines.push(
            widths
                .iter()
                .enumerate()
                .map(|(i, &w)| pad(row.get(i).map(String::as_str).unwrap_or(""), w))
                .collect::<Vec<_>>()
                .join(" | "),
        );
    }

    format!("```\n{}\n```", lines.join("\n"))
}

/// Table cells for instances; missing fields show as `unknown`
pub fn instance_rows(instances: &[Instance], columns: &[&str]) -> Vec<Vec<String>> {
    instances
        .iter()
        .map(|instance| {
            columns
                .iter()
                .map(|col| instance.field(col).unwrap_or_else(|| "unknown".to_string()))
                .collect()
        })
        .collect()
}

/// Header followed by an instance table
pub fn instance_table(header: &str, instances: &[Instance], columns: &[&str]) -> Vec<Reply> {
    vec![
        Reply::header(header),
        Reply::say(render_table(columns, &instance_rows(instances, columns))),
    ]
}
