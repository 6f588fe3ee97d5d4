//! Formatting utilities (message splitting, outbound rendering, store reports).

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{
    conversation::{ConversationRecord, User, UserSummary},
    model::types::ContentBlock,
};

/// Default maximum chunk length, in characters.
pub const DEFAULT_CHUNK_LIMIT: usize = 2000;

/// Delimiter wrapped around code-typed chunks.
pub const CODE_FENCE: &str = "```";

/// Smallest limit at which a fenced code chunk still carries one character.
pub const MIN_CHUNK_LIMIT: usize = CODE_FENCE.len() * 2 + 1;

/// Split `text` into chunks of at most `limit` characters, breaking on line
/// boundaries where possible.
///
/// Lines keep their trailing terminator (see [`split_lines_keepends`]). A line longer than `limit` is hard-sliced;
/// its last slice stays in the buffer and may be joined with following lines.
/// Concatenating the chunks yields `text` exactly.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in split_lines_keepends(text) {
        let line_len = line.chars().count();

        if line_len > limit {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let mut pieces = hard_slice(line, limit);
            let tail = pieces.pop().unwrap_or_default();
            chunks.extend(pieces.into_iter().map(str::to_string));
            current_len = tail.chars().count();
            current = tail.to_string();
        } else if current_len + line_len > limit {
            chunks.push(std::mem::replace(&mut current, line.to_string()));
            current_len = line_len;
        } else {
            current.push_str(line);
            current_len += line_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Split `text` into lines, each keeping its terminator.
///
/// Recognized terminators: `\n`, `\r`, `\r\n` (one terminator), `\x0b`,
/// `\x0c`, `\x1c`, `\x1d`, `\x1e`, `\u{85}`, `\u{2028}` and `\u{2029}`. A final
/// line without a terminator is kept as is.
pub fn split_lines_keepends(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if !is_line_break(c) {
            continue;
        }
        let mut end = idx + c.len_utf8();
        if c == '\r' {
            if let Some(&(_, '\n')) = chars.peek() {
                chars.next();
                end += 1;
            }
        }
        lines.push(&text[start..end]);
        start = end;
    }
    if start < text.len() {
        lines.push(&text[start..]);
    }

    lines
}

fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r'
            | '\x0b'
            | '\x0c'
            | '\x1c'
            | '\x1d'
            | '\x1e'
            | '\u{85}'
            | '\u{2028}'
            | '\u{2029}'
    )
}

/// Cut `line` into consecutive pieces of `limit` characters (the last may be shorter).
fn hard_slice(line: &str, limit: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0usize;
    let mut count = 0usize;

    for (idx, _) in line.char_indices() {
        if count == limit {
            pieces.push(&line[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < line.len() {
        pieces.push(&line[start..]);
    }

    pieces
}

/// Turn model content segments into outbound messages.
///
/// Empty segments are skipped. Code segments are split with room for the
/// fence pair so the wrapped message still fits in `limit`; below
/// [`MIN_CHUNK_LIMIT`] fenced messages are `MIN_CHUNK_LIMIT` characters long.
pub fn render_blocks(blocks: &[ContentBlock], limit: usize) -> Vec<String> {
    let mut out = Vec::new();
    for block in blocks {
        if block.text.is_empty() {
            continue;
        }

        if block.is_code() {
            let inner = limit.saturating_sub(CODE_FENCE.len() * 2).max(1);
            out.extend(
                split_message(&block.text, inner)
                    .into_iter()
                    .map(|chunk| format!("{CODE_FENCE}{chunk}{CODE_FENCE}")),
            );
        } else {
            out.extend(split_message(&block.text, limit));
        }
    }
    out
}

fn iso(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn preview(text: &str, max_chars: usize) -> String {
    let one_line = text.replace('\n', " ");
    let trimmed = one_line.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    format!("{}...", trimmed.chars().take(max_chars).collect::<String>())
}

/// Plain-text report for `/users`.
pub fn format_user_summaries(users: &[UserSummary]) -> String {
    if users.is_empty() {
        return "No users recorded yet.".to_string();
    }

    let mut out = format!("Users ({}):\n", users.len());
    for u in users {
        out.push_str(&format!(
            "• {} ({}) since {}, {} message(s)\n",
            u.username,
            u.user_id,
            iso(&u.creation_time),
            u.message_count
        ));
    }
    out
}

/// Plain-text report for `/search`.
pub fn format_users(users: &[User]) -> String {
    if users.is_empty() {
        return "No matching users.".to_string();
    }

    let mut out = String::new();
    for u in users {
        out.push_str(&format!(
            "• {} ({}) since {}\n",
            u.username,
            u.user_id,
            iso(&u.creation_time)
        ));
    }
    out
}

/// Full report for `/message`: owner, command, text and response.
pub fn format_conversation(record: &ConversationRecord) -> String {
    let response = match (&record.response_id, &record.response_content) {
        (Some(id), Some(content)) => format!("Response {id}:\n{content}"),
        _ => "No response recorded.".to_string(),
    };
    format!(
        "Message {} from user {} at {}\nCommand: {}\n{}\n\n{}\n",
        record.message_id,
        record.user_id,
        iso(&record.timestamp),
        record.command,
        record.content,
        response
    )
}

/// Compact report for `/history`: one preview line per message.
pub fn format_history(user_id: &str, records: &[ConversationRecord]) -> String {
    if records.is_empty() {
        return format!("No messages for user {user_id}.");
    }

    let mut out = format!("Messages for user {user_id} ({}):\n", records.len());
    for r in records {
        let reply = r
            .response_content
            .as_deref()
            .map(|c| preview(c, 60))
            .unwrap_or_else(|| "(no response)".to_string());
        out.push_str(&format!(
            "• [{}] {} {}: {} → {}\n",
            iso(&r.timestamp),
            r.message_id,
            r.command,
            preview(&r.content, 60),
            reply
        ));
    }
    out
}
