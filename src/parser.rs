//! Parser for exported chat history files
//!
//! Reconstructs discrete, timestamped messages from the unstructured
//! multi-line text produced by chat export tools. Header lines open a new
//! message, non-header lines continue the current one, and system notices
//! (joins, leaves, encryption banners) are dropped entirely.

use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::analysis::models::MessageType;

/// Header patterns for the supported export locale/date-format variants.
///
/// Tried in order; the FIRST match wins. The order is the tie-break for
/// ambiguous inputs (`6.4.2025` vs `6/4/2025` families), so it must not be
/// reshuffled.
static HEADER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // Dotted day-first: 6.4.2025, 11:18 - Name: Message
        r"^(\d{1,2}\.\d{1,2}\.\d{4}),?\s+(\d{1,2}:\d{2})\s*-\s*([^:]+):\s*(.+)$",
        // US slash: 12/25/22, 3:30 PM - Name: Message
        r"^(\d{1,2}/\d{1,2}/\d{2,4}),?\s+(\d{1,2}:\d{2}(?:\s*[APap][Mm])?)\s*-\s*([^:]+):\s*(.+)$",
        // Bracketed: [12/25/22, 3:30:45 PM] Name: Message
        r"^\[(\d{1,2}/\d{1,2}/\d{2,4}),?\s+(\d{1,2}:\d{2}(?::\d{2})?\s*[APap][Mm])\]\s*([^:]+):\s*(.+)$",
        // European slash, 4-digit year: 25/12/2022, 15:30 - Name: Message
        r"^(\d{1,2}/\d{1,2}/\d{4}),?\s+(\d{1,2}:\d{2})\s*-\s*([^:]+):\s*(.+)$",
        // Dotted, 2- or 4-digit year, optional seconds: 6.4.25, 11:18:05 - Name: Message
        r"^(\d{1,2}\.\d{1,2}\.\d{2,4}),?\s+(\d{1,2}:\d{2}(?::\d{2})?)\s*-\s*([^:]+):\s*(.+)$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid header pattern"))
    .collect()
});

/// Concrete datetime formats tried in order against the captured date+time.
const DATETIME_FORMATS: &[&str] = &[
    "%d.%m.%Y %H:%M",
    "%d.%m.%y %H:%M",
    "%m/%d/%y %I:%M %p",
    "%m/%d/%Y %I:%M %p",
    "%d/%m/%Y %H:%M",
    "%d/%m/%y %H:%M",
    "%m/%d/%y %I:%M:%S %p",
    "%d/%m/%Y %I:%M %p",
];

/// System-notification fragments, English and Hebrew. A captured body
/// containing any of these (case-insensitively) never becomes a message.
const SYSTEM_FRAGMENTS: &[&str] = &[
    "messages and calls are end-to-end encrypted",
    "created group",
    "added",
    "removed",
    "left",
    "changed",
    "security code changed",
    "blocked this contact",
    "unblocked this contact",
    "הודעות ושיחות מוצפנות מקצה לקצה",
    "יצר קבוצה",
    "הוסיף",
    "הסיר",
    "עזב",
    "שינה",
];

/// A single message reconstructed from an export file
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    /// Sender display name
    pub sender: String,
    /// Message timestamp (ingestion time if the header date was unparseable)
    pub timestamp: DateTime<Utc>,
    /// Message body; continuation lines are appended newline-joined
    pub body: String,
    /// Type inferred from body content
    pub message_type: MessageType,
    /// Monotonic position within the parsed file
    pub source_ordinal: usize,
    /// Caller-supplied chat label
    pub chat_label: String,
}

impl ParsedMessage {
    /// Stable lowercase identifier derived from the sender name
    pub fn sender_id(&self) -> String {
        self.sender.trim().to_lowercase().replace(' ', "_")
    }

    /// Stable per-file message id
    pub fn source_message_id(&self) -> String {
        format!("import_{}", self.source_ordinal)
    }
}

/// Parser for exported chat files
#[derive(Debug, Clone, Default)]
pub struct ChatExportParser;

impl ChatExportParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse raw export text into an ordered sequence of messages.
    ///
    /// Pure function of its input: never fails, returns an empty Vec for
    /// empty input or input with no recognizable headers.
    pub fn parse(&self, raw: &str, chat_label: &str) -> Vec<ParsedMessage> {
        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

        let mut messages: Vec<ParsedMessage> = Vec::new();
        let mut current: Option<ParsedMessage> = None;

        for (line_no, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match match_header(line) {
                Some((date_str, time_str, sender, body)) => {
                    // A new header finalizes whatever was accumulating
                    if let Some(msg) = current.take() {
                        messages.push(msg);
                    }

                    if is_system_notice(body) {
                        debug!("Skipping system notice: {}", truncate(body, 50));
                        continue;
                    }

                    let timestamp = parse_timestamp(date_str, time_str);

                    current = Some(ParsedMessage {
                        sender: sender.trim().to_string(),
                        timestamp,
                        body: body.to_string(),
                        message_type: infer_message_type(body),
                        source_ordinal: messages.len(),
                        chat_label: chat_label.to_string(),
                    });
                }
                None => {
                    // Continuation of the current message, or an orphan line
                    if let Some(ref mut msg) = current {
                        msg.body.push('\n');
                        msg.body.push_str(line);
                        msg.message_type = infer_message_type(&msg.body);
                    } else {
                        debug!("Dropping orphan line {}: {}", line_no, truncate(line, 80));
                    }
                }
            }
        }

        if let Some(msg) = current.take() {
            messages.push(msg);
        }

        debug!(
            "Parsed {} messages from export '{}'",
            messages.len(),
            chat_label
        );
        messages
    }
}

/// Try each header pattern in priority order; first match wins.
fn match_header(line: &str) -> Option<(&str, &str, &str, &str)> {
    for pattern in HEADER_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(line) {
            let date = caps.get(1)?.as_str();
            let time = caps.get(2)?.as_str();
            let sender = caps.get(3)?.as_str();
            let body = caps.get(4)?.as_str();
            return Some((date, time, sender, body));
        }
    }
    None
}

/// Parse the captured date+time, falling back to the current wall clock.
fn parse_timestamp(date_str: &str, time_str: &str) -> DateTime<Utc> {
    // Uppercase the meridiem so `3:30 pm` and `3:30 PM` parse identically
    let candidate = format!("{} {}", date_str.trim(), time_str.trim().to_uppercase());

    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&candidate, fmt) {
            return naive.and_utc();
        }
    }

    warn!("Could not parse datetime: {}", candidate);
    Utc::now()
}

/// Check whether a captured body is a system notification.
fn is_system_notice(body: &str) -> bool {
    let lowered = body.to_lowercase();
    SYSTEM_FRAGMENTS.iter().any(|f| lowered.contains(f))
}

/// Infer the message type from body content.
///
/// Ordered checks: omitted-media markers first, then file-extension hints,
/// then URL prefixes, defaulting to text.
pub fn infer_message_type(body: &str) -> MessageType {
    let lowered = body.to_lowercase();

    if lowered.contains("<media omitted>") {
        MessageType::Media
    } else if lowered.contains("image omitted") {
        MessageType::Image
    } else if lowered.contains("video omitted") {
        MessageType::Video
    } else if lowered.contains("audio omitted") {
        MessageType::Audio
    } else if lowered.contains("document omitted") {
        MessageType::Document
    } else if lowered.contains(".pdf") || lowered.contains(".doc") {
        MessageType::Document
    } else if body.contains("http://") || body.contains("https://") {
        MessageType::Link
    } else {
        MessageType::Text
    }
}

fn truncate(s: &str, max_len: usize) -> &str {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn parse(text: &str) -> Vec<ParsedMessage> {
        ChatExportParser::new().parse(text, "Test")
    }

    #[test]
    fn single_header_yields_one_message() {
        let messages = parse("6.4.2025, 11:18 - Alice: Hello world");

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender, "Alice");
        assert_eq!(messages[0].body, "Hello world");
        assert_eq!(messages[0].message_type, MessageType::Text);
        assert_eq!(messages[0].source_ordinal, 0);
        assert_eq!(messages[0].chat_label, "Test");
    }

    #[test]
    fn dotted_date_parses_day_first() {
        let messages = parse("6.4.2025, 11:18 - Alice: Hello");

        let ts = messages[0].timestamp;
        assert_eq!(ts.day(), 6);
        assert_eq!(ts.month(), 4);
        assert_eq!(ts.year(), 2025);
        assert_eq!(ts.hour(), 11);
        assert_eq!(ts.minute(), 18);
    }

    #[test]
    fn continuation_lines_are_newline_joined() {
        let messages = parse("6.4.2025, 11:18 - Alice: first\nsecond\nthird");

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].body, "first\nsecond\nthird");
    }

    #[test]
    fn end_to_end_hello_world() {
        let messages = parse("6.4.2025, 11:18 - Alice: Hello\nworld");

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender, "Alice");
        assert_eq!(messages[0].body, "Hello\nworld");
        assert_eq!(messages[0].message_type, MessageType::Text);
    }

    #[test]
    fn us_format_with_meridiem() {
        let messages = parse("12/25/22, 3:30 PM - John Doe: Merry Christmas");

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender, "John Doe");
        let ts = messages[0].timestamp;
        assert_eq!(ts.month(), 12);
        assert_eq!(ts.day(), 25);
        assert_eq!(ts.hour(), 15);
        assert_eq!(ts.minute(), 30);
    }

    #[test]
    fn lowercase_meridiem_parses() {
        let messages = parse("12/25/22, 3:30 pm - John: hi");

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].timestamp.hour(), 15);
    }

    #[test]
    fn bracketed_format_with_seconds() {
        let messages = parse("[12/25/22, 3:30:45 PM] Jane: bracketed hello");

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender, "Jane");
        assert_eq!(messages[0].body, "bracketed hello");
        let ts = messages[0].timestamp;
        assert_eq!(ts.hour(), 15);
        assert_eq!(ts.second(), 45);
    }

    #[test]
    fn european_slash_format_24h() {
        let messages = parse("25/12/2022, 15:30 - Pierre: Joyeux Noël");

        assert_eq!(messages.len(), 1);
        let ts = messages[0].timestamp;
        assert_eq!(ts.day(), 25);
        assert_eq!(ts.month(), 12);
        assert_eq!(ts.hour(), 15);
    }

    #[test]
    fn unparseable_date_falls_back_to_now() {
        let before = Utc::now();
        let messages = parse("99.99.9999, 11:18 - Alice: still kept");
        let after = Utc::now();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].body, "still kept");
        assert!(messages[0].timestamp >= before && messages[0].timestamp <= after);
    }

    #[test]
    fn system_notice_is_suppressed() {
        let messages = parse("6.4.2025, 11:18 - Alice: Alice created group \"Friends\"");
        assert!(messages.is_empty());
    }

    #[test]
    fn hebrew_system_notice_is_suppressed() {
        let messages = parse("6.4.2025, 11:18 - דנה: דנה יצר קבוצה");
        assert!(messages.is_empty());
    }

    #[test]
    fn encryption_banner_is_suppressed() {
        let messages =
            parse("6.4.2025, 11:18 - System: Messages and calls are end-to-end encrypted.");
        assert!(messages.is_empty());
    }

    #[test]
    fn system_notice_does_not_clobber_previous_message() {
        let text = "6.4.2025, 11:18 - Alice: hello\n\
                    6.4.2025, 11:19 - Bob: Bob left\n\
                    6.4.2025, 11:20 - Carol: hi";
        let messages = parse(text);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, "Alice");
        assert_eq!(messages[1].sender, "Carol");
    }

    #[test]
    fn orphan_lines_before_first_header_are_dropped() {
        let text = "no header here\nstill nothing\n6.4.2025, 11:18 - Alice: hello";
        let messages = parse(text);

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].body, "hello");
    }

    #[test]
    fn all_orphans_yield_empty_sequence() {
        let messages = parse("just\nsome\nrandom lines");
        assert!(messages.is_empty());
    }

    #[test]
    fn empty_input_yields_empty_sequence() {
        assert!(parse("").is_empty());
        assert!(parse("\n\n\n").is_empty());
    }

    #[test]
    fn output_bounded_by_non_blank_lines() {
        let text = "6.4.2025, 11:18 - A: one\n\n6.4.2025, 11:19 - B: two\ncont\n\n";
        let non_blank = text.lines().filter(|l| !l.trim().is_empty()).count();
        let messages = parse(text);

        assert!(messages.len() <= non_blank);
    }

    #[test]
    fn bom_is_stripped() {
        let messages = parse("\u{feff}6.4.2025, 11:18 - Alice: hello");
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn source_ordinals_are_monotonic() {
        let text = "6.4.2025, 11:18 - A: one\n6.4.2025, 11:19 - B: two\n6.4.2025, 11:20 - C: three";
        let messages = parse(text);

        let ordinals: Vec<usize> = messages.iter().map(|m| m.source_ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
        assert_eq!(messages[1].source_message_id(), "import_1");
    }

    #[test]
    fn sender_id_is_lowercased_and_underscored() {
        let messages = parse("6.4.2025, 11:18 - John Doe: hi");
        assert_eq!(messages[0].sender_id(), "john_doe");
    }

    #[test]
    fn media_omitted_marker_wins_over_url() {
        let messages = parse("6.4.2025, 11:18 - Alice: <Media omitted> https://example.com");
        assert_eq!(messages[0].message_type, MessageType::Media);
    }

    #[test]
    fn image_omitted_detected() {
        let messages = parse("6.4.2025, 11:18 - Alice: image omitted");
        assert_eq!(messages[0].message_type, MessageType::Image);
    }

    #[test]
    fn video_and_audio_and_document_detected() {
        assert_eq!(
            parse("6.4.2025, 11:18 - A: video omitted")[0].message_type,
            MessageType::Video
        );
        assert_eq!(
            parse("6.4.2025, 11:18 - A: audio omitted")[0].message_type,
            MessageType::Audio
        );
        assert_eq!(
            parse("6.4.2025, 11:18 - A: document omitted")[0].message_type,
            MessageType::Document
        );
    }

    #[test]
    fn file_extension_hints_mean_document() {
        let messages = parse("6.4.2025, 11:18 - Alice: see report.pdf");
        assert_eq!(messages[0].message_type, MessageType::Document);
    }

    #[test]
    fn url_means_link() {
        let messages = parse("6.4.2025, 11:18 - Alice: check https://example.com/post");
        assert_eq!(messages[0].message_type, MessageType::Link);
    }

    #[test]
    fn type_reinferred_after_continuation() {
        let messages = parse("6.4.2025, 11:18 - Alice: interesting read\nhttps://example.com");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_type, MessageType::Link);
    }

    #[test]
    fn parse_is_deterministic_and_restartable() {
        let parser = ChatExportParser::new();
        let text = "6.4.2025, 11:18 - Alice: hello\nworld\n6.4.2025, 11:19 - Bob: again";

        let first = parser.parse(text, "Test");
        let second = parser.parse(text, "Test");

        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].body, second[0].body);
        assert_eq!(first[1].sender, second[1].sender);
    }

    #[test]
    fn ambiguous_date_resolved_by_fixed_order() {
        // 6/4/2025 could be June 4 (US) or April 6 (EU). With a 24-hour time
        // the 12-hour US formats cannot parse, so the first surviving format
        // is day-first. Consistent ordering, not locale detection.
        let messages = parse("6/4/2025, 11:18 - Alice: ambiguous");

        assert_eq!(messages.len(), 1);
        let ts = messages[0].timestamp;
        assert_eq!(ts.day(), 6);
        assert_eq!(ts.month(), 4);
    }
}
