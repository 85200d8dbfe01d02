use once_cell::sync::Lazy;
use regex::Regex;

/// First `http(s)://` run of non-whitespace characters in a message.
#[allow(clippy::unwrap_used)]
static URL_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());

/// Extracts the first http(s) URL from free-form message text.
///
/// # Example
///
/// ```
/// use clipdrop::core::utils::extract_url;
///
/// assert_eq!(extract_url("look https://example.com/v/1 now"), Some("https://example.com/v/1"));
/// assert_eq!(extract_url("no links here"), None);
/// ```
pub fn extract_url(text: &str) -> Option<&str> {
    URL_REGEX.find(text).map(|m| m.as_str())
}

/// Whether the URL points to an iCalendar file that is fetched directly.
pub fn is_calendar_link(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.trim_end().ends_with(".ics") || lower.contains(".ics?")
}

/// Escapes special characters for Telegram's MarkdownV2 format.
///
/// Telegram requires escaping of
/// `_`, `*`, `[`, `]`, `(`, `)`, `~`, `` ` ``, `>`, `#`, `+`, `-`, `=`, `|`, `{`, `}`, `.`, `!`
/// and the backslash itself.
///
/// # Example
///
/// ```
/// use clipdrop::core::utils::escape_markdown_v2;
///
/// let escaped = escape_markdown_v2("Hello. World!");
/// assert_eq!(escaped, "Hello\\. World\\!");
/// ```
pub fn escape_markdown_v2(text: &str) -> String {
    let mut result = String::with_capacity(text.len() * 2);

    for c in text.chars() {
        match c {
            '\\' | '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '>' | '#' | '+' | '-' | '=' | '|' | '{' | '}'
            | '.' | '!' => {
                result.push('\\');
                result.push(c);
            }
            _ => result.push(c),
        }
    }

    result
}

/// Formats a duration in seconds as `H:MM:SS`, or "Unknown" when absent.
pub fn format_duration(seconds: Option<u64>) -> String {
    match seconds {
        Some(total) if total > 0 => {
            let hours = total / 3600;
            let minutes = (total % 3600) / 60;
            let secs = total % 60;
            format!("{}:{:02}:{:02}", hours, minutes, secs)
        }
        _ => "Unknown".to_string(),
    }
}

/// Formats a counter with `,` thousands separators: 1234567 -> "1,234,567".
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
