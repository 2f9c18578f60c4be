use std::borrow::Cow;

const REDACTED: &str = "REDACTED";
const TOKEN_FIELDS: [&str; 2] = ["access_token", "refresh_token"];

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let nee = needle.as_bytes();
    if nee.is_empty() {
        return Some(0);
    }
    if nee.len() > hay.len() {
        return None;
    }

    (0..=hay.len() - nee.len()).find(|&i| hay[i..i + nee.len()].eq_ignore_ascii_case(nee))
}

/// Replaces the credential that follows every `Bearer ` marker, up to the next
/// whitespace, quote or separator.
fn redact_bearer_values(text: String) -> String {
    const MARKER: &str = "bearer ";

    let mut out = String::with_capacity(text.len());
    let mut rest = text.as_str();
    loop {
        let Some(idx) = find_ascii_case_insensitive(rest, MARKER) else {
            out.push_str(rest);
            break;
        };
        // Keep the marker as written in the original input.
        out.push_str(&rest[..idx + MARKER.len()]);
        rest = &rest[idx + MARKER.len()..];

        let consumed: usize = rest
            .chars()
            .take_while(|ch| !(ch.is_whitespace() || matches!(ch, '"' | '\'' | ',' | ';')))
            .map(char::len_utf8)
            .sum();
        if consumed > 0 {
            out.push_str(REDACTED);
        }
        rest = &rest[consumed..];
    }
    out
}

/// Replaces the string value of `"field": "..."` pairs inside JSON-ish text.
fn redact_json_field(text: String, field: &str) -> String {
    let key = format!("\"{field}\"");

    let mut out = String::with_capacity(text.len());
    let mut rest = text.as_str();
    while let Some(idx) = rest.find(&key) {
        out.push_str(&rest[..idx + key.len()]);
        rest = &rest[idx + key.len()..];

        let after_colon = rest.trim_start();
        let Some(value_part) = after_colon.strip_prefix(':') else {
            continue;
        };
        let value_part = value_part.trim_start();
        let Some(value) = value_part.strip_prefix('"') else {
            continue;
        };

        let mut escaped = false;
        let mut end = None;
        for (i, ch) in value.char_indices() {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => {
                    end = Some(i);
                    break;
                }
                _ => {}
            }
        }
        let Some(end) = end else {
            continue;
        };

        // Preserve the original spacing between the key and the value.
        let prefix_len = rest.len() - value.len();
        out.push_str(&rest[..prefix_len]);
        out.push_str(REDACTED);
        rest = &value[end..];
    }
    out.push_str(rest);
    out
}

/// Scrubs bearer credentials and JSON token fields from text that is about to
/// be logged or embedded in an error.
pub fn redact_secrets(input: &str) -> Cow<'_, str> {
    let mut value = redact_bearer_values(input.to_string());
    for field in TOKEN_FIELDS {
        value = redact_json_field(value, field);
    }

    if value == input {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(value)
    }
}
