//! Text helpers for titles, rich-text narratives and file names

use crate::error::{DomainError, DomainResult};

/// Trim a required single-line field and check its length in characters
pub fn required_line(field: &str, value: &str, max_chars: usize) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    if trimmed.chars().count() > max_chars {
        return Err(DomainError::validation(format!(
            "{field} must be at most {max_chars} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Like [`required_line`] but an empty value becomes `None`
pub fn optional_line(field: &str, value: Option<&str>, max_chars: usize) -> DomainResult<Option<String>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => required_line(field, v, max_chars).map(Some),
    }
}

/// Plain-text preview of an HTML narrative
///
/// Tags are dropped, common entities decoded and whitespace collapsed. The
/// result is cut at `max_chars` with an ellipsis appended.
pub fn narrative_excerpt(html: &str, max_chars: usize) -> String {
    let mut plain = String::with_capacity(html.len().min(max_chars * 2));
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                // block-level tags separate words
                plain.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if !in_tag => plain.push(c),
            _ => {}
        }
    }

    let decoded = plain
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let cut: String = collapsed.chars().take(max_chars).collect();
        format!("{}…", cut.trim_end())
    }
}

/// Whether an HTML narrative has any visible text
pub fn has_visible_text(html: &str) -> bool {
    !narrative_excerpt(html, 1).is_empty()
}

/// Reduce an uploaded file name to a safe basename
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.chars().take(120).collect()
    }
}
