// src/utils/html.rs

/// Sanitizes staff-authored text (test titles, descriptions, module titles)
/// against an HTML whitelist before it is stored and later rendered by the
/// front end. Script and style elements are dropped with their content.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input).trim().to_string()
}

pub fn clean_optional(input: Option<&str>) -> Option<String> {
    input.map(clean_html)
}
