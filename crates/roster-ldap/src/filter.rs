//! Search filter templates with escaped parameters.

use roster_core::{Error, Result};

/// Escapes a value for inclusion in a search filter.
///
/// `\`, `*`, `(`, `)` and NUL become backslash-hex sequences.
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\5c"),
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Substitutes each `{}` in `template` with the next escaped parameter.
///
/// # Errors
///
/// Returns [`Error::ValidationError`] if the number of placeholders differs from the number
/// of parameters.
pub fn render_filter<S: AsRef<str>>(template: &str, params: &[S]) -> Result<String> {
    let pieces = template.split("{}").collect::<Vec<_>>();
    let placeholders = pieces.len() - 1;
    if placeholders != params.len() {
        return Err(Error::ValidationError(format!(
            "filter `{template}` has {placeholders} placeholders but {} parameters were given",
            params.len()
        )));
    }

    let mut filter = String::with_capacity(template.len());
    for (idx, piece) in pieces.iter().enumerate() {
        filter.push_str(piece);
        if let Some(param) = params.get(idx) {
            filter.push_str(&escape_filter_value(param.as_ref()));
        }
    }
    Ok(filter)
}
