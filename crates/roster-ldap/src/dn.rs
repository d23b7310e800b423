//! Distinguished names for directory entries.

use roster_core::Error;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Reasons a distinguished name fails to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// The input was blank.
    #[error("distinguished name cannot be empty")]
    Empty,
    /// A component had no `=` or an empty side.
    #[error("malformed distinguished name component `{0}`")]
    MalformedComponent(String),
    /// The input ended in the middle of an escape.
    #[error("distinguished name ends with a dangling escape")]
    DanglingEscape,
}

impl From<DistinguishedNameError> for Error {
    fn from(err: DistinguishedNameError) -> Self {
        Error::ValidationError(err.to_string())
    }
}

/// One `attribute=value` component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativeDistinguishedName {
    attribute: String,
    value: String,
}

impl RelativeDistinguishedName {
    /// Creates a component from an unescaped value.
    #[must_use]
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Attribute name, e.g. `uid`.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Unescaped value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    fn render(&self) -> String {
        format!("{}={}", self.attribute, escape_value(&self.value))
    }
}

/// Parsed distinguished name, most specific component first.
///
/// Values are stored unescaped and re-escaped when rendered, so `uid=a\,b` and the component
/// `("uid", "a,b")` produce the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinguishedName {
    rendered: String,
    components: Vec<RelativeDistinguishedName>,
}

impl DistinguishedName {
    /// Parses a comma-separated distinguished name.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] for blank input, components without `attribute=value`
    /// form, and trailing backslashes.
    pub fn parse(input: impl AsRef<str>) -> std::result::Result<Self, DistinguishedNameError> {
        let input = input.as_ref().trim();
        if input.is_empty() {
            return Err(DistinguishedNameError::Empty);
        }

        let components = tokenize(input)?
            .into_iter()
            .map(|(raw, split_at)| {
                let Some(split_at) = split_at else {
                    return Err(DistinguishedNameError::MalformedComponent(raw));
                };
                let attribute = raw[..split_at].trim();
                let value = raw[split_at + 1..].trim();
                if attribute.is_empty() || value.is_empty() {
                    return Err(DistinguishedNameError::MalformedComponent(raw.clone()));
                }
                Ok(RelativeDistinguishedName::new(attribute, value))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self::from_components(components))
    }

    fn from_components(components: Vec<RelativeDistinguishedName>) -> Self {
        let rendered = components
            .iter()
            .map(RelativeDistinguishedName::render)
            .collect::<Vec<_>>()
            .join(",");
        Self {
            rendered,
            components,
        }
    }

    /// Canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.rendered
    }

    /// Components, most specific first.
    #[must_use]
    pub fn components(&self) -> &[RelativeDistinguishedName] {
        &self.components
    }

    /// Value of the leading component, e.g. the username in `uid=jdoe,ou=People,...`.
    #[must_use]
    pub fn leaf_value(&self) -> Option<&str> {
        self.components.first().map(RelativeDistinguishedName::value)
    }

    /// Value of the first component with the given attribute (case-insensitive).
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.components
            .iter()
            .find(|rdn| rdn.attribute.eq_ignore_ascii_case(attribute))
            .map(RelativeDistinguishedName::value)
    }

    /// Name of the entry `attribute=value` directly below this one.
    #[must_use]
    pub fn child(&self, attribute: &str, value: &str) -> Self {
        let mut components = Vec::with_capacity(self.components.len() + 1);
        components.push(RelativeDistinguishedName::new(attribute, value));
        components.extend(self.components.iter().cloned());
        Self::from_components(components)
    }

    /// Returns true if this name equals `base` or lies below it.
    #[must_use]
    pub fn is_within(&self, base: &DistinguishedName) -> bool {
        let Some(offset) = self.components.len().checked_sub(base.components.len()) else {
            return false;
        };
        self.components[offset..]
            .iter()
            .zip(&base.components)
            .all(|(ours, theirs)| {
                ours.attribute.eq_ignore_ascii_case(&theirs.attribute)
                    && ours.value.eq_ignore_ascii_case(&theirs.value)
            })
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

impl FromStr for DistinguishedName {
    type Err = DistinguishedNameError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Splits on unescaped commas, unescaping values and remembering where the first unescaped `=`
/// of each component sits.
fn tokenize(
    input: &str,
) -> std::result::Result<Vec<(String, Option<usize>)>, DistinguishedNameError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut split_at = None;
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                let escaped = chars.next().ok_or(DistinguishedNameError::DanglingEscape)?;
                current.push(escaped);
            }
            ',' => {
                parts.push((std::mem::take(&mut current), split_at.take()));
            }
            '=' if split_at.is_none() => {
                split_at = Some(current.len());
                current.push(ch);
            }
            _ => current.push(ch),
        }
    }
    parts.push((current, split_at));
    Ok(parts)
}

fn escape_value(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut escaped = String::with_capacity(value.len());
    for (idx, ch) in value.chars().enumerate() {
        let leading = idx == 0 && (ch == ' ' || ch == '#');
        let trailing = idx == last && ch == ' ';
        if leading || trailing || matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
