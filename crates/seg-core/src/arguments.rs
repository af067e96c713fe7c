//! Argument maps and their `Key=Value;` text grammar
//!
//! ```text
//! arguments := (key '=' value ';')*
//! value     := (bare | '[' value (',' value)* ']')*
//! ```
//!
//! `;` and `=` only separate fields when they appear outside brackets.
//! Values keep their brackets verbatim so a parsed map serializes back to
//! the exact same text.

use indexmap::IndexMap;
use std::fmt;
use std::str::FromStr;

/// Argument grammar violations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgumentsError {
    /// A `]` without its `[`, or a `[` never closed
    #[error("unbalanced brackets in `{0}`")]
    UnbalancedBrackets(String),

    /// A field without `=`
    #[error("field `{0}` has no `=`")]
    MissingAssignment(String),

    /// `=` with nothing before it
    #[error("empty argument key")]
    EmptyKey,

    /// Same key twice in one map
    #[error("duplicate argument key `{0}`")]
    DuplicateKey(String),

    /// Separator character outside brackets
    #[error("`{text}` contains a reserved `{character}` outside brackets")]
    ReservedCharacter {
        /// Offending key or value
        text: String,
        /// The separator found
        character: char,
    },

    /// Value that does not parse as the requested type
    #[error("argument `{key}` has invalid value `{value}`")]
    InvalidValue {
        /// Argument key
        key: String,
        /// Raw value
        value: String,
    },

    /// Composite key not of the form `filterId_outputIndex`
    #[error("malformed output reference `{0}`, expected `filterId_outputIndex`")]
    MalformedOutputRef(String),
}

/// Ordered string map attached to every item
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arguments {
    entries: IndexMap<String, String>,
}

impl Arguments {
    /// Empty map
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the `Key=Value;` form
    ///
    /// The trailing `;` of the last field may be omitted. Empty fields are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ArgumentsError`] on unbalanced brackets, fields without
    /// `=`, empty or duplicated keys.
    pub fn parse(raw: &str) -> Result<Self, ArgumentsError> {
        let mut args = Self::new();
        let mut depth = 0usize;
        let mut field_start = 0usize;

        for (pos, c) in raw.char_indices() {
            match c {
                '[' => depth += 1,
                ']' => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| ArgumentsError::UnbalancedBrackets(raw.to_string()))?;
                }
                ';' if depth == 0 => {
                    args.push_field(&raw[field_start..pos])?;
                    field_start = pos + 1;
                }
                _ => {}
            }
        }

        if depth != 0 {
            return Err(ArgumentsError::UnbalancedBrackets(raw.to_string()));
        }
        args.push_field(&raw[field_start..])?;
        Ok(args)
    }

    fn push_field(&mut self, field: &str) -> Result<(), ArgumentsError> {
        if field.trim().is_empty() {
            return Ok(());
        }
        let split = top_level_position(field, '=')
            .ok_or_else(|| ArgumentsError::MissingAssignment(field.to_string()))?;
        let key = field[..split].trim();
        let value = &field[split + 1..];

        if self.entries.contains_key(key) {
            return Err(ArgumentsError::DuplicateKey(key.to_string()));
        }
        validate_key(key)?;
        validate_value(value)?;
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Value stored under `key`
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Parse the value stored under `key`
    ///
    /// # Errors
    ///
    /// [`ArgumentsError::InvalidValue`] when the value does not parse.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>, ArgumentsError> {
        self.get(key)
            .map(|value| {
                value.trim().parse().map_err(|_| ArgumentsError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                })
            })
            .transpose()
    }

    /// Elements of a list value, with or without the enclosing brackets
    ///
    /// Nested lists are returned as single elements, brackets included.
    #[must_use]
    pub fn list(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).map(split_list)
    }

    /// Insert or replace `key`, returning the previous value
    ///
    /// # Errors
    ///
    /// Rejects keys with separators or brackets, and values with `;`/`=`
    /// outside brackets or unbalanced brackets.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Option<String>, ArgumentsError> {
        let key = key.into();
        let value = value.into();
        validate_key(&key)?;
        validate_value(&value)?;
        Ok(self.entries.insert(key, value))
    }

    /// Store `items` as a bracketed list
    ///
    /// # Errors
    ///
    /// Same as [`Arguments::insert`].
    pub fn insert_list<I, S>(&mut self, key: impl Into<String>, items: I) -> Result<Option<String>, ArgumentsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined: Vec<String> = items.into_iter().map(|s| s.as_ref().to_string()).collect();
        self.insert(key, format!("[{}]", joined.join(",")))
    }

    /// Remove `key`, keeping the order of the remaining entries
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.shift_remove(key)
    }

    /// Whether `key` is present
    #[inline]
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Move entries into the order `layout` lists them in
    ///
    /// Keys absent from `layout` follow in their current order; keys of
    /// `layout` absent from the map are ignored.
    pub fn order_like<S: AsRef<str>>(&mut self, layout: &[S]) {
        let mut ordered = IndexMap::with_capacity(self.entries.len());
        for key in layout {
            if let Some((key, value)) = self.entries.shift_remove_entry(key.as_ref()) {
                ordered.insert(key, value);
            }
        }
        ordered.extend(self.entries.drain(..));
        self.entries = ordered;
    }

    /// Copy every entry of `other` over this map
    pub fn extend_from(&mut self, other: &Arguments) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }
}

impl fmt::Display for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.entries {
            write!(f, "{key}={value};")?;
        }
        Ok(())
    }
}

impl FromStr for Arguments {
    type Err = ArgumentsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn top_level_position(text: &str, needle: char) -> Option<usize> {
    let mut depth = 0usize;
    for (pos, c) in text.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            c if c == needle && depth == 0 => return Some(pos),
            _ => {}
        }
    }
    None
}

fn validate_key(key: &str) -> Result<(), ArgumentsError> {
    if key.is_empty() {
        return Err(ArgumentsError::EmptyKey);
    }
    if let Some(character) = key.chars().find(|c| matches!(c, ';' | '=' | '[' | ']')) {
        return Err(ArgumentsError::ReservedCharacter {
            text: key.to_string(),
            character,
        });
    }
    Ok(())
}

fn validate_value(value: &str) -> Result<(), ArgumentsError> {
    let mut depth = 0usize;
    for c in value.chars() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| ArgumentsError::UnbalancedBrackets(value.to_string()))?;
            }
            ';' | '=' if depth == 0 => {
                return Err(ArgumentsError::ReservedCharacter {
                    text: value.to_string(),
                    character: c,
                });
            }
            _ => {}
        }
    }
    if depth == 0 {
        Ok(())
    } else {
        Err(ArgumentsError::UnbalancedBrackets(value.to_string()))
    }
}

/// Byte position of the bracket closing the one at position 0
fn closing_bracket(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (pos, c) in text.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(pos);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_list(value: &str) -> Vec<String> {
    let trimmed = value.trim();
    let inner = if trimmed.starts_with('[') && closing_bracket(trimmed) == Some(trimmed.len() - 1) {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };

    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in inner.chars() {
        match c {
            '[' => {
                depth += 1;
                current.push(c);
            }
            ']' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => items.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    if !current.is_empty() || !items.is_empty() {
        items.push(current);
    }
    items.into_iter().map(|s| s.trim().to_string()).collect()
}
