//! # OPD Types
//!
//! Validated value types shared by every OPD crate.
//!
//! - [`NonEmptyText`] guarantees trimmed, non-blank text (names, medicine labels).
//! - [`MultiSelect`] is the decoded form of a checklist field. The server stores these
//!   as comma-joined strings, older rows sometimes hold a JSON list, and clients send
//!   either. Decoding happens once here so the rest of the code only ever sees a list.

/// Separator used when a [`MultiSelect`] is written back to storage.
pub const MULTI_SELECT_SEPARATOR: &str = ", ";

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
}

/// A string type that guarantees non-empty content.
///
/// The input is trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Empty`] if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Builds a `NonEmptyText` from optional input, treating `None` like blank text.
    pub fn from_optional(input: Option<&str>) -> Option<Self> {
        input.and_then(|s| Self::new(s).ok())
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the owned string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// MULTI-SELECT
// ============================================================================

/// The selected option labels of one checklist field, in selection order.
///
/// Decoding accepts three shapes:
/// - a JSON list of strings, used as-is,
/// - a string, which may itself hold a JSON list, otherwise split on commas,
/// - `null`, which becomes an empty selection.
///
/// Encoding always produces the stored form: labels joined with `", "`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiSelect(Vec<String>);

impl MultiSelect {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Normalises a stored value into a list of labels.
    ///
    /// A string without commas yields a single-element list; blank input yields an empty one.
    pub fn from_stored(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::new();
        }

        if trimmed.starts_with('[') {
            if let Ok(list) = serde_json::from_str::<Vec<String>>(trimmed) {
                return Self(list);
            }
        }

        Self(
            trimmed
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }

    /// Denormalises the selection into its stored, comma-joined form.
    pub fn to_stored(&self) -> String {
        self.0.join(MULTI_SELECT_SEPARATOR)
    }

    /// Whether `label` decodes back unchanged from the stored form. A comma would split it.
    pub fn is_storable_label(label: &str) -> bool {
        !label.contains(',')
    }

    pub fn contains(&self, label: &str) -> bool {
        self.0.iter().any(|s| s == label)
    }

    /// Selects `label`. Returns `false` if it was already selected.
    pub fn insert(&mut self, label: impl Into<String>) -> bool {
        let label = label.into();
        if self.contains(&label) {
            return false;
        }
        self.0.push(label);
        true
    }

    /// Deselects `label`. Returns `false` if it was not selected.
    pub fn remove(&mut self, label: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|s| s != label);
        self.0.len() != before
    }

    /// Flips the selection state of `label` and returns the new state.
    pub fn toggle(&mut self, label: &str) -> bool {
        if self.remove(label) {
            false
        } else {
            self.0.push(label.to_owned());
            true
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for MultiSelect {
    fn from(list: Vec<String>) -> Self {
        Self(list)
    }
}

impl From<&str> for MultiSelect {
    fn from(raw: &str) -> Self {
        Self::from_stored(raw)
    }
}

impl std::fmt::Display for MultiSelect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_stored())
    }
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum RawMultiSelect {
    List(Vec<String>),
    Text(String),
}

impl serde::Serialize for MultiSelect {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_stored())
    }
}

impl<'de> serde::Deserialize<'de> for MultiSelect {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = Option::<RawMultiSelect>::deserialize(deserializer)?;
        Ok(match raw {
            Some(RawMultiSelect::List(list)) => Self(list),
            Some(RawMultiSelect::Text(text)) => Self::from_stored(&text),
            None => Self::new(),
        })
    }
}
