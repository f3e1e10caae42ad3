//! The favorites list value relayed between stores.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Ordered favorites, duplicates allowed. Always handled as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FavoritesList(Vec<String>);

impl FavoritesList {
    pub fn new(items: Vec<String>) -> Self {
        Self(items)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    /// Parse a JSON value that must be an array of strings.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| SyncError::InvalidArgument(format!("expected a list, got {}", value)))?;
        items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    SyncError::InvalidArgument(format!("list item is not a string: {}", item))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::from(self.0.clone())
    }
}

impl From<Vec<String>> for FavoritesList {
    fn from(items: Vec<String>) -> Self {
        Self(items)
    }
}

impl<S: Into<String>> FromIterator<S> for FavoritesList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<'a> IntoIterator for &'a FavoritesList {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_preserves_order_and_duplicates() {
        let list = FavoritesList::from_json(&json!(["b", "a", "b"])).unwrap();
        assert_eq!(list.as_slice(), ["b", "a", "b"]);
    }

    #[test]
    fn test_from_json_rejects_non_list() {
        let err = FavoritesList::from_json(&json!({"favorites": "apple"})).unwrap_err();
        assert!(matches!(err, SyncError::InvalidArgument(_)));
    }

    #[test]
    fn test_from_json_rejects_non_string_items() {
        let err = FavoritesList::from_json(&json!(["apple", 3])).unwrap_err();
        assert!(matches!(err, SyncError::InvalidArgument(_)));
    }

    #[test]
    fn test_serializes_as_plain_array() {
        let list: FavoritesList = ["apple", "banana"].into_iter().collect();
        assert_eq!(serde_json::to_string(&list).unwrap(), r#"["apple","banana"]"#);
    }
}
