//! JSON-lines change feeds for diffs.
//!
//! Each non-blank line is one element object with an extra `action` field:
//!
//! ```text
//! {"action": "modify", "type": "node", "id": 1, "lon": 13.4, "lat": 52.5}
//! {"action": "delete", "type": "way", "id": 7}
//! ```

use camino::Utf8Path;
use osmstage_core::{Element, ElementKey, ElementKind, Node};
use osmstage_fs::open_utf8_file;
use serde::Deserialize;
use serde_json::Value;

use super::SourceError;

/// One entry of a change feed.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Create or wholesale replace an element.
    Upsert(Element),
    /// Remove an element.
    Delete(ElementKey),
}

impl Change {
    /// Key of the changed element.
    #[must_use]
    pub const fn key(&self) -> ElementKey {
        match self {
            Self::Upsert(element) => element.key(),
            Self::Delete(key) => *key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeleteTarget {
    #[serde(rename = "type")]
    kind: ElementKind,
    id: i64,
}

/// Read a change file from disk.
pub fn read_change_file(path: &Utf8Path) -> Result<Vec<Change>, SourceError> {
    let text = open_utf8_file(path)
        .and_then(std::io::read_to_string)
        .map_err(|source| SourceError::ReadChanges {
            path: path.to_path_buf(),
            source,
        })?;
    read_changes(&text)
}

/// Parse a JSON-lines change feed. Blank lines are skipped.
///
/// # Examples
/// ```
/// use osmstage_core::ElementKey;
/// use osmstage_data::{Change, read_changes};
///
/// # fn main() -> Result<(), osmstage_data::SourceError> {
/// let changes = read_changes(
///     r#"{"action": "delete", "type": "way", "id": 7}"#,
/// )?;
/// assert_eq!(changes, vec![Change::Delete(ElementKey::way(7))]);
/// # Ok(())
/// # }
/// ```
pub fn read_changes(text: &str) -> Result<Vec<Change>, SourceError> {
    let mut changes = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        changes.push(parse_line(line, trimmed)?);
    }
    Ok(changes)
}

fn parse_line(line: usize, text: &str) -> Result<Change, SourceError> {
    let malformed = |source| SourceError::MalformedChange { line, source };
    let mut value: Value = serde_json::from_str(text).map_err(malformed)?;
    let action = value
        .as_object_mut()
        .and_then(|object| object.remove("action"))
        .ok_or(SourceError::MissingAction { line })?;

    match action.as_str() {
        Some("create" | "modify") => {
            let element: Element = serde_json::from_value(value).map_err(malformed)?;
            validate(line, element).map(Change::Upsert)
        }
        Some("delete") => {
            let target: DeleteTarget = serde_json::from_value(value).map_err(malformed)?;
            Ok(Change::Delete(ElementKey {
                kind: target.kind,
                id: target.id,
            }))
        }
        _ => Err(SourceError::UnknownAction {
            line,
            action: action.to_string(),
        }),
    }
}

fn validate(line: usize, element: Element) -> Result<Element, SourceError> {
    match element {
        Element::Node(node) => Node::new(node.id, node.lon, node.lat, node.tags)
            .map(Element::Node)
            .map_err(|source| SourceError::InvalidElement { line, source }),
        other => Ok(other),
    }
}
