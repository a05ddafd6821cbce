//! Output rows produced for the storage driver.

use geo::{BoundingRect, Geometry, Rect};

use crate::element::{ElementKey, ElementKind, Tags};
use crate::mapping::generalized_table_name;

/// Level of detail of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Detail {
    /// Unsimplified geometry in the base table.
    Full,
    /// Simplified geometry in `<table>_gen<level>`.
    Generalized(u8),
}

impl Detail {
    /// Generalization level, if any.
    #[must_use]
    pub const fn level(self) -> Option<u8> {
        match self {
            Self::Full => None,
            Self::Generalized(level) => Some(level),
        }
    }
}

/// Row id for an element: relations are negated so that relation-built
/// rows never collide with way-built rows of the same numeric id.
///
/// # Examples
/// ```
/// use osmstage_core::{ElementKey, row_id};
///
/// assert_eq!(row_id(ElementKey::way(51001)), 51001);
/// assert_eq!(row_id(ElementKey::relation(51001)), -51001);
/// ```
#[must_use]
pub const fn row_id(key: ElementKey) -> i64 {
    match key.kind {
        ElementKind::Relation => -key.id,
        ElementKind::Node | ElementKind::Way => key.id,
    }
}

/// A derived row.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRow {
    /// Logical table name.
    pub table: String,
    /// Level of detail.
    pub detail: Detail,
    /// Signed row id, see [`row_id`].
    pub osm_id: i64,
    /// Kind of the source element.
    pub kind: ElementKind,
    /// Type label from the classifier.
    pub type_label: String,
    /// Column values.
    pub tags: Tags,
    /// Projected geometry.
    pub geometry: Geometry<f64>,
}

impl OutputRow {
    /// Physical table the row belongs to.
    #[must_use]
    pub fn physical_table(&self) -> String {
        generalized_table_name(&self.table, self.detail.level())
    }

    /// Bounding box of the geometry, `None` for empty geometries.
    #[must_use]
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.geometry.bounding_rect()
    }

    /// Ordering key that makes row sets comparable regardless of the order
    /// in which workers produced them.
    #[must_use]
    pub fn sort_key(&self) -> (String, i64, String) {
        (self.physical_table(), self.osm_id, self.type_label.clone())
    }
}
