//! Declarative tag classification.
//!
//! A mapping document lists output tables. Each table has a geometry kind,
//! an ordered list of `key`/`values` rules, optional reject filters, the
//! columns copied into each row and the generalized variants to maintain.
//! [`TagClassifier`] compiles the document once and then answers
//! [`TagClassifier::classify`] as a pure function of element kind and tags.
//!
//! ```json
//! {
//!   "tables": [{
//!     "name": "osm_roads",
//!     "type": "linestring",
//!     "mapping": [{"key": "highway", "values": ["__any__"]}],
//!     "columns": [{"type": "tag", "name": "name", "key": "name"}],
//!     "generalized": [{"tolerance": 50.0, "types": ["primary"]}]
//!   }]
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::Read;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::element::{ElementKind, Tags};
use crate::generalize::DEFAULT_MAX_AREA_DRIFT;
use crate::geometry::{AssemblyOptions, EmptyRolePolicy, Projection};

/// Value placeholder matching any value of a key.
pub const ANY_VALUE: &str = "__any__";

/// Joins a schema name and a table name into a physical table name, so it
/// may not appear inside either.
pub const SCHEMA_SEPARATOR: &str = "__";

const DEFAULT_GAP_TOLERANCE: f64 = 0.5;

/// Errors raised while loading or validating a mapping document.
#[derive(Debug, Error)]
pub enum MappingError {
    /// The document could not be read or parsed.
    #[error("failed to parse mapping document")]
    Parse {
        /// Underlying parser error.
        #[source]
        source: serde_json::Error,
    },
    /// A table or column name is not a plain SQL identifier.
    #[error("invalid identifier `{name}`")]
    InvalidIdentifier {
        /// Offending name.
        name: String,
    },
    /// A table name contains the schema separator.
    #[error("table `{name}` contains the reserved separator `__`")]
    ReservedSeparator {
        /// Offending name.
        name: String,
    },
    /// Two tables share a name.
    #[error("table `{name}` is declared twice")]
    DuplicateTable {
        /// Table name.
        name: String,
    },
    /// Two columns of the same table share a name.
    #[error("column `{column}` is declared twice in table `{table}`")]
    DuplicateColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// A table declares no rules.
    #[error("table `{table}` has no mapping rules")]
    EmptyMapping {
        /// Table name.
        table: String,
    },
    /// A tolerance was negative or not finite.
    #[error("table `{table}` has invalid tolerance {tolerance}")]
    InvalidTolerance {
        /// Table name, or `ring_gap_tolerance` for the global setting.
        table: String,
        /// Offending tolerance.
        tolerance: f64,
    },
    /// An area drift bound was negative or not finite.
    #[error("table `{table}` has invalid area drift bound {drift}")]
    InvalidAreaDrift {
        /// Table name.
        table: String,
        /// Offending bound.
        drift: f64,
    },
    /// A table declares more generalized variants than can be addressed.
    #[error("table `{table}` declares {count} generalized variants")]
    TooManyGeneralizations {
        /// Table name.
        table: String,
        /// Number declared.
        count: usize,
    },
}

/// Geometry kind of an output table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    /// Nodes.
    Point,
    /// Ways as lines.
    LineString,
    /// Closed ways and assembled relations.
    Polygon,
}

impl TableKind {
    /// True when elements of `kind` may produce rows in this table.
    #[must_use]
    pub const fn accepts(self, kind: ElementKind) -> bool {
        matches!(
            (self, kind),
            (Self::Point, ElementKind::Node)
                | (Self::LineString, ElementKind::Way)
                | (Self::Polygon, ElementKind::Way | ElementKind::Relation)
        )
    }
}

/// Raw mapping document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Relation `type` values that are assembled into polygons.
    #[serde(default = "default_relation_types")]
    pub relation_types: Vec<String>,
    /// Output projection.
    #[serde(default)]
    pub projection: Projection,
    /// Gap closing tolerance in projected units.
    #[serde(default = "default_gap_tolerance")]
    pub ring_gap_tolerance: f64,
    /// Treatment of empty-role relation members.
    #[serde(default)]
    pub empty_role: EmptyRolePolicy,
    /// Whether relations tagged only with `type` borrow the tags of their
    /// largest outer way.
    #[serde(default = "default_true")]
    pub inherit_outer_way_tags: bool,
    /// Output tables in declared order.
    pub tables: Vec<TableConfig>,
}

const fn default_max_area_drift() -> f64 {
    DEFAULT_MAX_AREA_DRIFT
}

fn default_relation_types() -> Vec<String> {
    vec!["multipolygon".to_owned(), "boundary".to_owned()]
}

const fn default_gap_tolerance() -> f64 {
    DEFAULT_GAP_TOLERANCE
}

const fn default_true() -> bool {
    true
}

/// One output table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Logical table name.
    pub name: String,
    /// Geometry kind.
    #[serde(rename = "type")]
    pub kind: TableKind,
    /// Rules evaluated in order; each match yields one row.
    pub mapping: Vec<RuleConfig>,
    /// Tag values that exclude an element from this table.
    #[serde(default)]
    pub reject: BTreeMap<String, Vec<String>>,
    /// Columns copied into the row's tag subset.
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
    /// Simplified variants, one physical table each.
    #[serde(default)]
    pub generalized: Vec<GeneralizedConfig>,
}

/// Match a tag key against a set of values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Tag key.
    pub key: String,
    /// Accepted values; `__any__` accepts every value.
    pub values: Vec<String>,
}

/// A column of an output table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ColumnConfig {
    /// Copy a tag value.
    Tag {
        /// Column name.
        name: String,
        /// Source tag key.
        key: String,
    },
    /// Rank a tag value by its position in `values`.
    Enumerate {
        /// Column name.
        name: String,
        /// Source tag key.
        key: String,
        /// Ranked values; the first listed value has rank 1.
        values: Vec<String>,
    },
}

impl ColumnConfig {
    fn name(&self) -> &str {
        match self {
            Self::Tag { name, .. } | Self::Enumerate { name, .. } => name,
        }
    }
}

/// A generalized variant of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralizedConfig {
    /// Douglas-Peucker tolerance in projected units.
    pub tolerance: f64,
    /// Largest relative change in polygon area the simplification may cause.
    #[serde(default = "default_max_area_drift")]
    pub max_area_drift: f64,
    /// Type labels copied into the variant; all when absent.
    #[serde(default)]
    pub types: Option<Vec<String>>,
}

/// A single classification decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Position of the table in the mapping.
    pub table_index: usize,
    /// Logical table name.
    pub table: String,
    /// Type label, the matched tag value.
    pub type_label: String,
    /// False when the row may be suppressed because a relation that
    /// consumes the element already emits it.
    pub standalone: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ValueMatch {
    Any,
    OneOf(BTreeSet<String>),
}

impl ValueMatch {
    fn compile(values: &[String]) -> Self {
        if values.iter().any(|value| value == ANY_VALUE) {
            Self::Any
        } else {
            Self::OneOf(values.iter().cloned().collect())
        }
    }

    fn matches(&self, value: &str) -> bool {
        match self {
            Self::Any => true,
            Self::OneOf(values) => values.contains(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    key: String,
    values: ValueMatch,
}

/// A simplified variant of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralizedTable {
    /// Zero-based level; the physical table is `<table>_gen<level>`.
    pub level: u8,
    /// Simplification tolerance.
    pub tolerance: f64,
    /// Relative polygon area change allowed at this level.
    pub max_area_drift: f64,
    types: Option<BTreeSet<String>>,
}

impl GeneralizedTable {
    /// True when rows of `type_label` are copied into this variant.
    #[must_use]
    pub fn accepts(&self, type_label: &str) -> bool {
        self.types
            .as_ref()
            .is_none_or(|types| types.contains(type_label))
    }
}

/// A compiled output table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    /// Logical table name.
    pub name: String,
    /// Geometry kind.
    pub kind: TableKind,
    /// Generalized variants in level order.
    pub generalized: Vec<GeneralizedTable>,
    rules: Vec<Rule>,
    reject: Vec<Rule>,
    columns: Vec<ColumnConfig>,
}

impl TableSpec {
    /// Physical name of the variant at `level`, or of the base table.
    #[must_use]
    pub fn physical_name(&self, level: Option<u8>) -> String {
        generalized_table_name(&self.name, level)
    }

    /// Base and generalized physical names.
    #[must_use]
    pub fn physical_names(&self) -> Vec<String> {
        std::iter::once(self.physical_name(None))
            .chain(
                self.generalized
                    .iter()
                    .map(|variant| self.physical_name(Some(variant.level))),
            )
            .collect()
    }

    /// Column values for a row built from `tags`.
    ///
    /// Tag columns are present only when the key is. Enumerate columns are
    /// always present.
    #[must_use]
    pub fn column_values(&self, tags: &Tags) -> Tags {
        let mut values = Tags::new();
        for column in &self.columns {
            match column {
                ColumnConfig::Tag { name, key } => {
                    if let Some(value) = tags.get(key) {
                        values.insert(name.clone(), value.clone());
                    }
                }
                ColumnConfig::Enumerate {
                    name,
                    key,
                    values: ranked,
                } => {
                    let rank = enumerate_rank(ranked, tags.get(key).map(String::as_str));
                    values.insert(name.clone(), rank.to_string());
                }
            }
        }
        values
    }

    fn is_rejected(&self, tags: &Tags) -> bool {
        self.reject.iter().any(|rule| {
            tags.get(&rule.key)
                .is_some_and(|value| rule.values.matches(value))
        })
    }
}

/// Physical table name of a generalized variant.
#[must_use]
pub fn generalized_table_name(table: &str, level: Option<u8>) -> String {
    match level {
        Some(level) => format!("{table}_gen{level}"),
        None => table.to_owned(),
    }
}

/// Rank of `value` in `[<absent>, values...]`.
///
/// # Examples
/// ```
/// use osmstage_core::mapping::enumerate_rank;
///
/// let values = vec!["park".to_owned(), "forest".to_owned()];
/// assert_eq!(enumerate_rank(&values, Some("park")), 1);
/// assert_eq!(enumerate_rank(&values, Some("forest")), 2);
/// assert_eq!(enumerate_rank(&values, Some("meadow")), 0);
/// assert_eq!(enumerate_rank(&values, None), 0);
/// ```
#[must_use]
pub fn enumerate_rank(values: &[String], value: Option<&str>) -> usize {
    value
        .and_then(|value| values.iter().position(|candidate| candidate == value))
        .map_or(0, |position| position + 1)
}

/// Compiled mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct TagClassifier {
    tables: Vec<TableSpec>,
    relation_types: BTreeSet<String>,
    projection: Projection,
    assembly: AssemblyOptions,
    inherit_outer_way_tags: bool,
}

impl TagClassifier {
    /// Validate and compile a mapping document.
    pub fn from_config(config: MappingConfig) -> Result<Self, MappingError> {
        let tolerance = config.ring_gap_tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(MappingError::InvalidTolerance {
                table: "ring_gap_tolerance".to_owned(),
                tolerance,
            });
        }

        let mut seen = HashSet::new();
        let mut tables = Vec::with_capacity(config.tables.len());
        for table in config.tables {
            validate_identifier(&table.name)?;
            if table.name.contains(SCHEMA_SEPARATOR) {
                return Err(MappingError::ReservedSeparator { name: table.name });
            }
            if !seen.insert(table.name.clone()) {
                return Err(MappingError::DuplicateTable { name: table.name });
            }
            tables.push(compile_table(table)?);
        }
        debug!(
            "Compiled mapping with {} tables and relation types {:?}",
            tables.len(),
            config.relation_types
        );

        Ok(Self {
            tables,
            relation_types: config.relation_types.into_iter().collect(),
            projection: config.projection,
            assembly: AssemblyOptions {
                gap_tolerance: tolerance,
                empty_role: config.empty_role,
            },
            inherit_outer_way_tags: config.inherit_outer_way_tags,
        })
    }

    /// Parse and compile a JSON mapping document.
    pub fn from_json_str(json: &str) -> Result<Self, MappingError> {
        let config: MappingConfig =
            serde_json::from_str(json).map_err(|source| MappingError::Parse { source })?;
        Self::from_config(config)
    }

    /// Parse and compile a JSON mapping document from a reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, MappingError> {
        let config: MappingConfig =
            serde_json::from_reader(reader).map_err(|source| MappingError::Parse { source })?;
        Self::from_config(config)
    }

    /// Decide which tables an element belongs to.
    ///
    /// Tables are visited in declared order and every matching rule yields
    /// one decision, so an element can appear twice in one table under two
    /// type labels. No match yields an empty list.
    #[must_use]
    pub fn classify(&self, kind: ElementKind, tags: &Tags) -> Vec<Classification> {
        let mut decisions = Vec::new();
        if tags.is_empty() {
            return decisions;
        }
        for (table_index, table) in self.tables.iter().enumerate() {
            if !table.kind.accepts(kind) || table.is_rejected(tags) {
                continue;
            }
            for rule in &table.rules {
                let Some(value) = tags.get(&rule.key) else {
                    continue;
                };
                if rule.values.matches(value) {
                    decisions.push(Classification {
                        table_index,
                        table: table.name.clone(),
                        type_label: value.clone(),
                        standalone: table.kind != TableKind::Polygon,
                    });
                }
            }
        }
        decisions
    }

    /// Compiled tables in declared order.
    #[must_use]
    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    /// Table at `index`.
    #[must_use]
    pub fn table(&self, index: usize) -> Option<&TableSpec> {
        self.tables.get(index)
    }

    /// Every physical table name, base tables first within each table.
    #[must_use]
    pub fn physical_tables(&self) -> Vec<(TableKind, String)> {
        self.tables
            .iter()
            .flat_map(|table| {
                table
                    .physical_names()
                    .into_iter()
                    .map(move |name| (table.kind, name))
            })
            .collect()
    }

    /// True when a relation with these tags is assembled into polygons.
    #[must_use]
    pub fn assembles_relation(&self, tags: &Tags) -> bool {
        tags.get("type")
            .is_some_and(|kind| self.relation_types.contains(kind))
    }

    /// Output projection.
    #[must_use]
    pub const fn projection(&self) -> Projection {
        self.projection
    }

    /// Multipolygon assembly settings.
    #[must_use]
    pub const fn assembly_options(&self) -> &AssemblyOptions {
        &self.assembly
    }

    /// Whether `type`-only relations borrow their largest outer way's tags.
    #[must_use]
    pub const fn inherits_outer_way_tags(&self) -> bool {
        self.inherit_outer_way_tags
    }
}

fn compile_table(table: TableConfig) -> Result<TableSpec, MappingError> {
    if table.mapping.is_empty() {
        return Err(MappingError::EmptyMapping { table: table.name });
    }

    let mut column_names = HashSet::new();
    for column in &table.columns {
        validate_identifier(column.name())?;
        if !column_names.insert(column.name().to_owned()) {
            return Err(MappingError::DuplicateColumn {
                table: table.name.clone(),
                column: column.name().to_owned(),
            });
        }
    }

    let count = table.generalized.len();
    let mut generalized = Vec::with_capacity(count);
    for (position, variant) in table.generalized.into_iter().enumerate() {
        let level = u8::try_from(position).map_err(|_| MappingError::TooManyGeneralizations {
            table: table.name.clone(),
            count,
        })?;
        if !variant.tolerance.is_finite() || variant.tolerance < 0.0 {
            return Err(MappingError::InvalidTolerance {
                table: table.name.clone(),
                tolerance: variant.tolerance,
            });
        }
        if !variant.max_area_drift.is_finite() || variant.max_area_drift < 0.0 {
            return Err(MappingError::InvalidAreaDrift {
                table: table.name.clone(),
                drift: variant.max_area_drift,
            });
        }
        generalized.push(GeneralizedTable {
            level,
            tolerance: variant.tolerance,
            max_area_drift: variant.max_area_drift,
            types: variant.types.map(|types| types.into_iter().collect()),
        });
    }

    let rules = table
        .mapping
        .iter()
        .map(|rule| Rule {
            key: rule.key.clone(),
            values: ValueMatch::compile(&rule.values),
        })
        .collect();
    let reject = table
        .reject
        .iter()
        .map(|(key, values)| Rule {
            key: key.clone(),
            values: ValueMatch::compile(values),
        })
        .collect();

    Ok(TableSpec {
        name: table.name,
        kind: table.kind,
        generalized,
        rules,
        reject,
        columns: table.columns,
    })
}

fn validate_identifier(name: &str) -> Result<(), MappingError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(MappingError::InvalidIdentifier {
            name: name.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|&(key, value)| (key.to_owned(), value.to_owned()))
            .collect()
    }

    #[fixture]
    fn classifier() -> TagClassifier {
        TagClassifier::from_json_str(
            r#"{
                "tables": [
                    {
                        "name": "osm_roads",
                        "type": "linestring",
                        "mapping": [
                            {"key": "highway", "values": ["residential", "primary"]},
                            {"key": "railway", "values": ["tram"]}
                        ],
                        "generalized": [
                            {"tolerance": 50.0, "types": ["primary"]},
                            {"tolerance": 200.0, "types": ["primary"]}
                        ]
                    },
                    {
                        "name": "osm_landusages",
                        "type": "polygon",
                        "mapping": [{"key": "landuse", "values": ["__any__"]}],
                        "reject": {"area": ["no"]},
                        "columns": [
                            {"type": "tag", "name": "name", "key": "name"},
                            {"type": "enumerate", "name": "enum", "key": "landuse",
                             "values": ["park", "forest"]}
                        ]
                    },
                    {
                        "name": "osm_amenities",
                        "type": "point",
                        "mapping": [{"key": "amenity", "values": ["police"]}]
                    }
                ]
            }"#,
        )
        .expect("valid mapping")
    }

    #[rstest]
    fn two_rules_yield_two_rows_in_one_table(classifier: TagClassifier) {
        let decisions = classifier.classify(
            ElementKind::Way,
            &tags(&[("highway", "residential"), ("railway", "tram")]),
        );
        let labels: Vec<_> = decisions
            .iter()
            .map(|d| (d.table.as_str(), d.type_label.as_str()))
            .collect();
        assert_eq!(
            labels,
            vec![("osm_roads", "residential"), ("osm_roads", "tram")]
        );
    }

    #[rstest]
    #[case(ElementKind::Node, &[("amenity", "police")], vec!["osm_amenities"])]
    #[case(ElementKind::Way, &[("amenity", "police")], vec![])]
    #[case(ElementKind::Relation, &[("highway", "primary")], vec![])]
    #[case(ElementKind::Relation, &[("landuse", "park")], vec!["osm_landusages"])]
    #[case(ElementKind::Way, &[("landuse", "park"), ("area", "no")], vec![])]
    #[case(ElementKind::Way, &[], vec![])]
    fn tables_follow_geometry_kind_and_filters(
        classifier: TagClassifier,
        #[case] kind: ElementKind,
        #[case] pairs: &[(&str, &str)],
        #[case] expected: Vec<&str>,
    ) {
        let tables: Vec<_> = classifier
            .classify(kind, &tags(pairs))
            .into_iter()
            .map(|d| d.table)
            .collect();
        assert_eq!(tables, expected);
    }

    #[rstest]
    #[case(&[("landuse", "park")], "1")]
    #[case(&[("landuse", "forest")], "2")]
    #[case(&[("landuse", "meadow")], "0")]
    fn enumerate_column_ranks_values(
        classifier: TagClassifier,
        #[case] pairs: &[(&str, &str)],
        #[case] rank: &str,
    ) {
        let table = classifier.table(1).expect("landusages table");
        let values = table.column_values(&tags(pairs));
        assert_eq!(values.get("enum").map(String::as_str), Some(rank));
        assert!(!values.contains_key("name"));
    }

    #[rstest]
    fn generalized_variants_filter_types(classifier: TagClassifier) {
        let roads = classifier.table(0).expect("roads table");
        assert_eq!(
            roads.physical_names(),
            vec!["osm_roads", "osm_roads_gen0", "osm_roads_gen1"]
        );
        let gen0 = roads.generalized.first().expect("gen0");
        assert!(gen0.accepts("primary"));
        assert!(!gen0.accepts("residential"));
    }

    #[rstest]
    fn defaults_apply(classifier: TagClassifier) {
        assert_eq!(classifier.projection(), Projection::WebMercator);
        assert!(classifier.assembles_relation(&tags(&[("type", "multipolygon")])));
        assert!(classifier.assembles_relation(&tags(&[("type", "boundary")])));
        assert!(!classifier.assembles_relation(&tags(&[("type", "route")])));
        assert!((classifier.assembly_options().gap_tolerance - 0.5).abs() < f64::EPSILON);
    }

    #[rstest]
    #[case(r#"{"tables": [{"name": "bad name", "type": "point", "mapping": [{"key": "a", "values": ["b"]}]}]}"#)]
    #[case(r#"{"tables": [{"name": "t", "type": "point", "mapping": []}]}"#)]
    #[case(r#"{"tables": [{"name": "t", "type": "point", "mapping": [{"key": "a", "values": ["b"]}]}, {"name": "t", "type": "point", "mapping": [{"key": "a", "values": ["b"]}]}]}"#)]
    #[case(r#"{"ring_gap_tolerance": -1.0, "tables": []}"#)]
    #[case(r#"{"tables": [{"name": "t", "type": "hexagon", "mapping": []}]}"#)]
    #[case(r#"{"tables": [{"name": "t", "type": "polygon", "mapping": [{"key": "a", "values": ["b"]}], "generalized": [{"tolerance": 1.0, "max_area_drift": -0.5}]}]}"#)]
    fn invalid_documents_are_rejected(#[case] json: &str) {
        assert!(TagClassifier::from_json_str(json).is_err());
    }

    #[rstest]
    fn table_names_may_not_contain_the_schema_separator() {
        let err = TagClassifier::from_json_str(
            r#"{"tables": [{"name": "osm__roads", "type": "linestring",
                "mapping": [{"key": "highway", "values": ["__any__"]}]}]}"#,
        )
        .expect_err("separator in table name");
        match err {
            MappingError::ReservedSeparator { name } => assert_eq!(name, "osm__roads"),
            other => panic!("expected ReservedSeparator, found {other:?}"),
        }
    }

    #[rstest]
    fn area_drift_defaults_and_overrides(classifier: TagClassifier) {
        let roads = classifier.table(0).expect("roads table");
        let gen0 = roads.generalized.first().expect("gen0");
        assert!((gen0.max_area_drift - DEFAULT_MAX_AREA_DRIFT).abs() < f64::EPSILON);

        let custom = TagClassifier::from_json_str(
            r#"{"tables": [{"name": "osm_landusages", "type": "polygon",
                "mapping": [{"key": "landuse", "values": ["__any__"]}],
                "generalized": [{"tolerance": 10.0, "max_area_drift": 0.1}]}]}"#,
        )
        .expect("valid mapping");
        let variant = custom
            .table(0)
            .and_then(|table| table.generalized.first())
            .expect("gen0");
        assert!((variant.max_area_drift - 0.1).abs() < f64::EPSILON);
    }
}
