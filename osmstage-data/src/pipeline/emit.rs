//! Row derivation for single elements.
//!
//! The emitter is shared by the import stages and by diffs. It reads the
//! element store, never writes it, and is safe to call from many workers.

use std::collections::{BTreeSet, HashSet};

use geo::{Coord, Geometry, Point};
use log::debug;
use osmstage_core::geometry::{
    Assembly, MemberRole, RoleWay, assemble_multipolygon, build_line, build_way_polygon,
};
use osmstage_core::{
    Classification, Detail, ElementKey, ElementKind, Generalizer, GeometryDefect, MemberRef, Node,
    OutputRow, Relation, TableKind, TagClassifier, Tags, Way, row_id,
};

use crate::cache::ElementStore;

/// `(table index, type label)` pairs a way is suppressed from because a
/// relation already produced a row there.
pub(crate) type Consumption = BTreeSet<(usize, String)>;

/// Everything derived from one element.
#[derive(Debug, Default)]
pub(crate) struct Emitted {
    pub(crate) rows: Vec<OutputRow>,
    pub(crate) defects: Vec<GeometryDefect>,
    /// `(way id, table index, type label)` claimed by a relation row.
    pub(crate) consumed: Vec<(i64, usize, String)>,
}

impl Emitted {
    fn defect(&mut self, key: ElementKey, defect: GeometryDefect) {
        debug!("{key}: {defect}");
        self.defects.push(defect);
    }
}

pub(crate) struct Emitter<'a> {
    store: &'a ElementStore,
    classifier: &'a TagClassifier,
    generalizers: Vec<Generalizer>,
}

impl<'a> Emitter<'a> {
    pub(crate) fn new(store: &'a ElementStore, classifier: &'a TagClassifier) -> Self {
        Self {
            store,
            classifier,
            generalizers: classifier
                .tables()
                .iter()
                .map(Generalizer::for_table)
                .collect(),
        }
    }

    /// Whether any relation that transitively contains `way_id` is
    /// assembled into polygons.
    pub(crate) fn has_assembled_parent(&self, way_id: i64) -> bool {
        self.assembled_parents(way_id).next().is_some()
    }

    /// Assembled relations that transitively contain `way_id`.
    pub(crate) fn assembled_parents(&self, way_id: i64) -> impl Iterator<Item = Relation> + '_ {
        self.store
            .dependents(ElementKey::way(way_id))
            .into_iter()
            .filter(|key| key.kind == ElementKind::Relation)
            .filter_map(|key| self.store.relation(key.id))
            .filter(|relation| self.classifier.assembles_relation(&relation.tags))
    }

    pub(crate) fn node_rows(&self, node: &Node) -> Emitted {
        let mut emitted = Emitted::default();
        let decisions = self.classifier.classify(ElementKind::Node, &node.tags);
        if decisions.is_empty() {
            return emitted;
        }
        let point = Point::from(self.classifier.projection().project(node.coord()));
        let geometry = Geometry::Point(point);
        for decision in &decisions {
            self.push_rows(
                &mut emitted,
                ElementKey::node(node.id),
                decision,
                &node.tags,
                &geometry,
            );
        }
        emitted
    }

    pub(crate) fn way_rows(&self, way: &Way, consumed: Option<&Consumption>) -> Emitted {
        let mut emitted = Emitted::default();
        let key = ElementKey::way(way.id);
        let decisions: Vec<Classification> = self
            .classifier
            .classify(ElementKind::Way, &way.tags)
            .into_iter()
            .filter(|decision| {
                consumed.is_none_or(|pairs| {
                    !pairs.contains(&(decision.table_index, decision.type_label.clone()))
                })
            })
            .collect();
        if decisions.is_empty() {
            return emitted;
        }

        let resolved = self.store.resolve_way(way);
        if !resolved.is_complete() {
            emitted.defect(
                key,
                GeometryDefect::MissingNodes {
                    missing: resolved.missing.len(),
                },
            );
            return emitted;
        }
        let coords = self.project(&resolved.coords);
        let gap = self.classifier.assembly_options().gap_tolerance;

        let mut line = None;
        let mut polygon = None;
        for decision in &decisions {
            let Some(kind) = self
                .classifier
                .table(decision.table_index)
                .map(|table| table.kind)
            else {
                continue;
            };
            let built = match kind {
                TableKind::Point => continue,
                TableKind::LineString => {
                    line.get_or_insert_with(|| build_line(&coords).map(Geometry::LineString))
                }
                TableKind::Polygon => polygon.get_or_insert_with(|| {
                    build_way_polygon(&coords, way.is_closed(), gap).map(Geometry::Polygon)
                }),
            };
            if let Ok(geometry) = built {
                let geometry = geometry.clone();
                self.push_rows(&mut emitted, key, decision, &way.tags, &geometry);
            }
        }
        for defect in [line, polygon].into_iter().flatten().filter_map(Result::err) {
            emitted.defect(key, defect);
        }
        emitted
    }

    pub(crate) fn relation_rows(&self, relation: &Relation) -> Emitted {
        let mut emitted = Emitted::default();
        let key = ElementKey::relation(relation.id);
        if !self.classifier.assembles_relation(&relation.tags) {
            return emitted;
        }

        let mut members = Vec::new();
        let mut visited = HashSet::from([relation.id]);
        self.collect_members(key, relation, &mut visited, &mut members, &mut emitted);

        let Assembly {
            geometry,
            outer_ways,
            inner_ways,
            defects,
        } = assemble_multipolygon(&members, self.classifier.assembly_options());
        for defect in defects {
            emitted.defect(key, defect);
        }
        let Some(multipolygon) = geometry else {
            return emitted;
        };
        let Some(tags) = self.effective_tags(relation, &outer_ways) else {
            debug!("{key}: no tags to classify");
            return emitted;
        };

        let geometry = Geometry::MultiPolygon(multipolygon);
        for decision in self.classifier.classify(ElementKind::Relation, &tags) {
            self.push_rows(&mut emitted, key, &decision, &tags, &geometry);
            for &way_id in outer_ways.iter().chain(&inner_ways) {
                emitted
                    .consumed
                    .push((way_id, decision.table_index, decision.type_label.clone()));
            }
        }
        emitted
    }

    /// Tags a relation is classified by. A relation tagged with nothing but
    /// its type borrows the tags of the first tagged way of its largest
    /// outer ring.
    fn effective_tags(&self, relation: &Relation, outer_ways: &[i64]) -> Option<Tags> {
        if !relation.has_only_type_tag() {
            return Some(relation.tags.clone());
        }
        if !self.classifier.inherits_outer_way_tags() {
            return None;
        }
        outer_ways
            .iter()
            .filter_map(|&way_id| self.store.way(way_id))
            .find(|way| way.tags.keys().any(|tag| tag != "type"))
            .map(|way| way.tags)
    }

    fn collect_members(
        &self,
        root: ElementKey,
        relation: &Relation,
        visited: &mut HashSet<i64>,
        members: &mut Vec<RoleWay>,
        emitted: &mut Emitted,
    ) {
        for member in &relation.members {
            match member.target {
                MemberRef::Node(_) => {}
                MemberRef::Way(way_id) => {
                    let Some(role) = MemberRole::parse(&member.role) else {
                        continue;
                    };
                    let Some(way) = self.store.way(way_id) else {
                        emitted.defect(
                            root,
                            GeometryDefect::MissingMember {
                                member: ElementKey::way(way_id),
                            },
                        );
                        continue;
                    };
                    let resolved = self.store.resolve_way(&way);
                    if !resolved.is_complete() {
                        emitted.defect(
                            root,
                            GeometryDefect::MissingNodes {
                                missing: resolved.missing.len(),
                            },
                        );
                        continue;
                    }
                    members.push(RoleWay {
                        way_id,
                        role,
                        coords: self.project(&resolved.coords),
                    });
                }
                MemberRef::Relation(child_id) => {
                    if !visited.insert(child_id) {
                        emitted.defect(root, GeometryDefect::RelationCycle { relation: child_id });
                        continue;
                    }
                    match self.store.relation(child_id) {
                        Some(child) => self.collect_members(root, &child, visited, members, emitted),
                        None => emitted.defect(
                            root,
                            GeometryDefect::MissingMember {
                                member: ElementKey::relation(child_id),
                            },
                        ),
                    }
                }
            }
        }
    }

    /// Push the base row for `decision` and one row per accepting
    /// generalized variant.
    fn push_rows(
        &self,
        emitted: &mut Emitted,
        key: ElementKey,
        decision: &Classification,
        tags: &Tags,
        geometry: &Geometry<f64>,
    ) {
        let Some(table) = self.classifier.table(decision.table_index) else {
            return;
        };
        let base = OutputRow {
            table: table.name.clone(),
            detail: Detail::Full,
            osm_id: row_id(key),
            kind: key.kind,
            type_label: decision.type_label.clone(),
            tags: table.column_values(tags),
            geometry: geometry.clone(),
        };
        if let Some(generalizer) = self.generalizers.get(decision.table_index) {
            for variant in &table.generalized {
                if !variant.accepts(&decision.type_label) {
                    continue;
                }
                if let Some(simplified) = generalizer.generalize(geometry, variant.level) {
                    emitted.rows.push(OutputRow {
                        detail: Detail::Generalized(variant.level),
                        geometry: simplified,
                        ..base.clone()
                    });
                }
            }
        }
        emitted.rows.push(base);
    }

    fn project(&self, coords: &[Coord<f64>]) -> Vec<Coord<f64>> {
        let projection = self.classifier.projection();
        coords
            .iter()
            .map(|&coord| projection.project(coord))
            .collect()
    }
}
