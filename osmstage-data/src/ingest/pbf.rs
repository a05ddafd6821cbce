//! OSM PBF decoding through `osmpbf`.

use camino::{Utf8Path, Utf8PathBuf};
use log::warn;
use osmpbf::{ElementReader, RelMemberType};
use osmstage_core::{Element, Member, MemberRef, Node, Relation, Tags, Way};

use super::{ElementSource, IngestSummary, SourceError};

/// Parallel reader for `.osm.pbf` files.
///
/// # Examples
/// ```no_run
/// use camino::Utf8Path;
/// use osmstage_data::{ElementSource, PbfSource};
///
/// # fn main() -> Result<(), osmstage_data::SourceError> {
/// let source = PbfSource::new(Utf8Path::new("planet.osm.pbf"));
/// let summary = source.read_elements(&|_element| {})?;
/// println!("Nodes: {}", summary.nodes);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PbfSource {
    path: Utf8PathBuf,
}

impl PbfSource {
    /// Source reading `path`.
    #[must_use]
    pub fn new(path: &Utf8Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// File this source reads.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl ElementSource for PbfSource {
    fn read_elements(&self, sink: &(dyn Fn(Element) + Sync)) -> Result<IngestSummary, SourceError> {
        let reader =
            ElementReader::from_path(self.path.as_std_path()).map_err(|source| SourceError::Open {
                source,
                path: self.path.clone(),
            })?;

        reader
            .par_map_reduce(
                |element| {
                    let mut summary = IngestSummary::default();
                    match convert(element) {
                        Some(converted) => {
                            summary.record(&converted);
                            sink(converted);
                        }
                        None => summary.record_skipped(),
                    }
                    summary
                },
                IngestSummary::default,
                IngestSummary::combine,
            )
            .map_err(|source| SourceError::Decode {
                source,
                path: self.path.clone(),
            })
    }
}

fn convert(element: osmpbf::Element<'_>) -> Option<Element> {
    match element {
        osmpbf::Element::Node(node) => {
            convert_node(node.id(), node.lon(), node.lat(), collect_tags(node.tags()))
        }
        osmpbf::Element::DenseNode(node) => {
            convert_node(node.id(), node.lon(), node.lat(), collect_tags(node.tags()))
        }
        osmpbf::Element::Way(way) => Some(Element::Way(Way::new(
            way.id(),
            way.refs().collect(),
            collect_tags(way.tags()),
        ))),
        osmpbf::Element::Relation(relation) => {
            let members = relation
                .members()
                .map(|member| {
                    let target = match member.member_type {
                        RelMemberType::Node => MemberRef::Node(member.member_id),
                        RelMemberType::Way => MemberRef::Way(member.member_id),
                        RelMemberType::Relation => MemberRef::Relation(member.member_id),
                    };
                    Member::new(target, member.role().unwrap_or_default())
                })
                .collect();
            Some(Element::Relation(Relation::new(
                relation.id(),
                members,
                collect_tags(relation.tags()),
            )))
        }
    }
}

fn convert_node(id: i64, lon: f64, lat: f64, tags: Tags) -> Option<Element> {
    match Node::new(id, lon, lat, tags) {
        Ok(node) => Some(Element::Node(node)),
        Err(err) => {
            warn!("Skipping node: {err}");
            None
        }
    }
}

fn collect_tags<'a, T>(tags: T) -> Tags
where
    T: IntoIterator<Item = (&'a str, &'a str)>,
{
    tags.into_iter()
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
}
