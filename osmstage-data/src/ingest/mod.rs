//! Element sources: decoded feeds of nodes, ways and relations.
//!
//! A source pushes every element it decodes into a caller-supplied sink and
//! returns a summary of what it saw. Sinks must be `Sync` because the PBF
//! source decodes blocks on several threads at once.

use camino::Utf8PathBuf;
use geo::{Coord, Rect};
use osmstage_core::{Element, ElementError};
use thiserror::Error;

mod change;
mod memory;
mod pbf;

pub use change::{Change, read_change_file, read_changes};
pub use memory::MemorySource;
pub use pbf::PbfSource;

/// A feed of decoded elements.
pub trait ElementSource {
    /// Push every element into `sink`, in any order.
    fn read_elements(&self, sink: &(dyn Fn(Element) + Sync)) -> Result<IngestSummary, SourceError>;
}

/// Summary of raw elements discovered while reading a source.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IngestSummary {
    /// Number of nodes accepted, including dense-node entries.
    pub nodes: u64,
    /// Number of ways accepted.
    pub ways: u64,
    /// Number of relations accepted.
    pub relations: u64,
    /// Number of elements skipped because they failed validation.
    pub skipped: u64,
    /// Bounding box covering all node coordinates, if any nodes were present.
    /// Coordinates are WGS84 with `x = longitude`, `y = latitude`.
    pub bounds: Option<Rect<f64>>,
}

impl IngestSummary {
    pub(crate) fn combine(mut self, other: Self) -> Self {
        self.nodes += other.nodes;
        self.ways += other.ways;
        self.relations += other.relations;
        self.skipped += other.skipped;
        if let Some(bounds) = other.bounds {
            self.include_bounds(bounds);
        }
        self
    }

    fn include_bounds(&mut self, bounds: Rect<f64>) {
        match &mut self.bounds {
            Some(existing) => {
                let min = Coord {
                    x: existing.min().x.min(bounds.min().x),
                    y: existing.min().y.min(bounds.min().y),
                };
                let max = Coord {
                    x: existing.max().x.max(bounds.max().x),
                    y: existing.max().y.max(bounds.max().y),
                };
                *existing = Rect::new(min, max);
            }
            None => self.bounds = Some(bounds),
        }
    }

    /// Count `element` and grow the bounds by its coordinates.
    pub(crate) fn record(&mut self, element: &Element) {
        match element {
            Element::Node(node) => {
                self.nodes += 1;
                let coordinate = node.coord();
                self.include_bounds(Rect::new(coordinate, coordinate));
            }
            Element::Way(_) => self.ways += 1,
            Element::Relation(_) => self.relations += 1,
        }
    }

    pub(crate) const fn record_skipped(&mut self) {
        self.skipped += 1;
    }
}

/// Errors returned by element sources.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The PBF file could not be opened.
    #[error("failed to open OSM PBF file at {path}")]
    Open {
        /// File that failed to open.
        path: Utf8PathBuf,
        /// Decoder error.
        #[source]
        source: osmpbf::Error,
    },
    /// A PBF block could not be decoded.
    #[error("failed to decode OSM PBF data at {path}")]
    Decode {
        /// File being decoded.
        path: Utf8PathBuf,
        /// Decoder error.
        #[source]
        source: osmpbf::Error,
    },
    /// The change file could not be read.
    #[error("failed to read change file at {path}")]
    ReadChanges {
        /// Change file.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A change line is not valid JSON for its action.
    #[error("change line {line} is malformed")]
    MalformedChange {
        /// One-based line number.
        line: usize,
        /// JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// A change line has no `action` field.
    #[error("change line {line} has no action")]
    MissingAction {
        /// One-based line number.
        line: usize,
    },
    /// A change line names an action other than create, modify or delete.
    #[error("change line {line} has unknown action {action:?}")]
    UnknownAction {
        /// One-based line number.
        line: usize,
        /// Action as written.
        action: String,
    },
    /// A change line carries an invalid element.
    #[error("change line {line} carries an invalid element")]
    InvalidElement {
        /// One-based line number.
        line: usize,
        /// Validation error.
        #[source]
        source: ElementError,
    },
}
