use osmstage_core::Element;

use super::{ElementSource, IngestSummary, SourceError};

/// A source backed by elements already in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySource {
    elements: Vec<Element>,
}

impl MemorySource {
    /// Wrap `elements`, which are replayed in order.
    #[must_use]
    pub const fn new(elements: Vec<Element>) -> Self {
        Self { elements }
    }

    /// Number of wrapped elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether no elements are wrapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl FromIterator<Element> for MemorySource {
    fn from_iter<I: IntoIterator<Item = Element>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl ElementSource for MemorySource {
    fn read_elements(&self, sink: &(dyn Fn(Element) + Sync)) -> Result<IngestSummary, SourceError> {
        let mut summary = IngestSummary::default();
        for element in &self.elements {
            summary.record(element);
            sink(element.clone());
        }
        Ok(summary)
    }
}
