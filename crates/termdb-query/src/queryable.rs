//! The seam between the query engine and a component store.

use termdb_types::{ElementSeq, StampCoordinate};

use crate::FetchError;

/// Read access the query engine needs from a component store.
///
/// Implementations must be safe for concurrent reads: the iteration pass
/// calls into the store from several worker threads at once.
pub trait Queryable: Sync {
    /// Sequences of every concept, ascending.
    fn concept_sequences(&self) -> Vec<ElementSeq>;

    /// Sequences of every component (concepts and annotations), ascending.
    fn component_sequences(&self) -> Vec<ElementSeq>;

    /// Members of an assemblage, ascending.
    fn members_of(&self, assemblage: ElementSeq) -> Vec<ElementSeq>;

    /// Returns true if `component` is a member of `assemblage`.
    fn is_member(&self, assemblage: ElementSeq, component: ElementSeq) -> bool {
        self.members_of(assemblage).binary_search(&component).is_ok()
    }

    /// Resolves the component's latest visible versions under `coordinate`
    /// and reports whether at least one of them is active.
    ///
    /// A component with no visible version is inactive from that point of
    /// view.
    fn is_active_at(
        &self,
        component: ElementSeq,
        coordinate: &StampCoordinate,
    ) -> Result<bool, FetchError>;

    /// Committed text payloads of the component, in version order.
    fn text_fields(&self, component: ElementSeq) -> Result<Vec<String>, FetchError>;
}
