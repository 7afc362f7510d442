//! Query engine integration.
//!
//! This module implements the `Queryable` trait for `ChronicleStore`,
//! enabling clause-tree query evaluation against the live store.

use termdb_query::{FetchError, Queryable};
use termdb_types::{ElementSeq, StampCoordinate};

use crate::ChronicleStore;

impl Queryable for ChronicleStore {
    fn concept_sequences(&self) -> Vec<ElementSeq> {
        ChronicleStore::concept_sequences(self)
    }

    fn component_sequences(&self) -> Vec<ElementSeq> {
        ChronicleStore::component_sequences(self)
    }

    fn members_of(&self, assemblage: ElementSeq) -> Vec<ElementSeq> {
        ChronicleStore::members_of(self, assemblage)
    }

    fn is_active_at(
        &self,
        component: ElementSeq,
        coordinate: &StampCoordinate,
    ) -> Result<bool, FetchError> {
        let Some(nid) = self.identity().nid_for_sequence(component) else {
            return Ok(false);
        };
        let Some(chronicle) = self.read(nid) else {
            return Ok(false);
        };
        let latest = self
            .calculator()
            .latest(&chronicle.stamps(), coordinate)
            .map_err(|err| FetchError {
                sequence: component,
                detail: err.to_string(),
            })?;

        // A contradiction counts as active if any surviving version is.
        for stamp in latest.stamps() {
            let resolved = self.stamps().resolve(stamp).map_err(|err| FetchError {
                sequence: component,
                detail: err.to_string(),
            })?;
            if resolved.status.is_active() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn text_fields(&self, component: ElementSeq) -> Result<Vec<String>, FetchError> {
        let Some(nid) = self.identity().nid_for_sequence(component) else {
            return Ok(Vec::new());
        };
        let Some(chronicle) = self.read(nid) else {
            return Ok(Vec::new());
        };

        let mut fields = Vec::new();
        for version in &chronicle.versions {
            let stamp = self.stamps().resolve(version.stamp).map_err(|err| FetchError {
                sequence: component,
                detail: err.to_string(),
            })?;
            if !stamp.is_committed() {
                continue;
            }
            if let Some(text) = version.data.as_text() {
                fields.push(text.to_string());
            }
        }
        Ok(fields)
    }
}
