//! Component kinds and version payloads.

use crate::Nid;

/// What kind of component a chronicle records.
///
/// The kind is fixed at creation: a concept stays a concept, and a
/// semantic annotation keeps its assemblage and referenced component for
/// every version it ever grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ComponentKind {
    /// A concept: a named idea that other components may reference.
    Concept,
    /// A semantic annotation attached to another component.
    Semantic {
        /// The assemblage concept this annotation belongs to.
        assemblage: Nid,
        /// The component this annotation describes.
        referenced: Nid,
    },
}

impl ComponentKind {
    /// Returns true for [`ComponentKind::Concept`].
    pub fn is_concept(&self) -> bool {
        matches!(self, Self::Concept)
    }

    /// The referenced component, for semantic annotations.
    pub fn referenced(&self) -> Option<Nid> {
        match self {
            Self::Concept => None,
            Self::Semantic { referenced, .. } => Some(*referenced),
        }
    }

    /// The owning assemblage, for semantic annotations.
    pub fn assemblage(&self) -> Option<Nid> {
        match self {
            Self::Concept => None,
            Self::Semantic { assemblage, .. } => Some(*assemblage),
        }
    }
}

/// The type-specific payload of one version.
///
/// Concept versions carry no payload beyond their stamp. Semantic versions
/// carry one of the payload shapes an assemblage can define.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VersionData {
    /// A concept version: the stamp is the whole story.
    Concept,
    /// Bare membership in the owning assemblage.
    Membership,
    /// A text field, e.g. a description term.
    Text(String),
    /// A reference to another component.
    Reference(Nid),
    /// An integer field, e.g. an ordering or a count.
    Count(i64),
}

impl VersionData {
    /// The text payload, if this is a [`VersionData::Text`] version.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(term) => Some(term),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_accessors() {
        let concept = ComponentKind::Concept;
        assert!(concept.is_concept());
        assert_eq!(concept.referenced(), None);

        let semantic = ComponentKind::Semantic {
            assemblage: -5,
            referenced: -9,
        };
        assert!(!semantic.is_concept());
        assert_eq!(semantic.assemblage(), Some(-5));
        assert_eq!(semantic.referenced(), Some(-9));
    }

    #[test]
    fn test_text_payload() {
        let data = VersionData::Text("Myocardial infarction".to_string());
        assert_eq!(data.as_text(), Some("Myocardial infarction"));
        assert_eq!(VersionData::Membership.as_text(), None);
    }
}
