//! Composite keys for the assemblage index.
//!
//! Both keys order on the outer key first and the inner key second, so a
//! contiguous key range holds exactly one outer key's entries. The
//! comparators are written out by hand rather than derived, so the scan
//! order is part of this module's contract and not an accident of field
//! order.

use std::cmp::Ordering;
use std::ops::RangeInclusive;

use crate::{ElementSeq, Nid};

/// Key of the (assemblage, member) membership index.
///
/// # Examples
///
/// ```
/// use termdb_types::MembershipKey;
///
/// let a = MembershipKey { assemblage: 9, member: 3 };
/// let b = MembershipKey { assemblage: 9, member: 7 };
/// let c = MembershipKey { assemblage: 10, member: 1 };
/// assert!(a < b);
/// assert!(b < c);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MembershipKey {
    /// Sequence of the assemblage concept.
    pub assemblage: ElementSeq,
    /// Sequence of the member component.
    pub member: ElementSeq,
}

impl Ord for MembershipKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.assemblage
            .cmp(&other.assemblage)
            .then(self.member.cmp(&other.member))
    }
}

impl PartialOrd for MembershipKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl MembershipKey {
    /// The key range covering every member of one assemblage.
    pub fn assemblage_range(assemblage: ElementSeq) -> RangeInclusive<Self> {
        Self {
            assemblage,
            member: 0,
        }..=Self {
            assemblage,
            member: ElementSeq::MAX,
        }
    }
}

/// Key of the (referenced component, assemblage, member) reference index.
///
/// Orders every annotation of a component together, grouped by the
/// assemblage the annotation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReferenceKey {
    /// Nid of the component being annotated.
    pub referenced: Nid,
    /// Sequence of the assemblage the annotation belongs to.
    pub assemblage: ElementSeq,
    /// Sequence of the annotating component.
    pub member: ElementSeq,
}

impl Ord for ReferenceKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.referenced
            .cmp(&other.referenced)
            .then(self.assemblage.cmp(&other.assemblage))
            .then(self.member.cmp(&other.member))
    }
}

impl PartialOrd for ReferenceKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl ReferenceKey {
    /// The key range covering every annotation of one component.
    pub fn component_range(referenced: Nid) -> RangeInclusive<Self> {
        Self {
            referenced,
            assemblage: 0,
            member: 0,
        }..=Self {
            referenced,
            assemblage: ElementSeq::MAX,
            member: ElementSeq::MAX,
        }
    }

    /// The key range covering one component's annotations in one assemblage.
    pub fn assemblage_range(referenced: Nid, assemblage: ElementSeq) -> RangeInclusive<Self> {
        Self {
            referenced,
            assemblage,
            member: 0,
        }..=Self {
            referenced,
            assemblage,
            member: ElementSeq::MAX,
        }
    }
}
