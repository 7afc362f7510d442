//! Component status.

/// The status carried by a stamp.
///
/// Every version of every component is either active or inactive at the
/// moment described by its stamp. Inactivation never deletes anything:
/// an inactive version is a new, later entry in the chronicle.
///
/// # Examples
///
/// ```
/// use termdb_types::Status;
///
/// let status = Status::from_active_flag(true);
/// assert_eq!(status, Status::Active);
/// assert!(status.is_active());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Status {
    /// The component is in use at this point in its history.
    Active,
    /// The component has been retired at this point in its history.
    Inactive,
}

impl Status {
    /// Creates a Status from a boolean active flag.
    pub fn from_active_flag(active: bool) -> Self {
        if active {
            Self::Active
        } else {
            Self::Inactive
        }
    }

    /// Returns true if this status is [`Status::Active`].
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns true if this status is [`Status::Inactive`].
    pub fn is_inactive(self) -> bool {
        matches!(self, Self::Inactive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_flag() {
        assert_eq!(Status::from_active_flag(true), Status::Active);
        assert_eq!(Status::from_active_flag(false), Status::Inactive);
    }

    #[test]
    fn test_status_predicates() {
        assert!(Status::Active.is_active());
        assert!(!Status::Active.is_inactive());
        assert!(Status::Inactive.is_inactive());
        assert!(!Status::Inactive.is_active());
    }
}
