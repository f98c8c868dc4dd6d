use serde::{Deserialize, Serialize};

/// Download priority for files and pieces.
///
/// `Mixed` only ever appears on synthesized folders whose descendants disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadPriority {
    /// Skip the file entirely.
    Ignored,
    /// Default priority.
    #[default]
    Normal,
    /// Preferred over normal files.
    High,
    /// Fetched before everything else.
    Maximum,
    /// Folder whose descendants carry different priorities.
    Mixed,
}

impl DownloadPriority {
    /// Numeric value understood by the engine.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Ignored => 0,
            Self::Normal => 1,
            Self::High => 6,
            Self::Maximum => 7,
            Self::Mixed => -1,
        }
    }

    /// Map an engine value back to a priority; values between the named levels
    /// round down to the nearest one.
    #[must_use]
    pub const fn from_i32(value: i32) -> Self {
        match value {
            i32::MIN..=-1 => Self::Mixed,
            0 => Self::Ignored,
            1..=5 => Self::Normal,
            6 => Self::High,
            _ => Self::Maximum,
        }
    }

    /// Whether the priority excludes the item from download.
    #[must_use]
    pub const fn is_ignored(self) -> bool {
        matches!(self, Self::Ignored)
    }

    /// Whether the value can be assigned to a single file or piece.
    #[must_use]
    pub const fn is_valid_for_file(self) -> bool {
        !matches!(self, Self::Mixed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_values_round_trip_for_named_levels() {
        for priority in [
            DownloadPriority::Ignored,
            DownloadPriority::Normal,
            DownloadPriority::High,
            DownloadPriority::Maximum,
            DownloadPriority::Mixed,
        ] {
            assert_eq!(DownloadPriority::from_i32(priority.as_i32()), priority);
        }
        assert_eq!(DownloadPriority::from_i32(4), DownloadPriority::Normal);
    }
}
