//! Shared database models
//!
//! Every cross-table reference is an integer surrogate key. Names are display
//! data resolved through the item catalog or the projects table, never join keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Owning community (chat guild)
    GuildId
);
id_type!(
    /// Contributor holding items
    OwnerId
);
id_type!(
    /// Chat channel a dashboard message lives in
    ChannelId
);
id_type!(
    /// External message identifier
    MessageId
);
id_type!(
    /// Item catalog surrogate key
    ItemId
);
id_type!(
    /// Project surrogate key
    ProjectId
);

/// Project lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Completed,
}

impl ProjectStatus {
    /// Value stored in the `projects.status` column
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Completed => "completed",
        }
    }
}

impl FromStr for ProjectStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(ProjectStatus::Active),
            "completed" => Ok(ProjectStatus::Completed),
            other => Err(crate::Error::UnknownValue {
                field: "project status",
                value: other.to_string(),
                expected: "active or completed",
            }),
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to one externally hosted message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_status_round_trips_through_column_value() {
        for status in [ProjectStatus::Active, ProjectStatus::Completed] {
            assert_eq!(status.as_str().parse::<ProjectStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_project_status_parse_is_case_insensitive() {
        assert_eq!(" Completed ".parse::<ProjectStatus>().unwrap(), ProjectStatus::Completed);
    }

    #[test]
    fn test_unknown_status_rejected() {
        let err = "archived".parse::<ProjectStatus>().unwrap_err();
        assert!(err.to_string().contains("archived"));
    }

    #[test]
    fn test_ids_serialize_as_plain_numbers() {
        let json = serde_json::to_string(&GuildId(42)).unwrap();
        assert_eq!(json, "42");
        assert_eq!(OwnerId(7).to_string(), "7");
    }
}
