//! Queue data model: items, statuses, format tags, status tallies.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Processing status of a queued item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Waiting for a worker.
    Pending,
    /// Claimed by a worker.
    Running,
    /// Processed successfully.
    Complete,
    /// Processing failed. Terminal.
    Failed,
}

impl ItemStatus {
    pub const ALL: [ItemStatus; 4] = [Self::Pending, Self::Running, Self::Complete, Self::Failed];

    /// Pending → Running → {Complete, Failed}. Nothing leaves a terminal state.
    pub fn can_transition_to(&self, target: ItemStatus) -> bool {
        use ItemStatus::*;

        matches!(
            (self, target),
            (Pending, Running) | (Running, Complete) | (Running, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "complete" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown item status: {other}")),
        }
    }
}

/// How an item was derived from the submitted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatTag {
    /// The whole message is one task.
    Single,
    /// One task per bulleted line.
    Bullet,
    /// Prose describing several tasks.
    NarrativeMulti,
}

impl FormatTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Bullet => "bullet",
            Self::NarrativeMulti => "narrative_multi",
        }
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(Self::Single),
            "bullet" => Ok(Self::Bullet),
            "narrative_multi" => Ok(Self::NarrativeMulti),
            other => Err(format!("unknown format tag: {other}")),
        }
    }
}

/// One unit of work in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedItem {
    pub id: i64,
    pub batch_id: Uuid,
    pub text: String,
    pub format_tag: FormatTag,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// An item to be enqueued: text plus the format it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub text: String,
    pub format_tag: FormatTag,
}

impl NewItem {
    pub fn new(text: impl Into<String>, format_tag: FormatTag) -> Self {
        Self {
            text: text.into(),
            format_tag,
        }
    }
}

/// Item counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub complete: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn get(&self, status: ItemStatus) -> usize {
        match status {
            ItemStatus::Pending => self.pending,
            ItemStatus::Running => self.running,
            ItemStatus::Complete => self.complete,
            ItemStatus::Failed => self.failed,
        }
    }

    pub fn add(&mut self, status: ItemStatus, n: usize) {
        match status {
            ItemStatus::Pending => self.pending += n,
            ItemStatus::Running => self.running += n,
            ItemStatus::Complete => self.complete += n,
            ItemStatus::Failed => self.failed += n,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.running + self.complete + self.failed
    }

    /// At least one item, and none of them Pending or Running.
    pub fn is_complete(&self) -> bool {
        self.total() > 0 && self.pending == 0 && self.running == 0
    }
}

impl FromIterator<ItemStatus> for StatusCounts {
    fn from_iter<I: IntoIterator<Item = ItemStatus>>(iter: I) -> Self {
        let mut counts = Self::default();
        for status in iter {
            counts.add(status, 1);
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions() {
        use ItemStatus::*;

        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Complete));
        assert!(Running.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Complete));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Running.can_transition_to(Pending));
        assert!(!Complete.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Running));
        assert!(!Complete.can_transition_to(Pending));
    }

    #[test]
    fn status_string_roundtrip() {
        for status in ItemStatus::ALL {
            assert_eq!(status.as_str().parse::<ItemStatus>().unwrap(), status);
        }
        assert!("done".parse::<ItemStatus>().is_err());
    }

    #[test]
    fn format_tag_serde_matches_db_strings() {
        let json = serde_json::to_string(&FormatTag::NarrativeMulti).unwrap();
        assert_eq!(json, "\"narrative_multi\"");
        assert_eq!("bullet".parse::<FormatTag>().unwrap(), FormatTag::Bullet);
    }

    #[test]
    fn counts_completion() {
        assert!(!StatusCounts::default().is_complete());

        let counts: StatusCounts = [ItemStatus::Complete, ItemStatus::Failed].into_iter().collect();
        assert_eq!(counts.total(), 2);
        assert!(counts.is_complete());

        let counts: StatusCounts = [ItemStatus::Complete, ItemStatus::Running].into_iter().collect();
        assert!(!counts.is_complete());
        assert_eq!(counts.get(ItemStatus::Running), 1);
    }
}
