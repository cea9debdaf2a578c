use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{NoteError, Result};

/// Lifecycle state of a publishable note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    /// Written by the owner, not yet queued or scheduled.
    Draft,
    /// Suggested content the owner has not adopted yet.
    Inspiration,
    /// The owner intends to publish it but has not picked a time.
    Queued,
    /// Bound to exactly one live scheduled trigger.
    Scheduled,
    /// Published. Terminal.
    Sent,
}

impl NoteStatus {
    /// Whether the state machine allows `self -> to`.
    pub fn can_transition_to(self, to: NoteStatus) -> bool {
        use NoteStatus::*;
        matches!(
            (self, to),
            (Draft | Inspiration | Queued, Scheduled)
                | (Scheduled, Draft | Queued)
                | (Scheduled, Sent)
        )
    }

    pub fn check_transition(self, to: NoteStatus) -> Result<()> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(NoteError::InvalidTransition { from: self, to })
        }
    }

    /// Statuses a note may be created with.
    pub fn is_initial(self) -> bool {
        matches!(self, NoteStatus::Draft | NoteStatus::Inspiration | NoteStatus::Queued)
    }
}

impl std::fmt::Display for NoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NoteStatus::Draft => "draft",
            NoteStatus::Inspiration => "inspiration",
            NoteStatus::Queued => "queued",
            NoteStatus::Scheduled => "scheduled",
            NoteStatus::Sent => "sent",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for NoteStatus {
    type Err = NoteError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(NoteStatus::Draft),
            "inspiration" => Ok(NoteStatus::Inspiration),
            "queued" => Ok(NoteStatus::Queued),
            "scheduled" => Ok(NoteStatus::Scheduled),
            "sent" => Ok(NoteStatus::Sent),
            other => Err(NoteError::InvalidStatus(other.to_string())),
        }
    }
}

/// A persisted note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// UUIDv7 string: primary key.
    pub id: String,
    pub owner_id: String,
    pub body: String,
    pub status: NoteStatus,
    /// Present only while `status == Scheduled`.
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Set once, when the note is published.
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A compare-and-set status update.
///
/// Stores apply it only while the note still has status `expected`, which
/// lets racing callers detect that someone else moved the note first.
/// Build one through the constructors so the state machine is always
/// consulted.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub expected: NoteStatus,
    pub next: NoteStatus,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl StatusChange {
    /// `draft | inspiration | queued -> scheduled`.
    pub fn schedule(from: NoteStatus, at: DateTime<Utc>) -> Result<Self> {
        from.check_transition(NoteStatus::Scheduled)?;
        Ok(Self {
            expected: from,
            next: NoteStatus::Scheduled,
            scheduled_for: Some(at),
            sent_at: None,
        })
    }

    /// Move the target time of an already scheduled note.
    pub fn retime(at: DateTime<Utc>) -> Self {
        Self {
            expected: NoteStatus::Scheduled,
            next: NoteStatus::Scheduled,
            scheduled_for: Some(at),
            sent_at: None,
        }
    }

    /// `scheduled -> draft | queued`. Clears `scheduled_for`.
    pub fn unschedule(to: NoteStatus) -> Result<Self> {
        NoteStatus::Scheduled.check_transition(to)?;
        if to == NoteStatus::Sent {
            return Err(NoteError::InvalidTransition {
                from: NoteStatus::Scheduled,
                to,
            });
        }
        Ok(Self {
            expected: NoteStatus::Scheduled,
            next: to,
            scheduled_for: None,
            sent_at: None,
        })
    }

    /// `scheduled -> sent`.
    pub fn publish(at: DateTime<Utc>) -> Self {
        Self {
            expected: NoteStatus::Scheduled,
            next: NoteStatus::Sent,
            scheduled_for: None,
            sent_at: Some(at),
        }
    }
}
