//! `cadence-notes`: publishable notes, their status state machine and the
//! activity streak derived from them.
//!
//! # Status transitions
//!
//! | From                             | To               | Trigger                  |
//! |----------------------------------|------------------|--------------------------|
//! | `draft`, `inspiration`, `queued` | `scheduled`      | schedule created         |
//! | `scheduled`                      | `draft`, `queued`| schedule cancelled       |
//! | `scheduled`                      | `sent`           | publish webhook          |
//!
//! Everything else is rejected with [`NoteError::InvalidTransition`].

pub mod db;
pub mod error;
pub mod memory;
pub mod store;
pub mod streak;
pub mod types;

pub use error::{NoteError, Result};
pub use memory::MemoryNoteStore;
pub use store::{NoteStore, SqliteNoteStore};
pub use streak::{streak, StreakSample};
pub use types::{Note, NoteStatus, StatusChange};
