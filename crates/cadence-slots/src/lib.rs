//! `cadence-slots`: per-owner weekly publishing slots.
//!
//! A slot is a 12-hour clock time plus the weekdays it applies to. Slots
//! only ever *suggest* the next publishing time ([`next_occurrence`]); the
//! suggestion is scheduled as an ordinary one-shot trigger, never as a
//! recurring rule.

pub mod db;
pub mod error;
pub mod memory;
pub mod projection;
pub mod store;
pub mod types;

pub use error::{Result, SlotError};
pub use memory::MemorySlotStore;
pub use projection::next_occurrence;
pub use store::{SlotStore, SqliteSlotStore, DEFAULT_SLOTS};
pub use types::{Meridiem, RecurringSlot, SlotInput, WeeklyPattern};
