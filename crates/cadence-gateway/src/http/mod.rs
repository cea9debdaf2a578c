pub mod extension;
pub mod health;
pub mod keys;
pub mod notes;
pub mod schedules;
pub mod slots;
pub mod streak;
pub mod webhooks;
