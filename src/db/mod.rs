//! Persistence layer (roster membership).

pub mod roster_store;

pub use roster_store::{FileRosterStore, MemoryRosterStore, RosterRecord, RosterStore};
