//! Matcher Service
//!
//! The matching core of the exchange node. One single-writer actor per
//! asset pair owns that pair's book; a supervisor routes requests and
//! spawns actors on demand. Placements run through the validator
//! (signature, expiry, fee floor, balance with reservations, script
//! policy), then the book's price-time matching loop; every fill emits a
//! signed exchange transaction into the UTX pool and a history update.
//!
//! **Key Invariants:**
//! - Price-time priority strictly enforced per pair
//! - Best bid strictly below best ask after every event
//! - Deterministic integer arithmetic end to end
//! - Recovery from snapshot + journal reproduces the pre-crash state

pub mod actor;
pub mod book;
pub mod matching;
pub mod script;
pub mod settings;
pub mod supervisor;
pub mod tx;
pub mod validation;

pub use actor::{PairRequest, PairResponse};
pub use supervisor::Matcher;
