//! # Rame Common Library
//!
//! Shared code for the Rame media backend:
//! - List and item data model
//! - Event types (ListEvent enum) and the EventBus
//! - Configuration loading
//! - Stable identifier derivation
//! - Database schema initialization

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod ids;
pub mod model;
pub mod time;

pub use error::{Error, Result};
pub use model::{Item, ItemKind, ItemSpec, List, ListKind, ProbeState};
