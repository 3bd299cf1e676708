//! Database access for rame-server
//!
//! Schema creation lives in `rame_common::db`; this module holds the
//! repositories the server reads and writes.

pub mod playlists;

pub use playlists::StoredPlaylist;
