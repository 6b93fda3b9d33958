//! Core data models for the ephemeral image store.
//!
//! The only persisted entity is the stored file itself; its identifier
//! doubles as the file name and carries the creation time.

pub mod object_id;
