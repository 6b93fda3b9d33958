//! Object lifecycle: id allocation, validated storage, retention tracking
//! and background eviction.

pub mod clock;
pub mod id_generator;
pub mod image_service;
pub mod object_store;
pub mod retention_index;
pub mod sweeper;
