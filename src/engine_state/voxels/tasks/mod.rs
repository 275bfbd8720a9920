//! # Voxel Task System
//!
//! Tasks run on the loader's generation pool. Each one owns its chunk position
//! and an `Arc` of the loader state it publishes into.

pub mod chunk_generation_task;
