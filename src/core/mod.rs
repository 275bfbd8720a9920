//! # Core Module
//!
//! Concurrency primitives shared by the render thread and the worker pools.
//!
//! ## Key Components
//! - `MtResource`: Thread-safe reference-counted resource with read-write locking and
//!   snapshot reads, used for every resident voxel grid.

pub mod mt_resource;

pub use mt_resource::MtResource;
