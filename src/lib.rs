//! Pixelize - asynchronous pixel-art conversion
//!
//! Job scheduling, worker pool and execution planning around the
//! `pixel-engine` resize and dithering primitives.
//! This library exposes modules for integration testing.

pub mod error;
pub mod models;
pub mod services;
