//! Shared utility modules used across Quiver components.

pub mod bytes;
pub mod varint;
