//! Application services: the store seam, resolution and dispatch.

pub mod error;
pub mod query;
pub mod repos;
pub mod resolver;
pub mod router;
