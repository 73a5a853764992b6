//! Transactional units of work shared by the handlers.
//!
//! Helpers take `&mut Transaction` and never begin or commit on their own.

pub mod clearance;
pub mod display_ids;
pub mod occupancy;
