//! Merge module - ownership-aware apply and update of live objects.
//!
//! This module tracks which field manager owns which field and detects
//! conflicting writes between managers.

mod conflict;
mod updater;


pub use conflict::*;
pub use updater::*;
