//! HTTP handlers, grouped by resource.

pub mod diagnostic;
pub mod gate;
pub mod municipality;
pub mod session;
