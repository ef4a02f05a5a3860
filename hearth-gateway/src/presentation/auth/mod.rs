//! Authentication at the HTTP boundary

pub mod extractors;

pub use extractors::Authenticated;
