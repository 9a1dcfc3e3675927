//! Data sources: the authoritative backend trait, the synthetic stand-in,
//! and the adapters that normalize both into canonical records.

pub mod adapt;
pub mod synthetic;
pub mod traits;

pub use synthetic::SyntheticSource;
pub use traits::{RealSource, SourceError, SourceQuery};
