mod error;
mod traits;

pub mod filesystem;
pub mod naming;

pub use error::StorageError;
pub use filesystem::LocalMover;
pub use naming::{NamingRules, RuleNamer, SourceNamer};
pub use traits::{BoxReader, ByteMover};
