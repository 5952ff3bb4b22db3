//! sqlstep Core - Migration model for numbered SQL migrations
//!
//! This crate discovers `<number>[-<description>].<up|down>.sql` entries,
//! validates them into a [`MigrationSet`] and plans the steps between two
//! schema versions. Executing those steps lives in `sqlstep-storage`.

pub mod error;
pub mod loader;
pub mod migration;
pub mod plan;
pub mod source;

pub use error::{Error, Result};
pub use loader::{load, MigrationSet};
pub use migration::{Direction, MigrationFile, Target};
pub use plan::{Plan, Step};
pub use source::{DirectorySource, EmbeddedSource, MigrationSource};
