//! File system helpers shared by the installer and the package builder.

pub mod checksum;
pub mod copy;
pub mod filter;
pub mod walker;

pub use filter::PathFilter;
pub use walker::{FileInfo, WalkOptions};
