//! Mirror synchronization engine: resolve configured sources, diff them
//! against the mirror root, clone or fetch bare mirrors and write the
//! metadata cgit expects.

pub mod cancel;
pub mod checkout;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod git_cli;
pub mod git_mirror;
pub mod inspector;
pub mod lockfile;
pub mod metadata;
pub mod model;
pub mod paths;
pub mod plan;
pub mod provider;
pub mod resolver;
pub mod schedule;
pub mod transfer;

#[cfg(test)]
pub(crate) mod test_support;
