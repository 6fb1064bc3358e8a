//! Remote listing clients for giternity.

pub mod github;
mod http;
mod models;
mod paging;

pub use github::GitHubLister;
