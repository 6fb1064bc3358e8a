use crate::error::ListingError;
use crate::model::{OwnerListing, RemoteRepo};
use std::future::Future;
use std::pin::Pin;

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ListingError>> + Send + 'a>>;

/// Remote listing capability used by the resolver.
///
/// Implementations drain pagination and apply their own retry policy before
/// returning.
pub trait RepoLister: Send + Sync {
    fn list_repositories<'a>(&'a self, owner: &'a str) -> ProviderFuture<'a, OwnerListing>;

    /// Metadata for one repository, if the remote knows it.
    fn describe_repository<'a>(
        &'a self,
        _owner: &'a str,
        _name: &'a str,
    ) -> ProviderFuture<'a, Option<RemoteRepo>> {
        Box::pin(async { Ok(None) })
    }
}
