use crate::http::send_with_retry;
use crate::models::RepoItem;
use crate::paging::next_page_from_link_header;
use anyhow::Context;
use giternity_core::config::GitHubSettings;
use giternity_core::error::ListingError;
use giternity_core::model::{OwnerListing, RemoteRepo, SourceKind};
use giternity_core::provider::{ProviderFuture, RepoLister};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use tracing::{debug, info};

const PER_PAGE: u32 = 100;
const ACCEPT_HEADER: &str = "application/vnd.github.v3+json";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum OwnerScope {
    Org,
    User,
}

impl OwnerScope {
    fn path_segment(self) -> &'static str {
        match self {
            OwnerScope::Org => "orgs",
            OwnerScope::User => "users",
        }
    }

    fn kind(self) -> SourceKind {
        match self {
            OwnerScope::Org => SourceKind::Organization,
            OwnerScope::User => SourceKind::User,
        }
    }
}

/// Lists repositories through the GitHub REST API.
pub struct GitHubLister {
    client: Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubLister {
    pub fn new(settings: &GitHubSettings) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HEADER));
        let client = Client::builder()
            .user_agent(user_agent())
            .default_headers(headers)
            .build()
            .context("build GitHub client")?;
        Ok(Self {
            client,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.get(url);
        match self.token.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Drains every page of one scope. `Ok(None)` when the scope answers 404.
    async fn list_scope(
        &self,
        owner: &str,
        scope: OwnerScope,
    ) -> Result<Option<Vec<RemoteRepo>>, ListingError> {
        let mut page = 1;
        let mut repos = Vec::new();
        loop {
            let url = repos_url(&self.api_url, scope, owner, page);
            let response = send_with_retry(
                || Ok(self.get(&url)),
                &[StatusCode::NOT_FOUND],
            )
            .await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let next_page = next_page_from_link_header(response.headers());
            let payload: Vec<RepoItem> = response
                .json()
                .await
                .context("decode GitHub repos response")?;
            debug!(owner = %owner, page, count = payload.len(), "fetched repos page");
            repos.extend(payload.into_iter().map(|item| item.into_remote(owner)));
            match next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }
        Ok(Some(repos))
    }
}

impl RepoLister for GitHubLister {
    fn list_repositories<'a>(&'a self, owner: &'a str) -> ProviderFuture<'a, OwnerListing> {
        Box::pin(async move {
            for scope in [OwnerScope::Org, OwnerScope::User] {
                if let Some(repos) = self.list_scope(owner, scope).await? {
                    info!(owner = %owner, scope = scope.path_segment(), repos = repos.len(), "listed GitHub repositories");
                    return Ok(OwnerListing {
                        kind: scope.kind(),
                        repos,
                    });
                }
                debug!(owner = %owner, scope = scope.path_segment(), "owner not found in scope");
            }
            Err(ListingError::NotFound(owner.to_string()))
        })
    }

    fn describe_repository<'a>(
        &'a self,
        owner: &'a str,
        name: &'a str,
    ) -> ProviderFuture<'a, Option<RemoteRepo>> {
        Box::pin(async move {
            let url = format!("{}/repos/{owner}/{name}", self.api_url);
            let response = send_with_retry(|| Ok(self.get(&url)), &[StatusCode::NOT_FOUND]).await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let item: RepoItem = response
                .json()
                .await
                .context("decode GitHub repo response")?;
            Ok(Some(item.into_remote(owner)))
        })
    }
}

fn repos_url(api_url: &str, scope: OwnerScope, owner: &str, page: u32) -> String {
    format!(
        "{api_url}/{}/{owner}/repos?per_page={PER_PAGE}&page={page}",
        scope.path_segment()
    )
}

fn user_agent() -> String {
    format!("giternity ({})", env!("CARGO_PKG_VERSION"))
}
