use giternity_core::model::RemoteRepo;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct RepoItem {
    pub(crate) name: String,
    pub(crate) clone_url: String,
    pub(crate) description: Option<String>,
    pub(crate) homepage: Option<String>,
    #[serde(default)]
    pub(crate) fork: bool,
    pub(crate) owner: Option<RepoOwner>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RepoOwner {
    pub(crate) login: String,
}

impl RepoItem {
    /// `requested_owner` is used when the payload carries no owner login.
    pub(crate) fn into_remote(self, requested_owner: &str) -> RemoteRepo {
        RemoteRepo {
            owner: self
                .owner
                .map(|owner| owner.login)
                .filter(|login| !login.is_empty())
                .unwrap_or_else(|| requested_owner.to_string()),
            name: self.name,
            clone_url: self.clone_url,
            description: non_empty(self.description),
            homepage: non_empty(self.homepage),
            fork: self.fork,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn repo_item_maps_to_remote_repo() {
        let value = json!({
            "id": 1,
            "name": "widgets",
            "full_name": "Acme/widgets",
            "clone_url": "https://github.com/Acme/widgets.git",
            "description": "Widgets for everyone",
            "homepage": "",
            "fork": true,
            "owner": { "login": "Acme", "type": "Organization" }
        });
        let repo: RepoItem = serde_json::from_value(value).unwrap();
        let remote = repo.into_remote("acme");
        assert_eq!(remote.owner, "Acme");
        assert_eq!(remote.name, "widgets");
        assert_eq!(remote.description.as_deref(), Some("Widgets for everyone"));
        assert_eq!(remote.homepage, None);
        assert!(remote.fork);
    }

    #[test]
    fn missing_optional_fields_default() {
        let value = json!({
            "name": "widgets",
            "clone_url": "https://github.com/acme/widgets.git",
            "description": null
        });
        let repo: RepoItem = serde_json::from_value(value).unwrap();
        let remote = repo.into_remote("acme");
        assert_eq!(remote.owner, "acme");
        assert!(!remote.fork);
        assert!(remote.description.is_none());
    }
}
