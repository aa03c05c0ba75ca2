//! URLs of the REST and push endpoints, all derived from one base URL.

use url::Url;
use verdant_core::Id;

use crate::error::{Result, SyncError};
use crate::ProjectId;

/// Query parameter that carries the project id in a shared link.
pub const PROJECT_QUERY_KEY: &str = "project";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    /// `base_url` must be `http` or `https`; a path prefix is allowed.
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base = Url::parse(base_url).map_err(|e| SyncError::invalid_url(base_url, e))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(SyncError::invalid_url(base_url, "scheme must be http or https"));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.set_query(None);
        base.set_fragment(None);
        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn graph(&self, project: ProjectId) -> Url {
        self.at(&format!("projects/{project}/graph"))
    }

    /// Push channel URL; `ws` for an `http` base, `wss` for `https`.
    pub fn socket(&self, project: ProjectId) -> Url {
        let mut url = self.at(&format!("socket/projects/{project}"));
        let scheme = if self.base.scheme() == "https" { "wss" } else { "ws" };
        // Switching between special schemes cannot fail.
        let _ = url.set_scheme(scheme);
        url
    }

    pub fn nodes(&self) -> Url {
        self.at("nodes/")
    }

    pub fn node(&self, id: Id) -> Url {
        self.at(&format!("nodes/{id}"))
    }

    pub fn materials(&self) -> Url {
        self.at("materials/")
    }

    pub fn material(&self, id: Id) -> Url {
        self.at(&format!("materials/{id}"))
    }

    pub fn relations(&self) -> Url {
        self.at("relations/")
    }

    pub fn relation(&self, id: Id) -> Url {
        self.at(&format!("relations/{id}"))
    }

    fn at(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        url.set_path(&format!("{}{path}", self.base.path()));
        url
    }
}

/// Read the project id from the `project` query parameter of a link.
pub fn project_from_link(link: &str) -> Result<ProjectId> {
    let url = Url::parse(link).map_err(|e| SyncError::invalid_url(link, e))?;
    let (_, value) = url
        .query_pairs()
        .find(|(key, _)| *key == PROJECT_QUERY_KEY)
        .ok_or_else(|| SyncError::invalid_url(link, "no `project` query parameter"))?;
    value
        .trim()
        .parse()
        .map_err(|_| SyncError::invalid_url(link, format!("`{value}` is not a project id")))
}
