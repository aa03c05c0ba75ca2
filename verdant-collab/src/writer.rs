//! REST writes behind local edits.
//!
//! Each successful write returns the confirmed entity, which the session
//! then feeds through the same applier as pushed operations. A failed write
//! is reported to the caller and changes nothing else.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use verdant_core::{wire, Component, ConnectionType, Edge, Id, Material};

use crate::endpoint::Endpoints;
use crate::error::{Result, SyncError};
use crate::ProjectId;

/// A component to create. The project id is supplied by the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeDraft {
    pub name: String,
    pub material_id: Id,
    pub level: u32,
    pub parent_id: Option<Id>,
    pub atomic: bool,
    /// Required for atomic components, never sent otherwise.
    #[serde(skip_serializing)]
    pub weight: Option<f64>,
    pub reusable: bool,
    pub recyclable: bool,
    pub connection_type: Option<ConnectionType>,
}

impl NodeDraft {
    /// A non-atomic root component.
    pub fn new(name: impl Into<String>, material_id: Id) -> Self {
        Self {
            name: name.into(),
            material_id,
            level: 0,
            parent_id: None,
            atomic: false,
            weight: None,
            reusable: false,
            recyclable: false,
            connection_type: None,
        }
    }

    pub fn child_of(mut self, parent_id: Id, level: u32) -> Self {
        self.parent_id = Some(parent_id);
        self.level = level;
        self
    }

    pub fn atomic(mut self, weight: f64) -> Self {
        self.atomic = true;
        self.weight = Some(weight);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SyncError::InvalidDraft("component name is empty".into()));
        }
        match (self.level, self.parent_id) {
            (0, Some(_)) => {
                return Err(SyncError::InvalidDraft("level 0 nodes cannot have a parent".into()))
            }
            (level, None) if level > 0 => {
                return Err(SyncError::InvalidDraft("non-root nodes must define parent_id".into()))
            }
            _ => {}
        }
        if self.atomic {
            match self.weight {
                Some(w) if w > 0.0 => {}
                _ => {
                    return Err(SyncError::InvalidDraft(
                        "atomic nodes need a positive weight".into(),
                    ))
                }
            }
        }
        Ok(())
    }

    /// The wire body; non-atomic drafts never send a weight.
    fn body(&self, project_id: ProjectId) -> NodeBody<'_> {
        NodeBody {
            project_id,
            weight: if self.atomic { self.weight } else { None },
            draft: self,
        }
    }
}

#[derive(Serialize)]
struct NodeBody<'a> {
    project_id: ProjectId,
    weight: Option<f64>,
    #[serde(flatten)]
    draft: &'a NodeDraft,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialDraft {
    pub name: String,
    pub weight: f64,
    pub co2_value: f64,
    pub hardness: f64,
}

impl MaterialDraft {
    pub fn new(name: impl Into<String>, weight: f64, co2_value: f64, hardness: f64) -> Self {
        Self {
            name: name.into(),
            weight,
            co2_value,
            hardness,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SyncError::InvalidDraft("material name is empty".into()));
        }
        for (field, value) in [
            ("weight", self.weight),
            ("co2_value", self.co2_value),
            ("hardness", self.hardness),
        ] {
            if value.is_nan() || value <= 0.0 {
                return Err(SyncError::InvalidDraft(format!(
                    "material {field} must be positive, got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelationDraft {
    pub source_id: Id,
    pub target_id: Id,
}

impl RelationDraft {
    pub fn new(source_id: Id, target_id: Id) -> Self {
        Self { source_id, target_id }
    }
}

#[derive(Serialize)]
struct RelationBody {
    project_id: ProjectId,
    #[serde(flatten)]
    draft: RelationDraft,
}

/// Relation as the server returns it.
#[derive(Debug, Deserialize)]
struct RelationRecord {
    #[serde(deserialize_with = "wire::id")]
    id: Id,
    #[serde(deserialize_with = "wire::id")]
    source_id: Id,
    #[serde(deserialize_with = "wire::id")]
    target_id: Id,
}

impl From<RelationRecord> for Edge {
    fn from(r: RelationRecord) -> Self {
        Edge::new(r.id, r.source_id, r.target_id)
    }
}

#[derive(Debug, Clone)]
pub struct WriteClient {
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl WriteClient {
    pub fn new(http: reqwest::Client, endpoints: Endpoints) -> Self {
        Self { http, endpoints }
    }

    /// `POST /nodes/`
    pub async fn create_node(&self, project: ProjectId, draft: &NodeDraft) -> Result<Component> {
        draft.validate()?;
        let request = self.http.post(self.endpoints.nodes()).json(&draft.body(project));
        self.send_json("create node", request).await
    }

    /// `POST /materials/`
    pub async fn create_material(&self, draft: &MaterialDraft) -> Result<Material> {
        draft.validate()?;
        let request = self.http.post(self.endpoints.materials()).json(draft);
        self.send_json("create material", request).await
    }

    /// `POST /relations/`
    pub async fn create_relation(&self, project: ProjectId, draft: RelationDraft) -> Result<Edge> {
        let body = RelationBody {
            project_id: project,
            draft,
        };
        let request = self.http.post(self.endpoints.relations()).json(&body);
        let record: RelationRecord = self.send_json("create relation", request).await?;
        Ok(record.into())
    }

    /// `DELETE /nodes/{id}`
    pub async fn delete_node(&self, id: Id) -> Result<()> {
        self.send("delete node", self.http.delete(self.endpoints.node(id)))
            .await
            .map(drop)
    }

    /// `DELETE /materials/{id}`
    pub async fn delete_material(&self, id: Id) -> Result<()> {
        self.send("delete material", self.http.delete(self.endpoints.material(id)))
            .await
            .map(drop)
    }

    /// `DELETE /relations/{id}`
    pub async fn delete_relation(&self, id: Id) -> Result<()> {
        self.send("delete relation", self.http.delete(self.endpoints.relation(id)))
            .await
            .map(drop)
    }

    async fn send(&self, action: &str, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request.send().await.map_err(|e| {
            log::warn!("{action}: {e}");
            SyncError::write(action, e)
        })?;
        let status = response.status();
        if !status.is_success() {
            log::warn!("{action}: server returned {status}");
            return Err(SyncError::write(action, format!("server returned {status}")));
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        action: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        self.send(action, request)
            .await?
            .json()
            .await
            .map_err(|e| SyncError::write(action, format!("malformed response: {e}")))
    }
}
