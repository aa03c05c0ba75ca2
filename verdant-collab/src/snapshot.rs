//! One-shot fetch of a project's full graph.

use std::collections::HashSet;

use verdant_core::layout;
use verdant_core::GraphState;

use crate::endpoint::Endpoints;
use crate::error::{Result, SyncError};
use crate::ProjectId;

/// Reads `GET /projects/{id}/graph`. Never retries; that is the caller's call.
#[derive(Debug, Clone)]
pub struct SnapshotLoader {
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl SnapshotLoader {
    pub fn new(http: reqwest::Client, endpoints: Endpoints) -> Self {
        Self { http, endpoints }
    }

    /// Fetch and [`decorate`] the snapshot. Any transport error, non-2xx
    /// status or undecodable body is [`SyncError::LoadFailed`].
    pub async fn load(&self, project: ProjectId) -> Result<GraphState> {
        let fail = |reason: String| SyncError::LoadFailed { project, reason };
        let url = self.endpoints.graph(project);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("server returned {status}")));
        }
        let mut snapshot: GraphState = response
            .json()
            .await
            .map_err(|e| fail(format!("malformed body: {e}")))?;

        decorate(&mut snapshot);
        log::info!(
            "loaded project {project}: {} nodes, {} edges, {} materials",
            snapshot.nodes.len(),
            snapshot.edges.len(),
            snapshot.materials.len()
        );
        Ok(snapshot)
    }
}

/// Make a raw snapshot safe to seed a session with: one entry per id in each
/// collection (first wins), no weight on non-atomic nodes, and a
/// deterministic position on every node.
pub fn decorate(snapshot: &mut GraphState) {
    let before = (snapshot.nodes.len(), snapshot.edges.len(), snapshot.materials.len());

    let mut seen = HashSet::new();
    snapshot.nodes.retain(|n| seen.insert(n.id));
    seen.clear();
    snapshot.edges.retain(|e| seen.insert(e.id));
    seen.clear();
    snapshot.materials.retain(|m| seen.insert(m.id));

    let after = (snapshot.nodes.len(), snapshot.edges.len(), snapshot.materials.len());
    if before != after {
        log::warn!("snapshot carried duplicate ids: {before:?} entries reduced to {after:?}");
    }

    for node in &mut snapshot.nodes {
        node.normalize();
    }
    layout::assign_positions(&mut snapshot.nodes);
}
