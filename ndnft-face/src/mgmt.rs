//! GraphQL face management for the NDN-DPDK forwarder.
//!
//! The data-plane face only exists after a control-plane exchange: a POST
//! of a `createFace` mutation to the forwarder's GraphQL endpoint returns
//! the face id and the shared-memory socket path the transport attaches
//! to. The producer additionally inserts a FIB entry for its name prefix.
//! Everything created here is deleted symmetrically on shutdown.

use log::{debug, info, warn};
use serde_json::{json, Value};
use std::time::Duration;

use ndnft_common::{Error, Result};

/// HTTP timeout for management calls.
const MGMT_TIMEOUT: Duration = Duration::from_secs(4);

/// What the transport needs to attach to the forwarder-side face.
#[derive(Debug, Clone)]
pub struct FaceInfo {
    pub face_id: String,
    pub socket_path: String,
}

pub struct MgmtClient {
    gqlserver: String,
    agent: ureq::Agent,
    face_id: Option<String>,
    fib_entry_id: Option<String>,
}

impl MgmtClient {
    pub fn new(gqlserver: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(MGMT_TIMEOUT)
            .build();
        Self {
            gqlserver: gqlserver.into(),
            agent,
            face_id: None,
            fib_entry_id: None,
        }
    }

    /// Create a memif face on the forwarder. `socket_name` is the
    /// shared-memory socket path this endpoint proposes; `dataroom` bounds
    /// the frame size both directions.
    pub fn create_face(&mut self, socket_name: &str, dataroom: usize) -> Result<FaceInfo> {
        let data = self.call(
            "mutation createFace($locator: JSON!) { createFace(locator: $locator) { id } }",
            json!({
                "locator": {
                    "scheme": "memif",
                    "socketName": socket_name,
                    "id": 0,
                    "dataroom": dataroom,
                }
            }),
        )?;

        let face_id = data
            .pointer("/createFace/id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Mgmt("createFace reply without face id".into()))?
            .to_string();

        info!("created face {} on {}", face_id, socket_name);
        self.face_id = Some(face_id.clone());

        Ok(FaceInfo {
            face_id,
            socket_path: socket_name.to_string(),
        })
    }

    /// Advertise `prefix` on the created face so the forwarder routes
    /// matching Interests to it.
    pub fn insert_fib_entry(&mut self, prefix: &str) -> Result<String> {
        let face_id = self
            .face_id
            .clone()
            .ok_or_else(|| Error::Mgmt("no face created yet".into()))?;

        let data = self.call(
            "mutation insertFibEntry($name: Name!, $nexthops: [ID!]!) \
             { insertFibEntry(name: $name, nexthops: $nexthops) { id } }",
            json!({ "name": prefix, "nexthops": [face_id] }),
        )?;

        let entry_id = data
            .pointer("/insertFibEntry/id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Mgmt("insertFibEntry reply without id".into()))?
            .to_string();

        info!("inserted FIB entry {} for {}", entry_id, prefix);
        self.fib_entry_id = Some(entry_id.clone());
        Ok(entry_id)
    }

    /// Delete the FIB entry and the face, in that order. Safe to call when
    /// nothing was created.
    pub fn delete(&mut self) -> Result<()> {
        if let Some(id) = self.fib_entry_id.take() {
            self.delete_id(&id)?;
        }
        if let Some(id) = self.face_id.take() {
            self.delete_id(&id)?;
        }
        Ok(())
    }

    fn delete_id(&self, id: &str) -> Result<()> {
        let data = self.call(
            "mutation delete($id: ID!) { delete(id: $id) }",
            json!({ "id": id }),
        )?;
        match data.pointer("/delete").and_then(Value::as_bool) {
            Some(true) => {
                debug!("deleted {}", id);
                Ok(())
            }
            _ => Err(Error::Mgmt(format!("forwarder refused to delete {}", id))),
        }
    }

    fn call(&self, query: &str, variables: Value) -> Result<Value> {
        let response: Value = self
            .agent
            .post(&self.gqlserver)
            .set("Content-Type", "application/json")
            .set("Accept", "application/json")
            .send_json(json!({ "query": query, "variables": variables }))
            .map_err(|e| Error::Mgmt(format!("POST {} failed: {}", self.gqlserver, e)))?
            .into_json()
            .map_err(|e| Error::Mgmt(format!("invalid JSON reply: {}", e)))?;

        parse_graphql_response(response)
    }
}

impl Drop for MgmtClient {
    fn drop(&mut self) {
        if self.face_id.is_some() || self.fib_entry_id.is_some() {
            if let Err(e) = self.delete() {
                warn!("face cleanup failed: {}", e);
            }
        }
    }
}

/// Split a GraphQL reply into data or error.
fn parse_graphql_response(response: Value) -> Result<Value> {
    if let Some(errors) = response.get("errors") {
        if errors.as_array().map_or(true, |a| !a.is_empty()) {
            return Err(Error::Mgmt(format!("GraphQL errors: {}", errors)));
        }
    }
    response
        .get("data")
        .cloned()
        .ok_or_else(|| Error::Mgmt("GraphQL reply without data".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_with_data() {
        let data = parse_graphql_response(json!({
            "data": { "createFace": { "id": "7" } }
        }))
        .unwrap();
        assert_eq!(data.pointer("/createFace/id").unwrap(), "7");
    }

    #[test]
    fn response_with_errors() {
        let result = parse_graphql_response(json!({
            "errors": [{ "message": "no such scheme" }]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn response_without_data() {
        assert!(parse_graphql_response(json!({})).is_err());
    }
}
