//! Replica scale-out against the cluster's custom resource.
//!
//! Reads the cluster object, bumps the replica field addressed by a JSON
//! pointer, and writes the whole object back. The write carries the
//! `resourceVersion` that was read, so a concurrent edit fails the update
//! rather than being silently overwritten.

use std::time::Duration;

use http::Method;
use serde_json::Value;
use tracing::info;

use tidescale_core::config::{KubeSection, duration_field};
use tidescale_core::{CollabResult, CollaboratorError, ConfigError};

use crate::transport::HttpClient;

/// Scales a cluster custom resource through the cluster API.
#[derive(Debug, Clone)]
pub struct KubeScaler {
    http: HttpClient,
    group: String,
    version: String,
    plural: String,
    replicas_pointer: String,
}

impl KubeScaler {
    pub fn new(
        address: impl Into<String>,
        timeout: Duration,
        group: impl Into<String>,
        version: impl Into<String>,
        plural: impl Into<String>,
        replicas_pointer: impl Into<String>,
    ) -> Self {
        Self {
            http: HttpClient::new(address, timeout),
            group: group.into(),
            version: version.into(),
            plural: plural.into(),
            replicas_pointer: replicas_pointer.into(),
        }
    }

    /// Build from the `[kube]` config section.
    pub fn from_section(section: &KubeSection) -> Result<Self, ConfigError> {
        let timeout = duration_field("kube.timeout", &section.timeout)?;
        Ok(Self::new(
            section.address.clone(),
            timeout,
            section.group.clone(),
            section.version.clone(),
            section.plural.clone(),
            section.replicas_pointer.clone(),
        ))
    }

    fn object_path(&self, namespace: &str, name: &str) -> String {
        format!(
            "/apis/{}/{}/namespaces/{namespace}/{}/{name}",
            self.group, self.version, self.plural
        )
    }

    /// Add `increment` replicas and return the new replica count.
    pub async fn scale_out(&self, namespace: &str, name: &str, increment: u32) -> CollabResult<u64> {
        let path = self.object_path(namespace, name);
        let mut object: Value = self.http.get_json(&path).await?;

        let slot = object
            .pointer_mut(&self.replicas_pointer)
            .ok_or_else(|| {
                CollaboratorError::Decode(format!("{path}: no field at {}", self.replicas_pointer))
            })?;
        let current = slot.as_u64().ok_or_else(|| {
            CollaboratorError::Decode(format!(
                "{path}: {} is not a replica count",
                self.replicas_pointer
            ))
        })?;
        let desired = current + u64::from(increment);
        *slot = Value::from(desired);

        let _: Value = self.http.send_json(Method::PUT, &path, &object).await?;
        info!(%namespace, %name, from = current, to = desired, "cluster replicas updated");
        Ok(desired)
    }
}
