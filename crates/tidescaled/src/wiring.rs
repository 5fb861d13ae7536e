//! Builds collaborator clients from configuration.

use std::sync::Arc;
use std::time::Duration;

use tidescale_autoscale::{CapacityPlanner, CapacityPolicy, Collaborators};
use tidescale_coordinator::{
    CoordinatorClient, KubeScaler, PlacementClient, PrometheusClient, ScaleController,
};
use tidescale_core::config::duration_field;
use tidescale_core::{ClusterTarget, ConfigError, TidescaleConfig};

pub fn coordinator_client(config: &TidescaleConfig) -> Result<CoordinatorClient, ConfigError> {
    let timeout = duration_field("coordinator.timeout", &config.coordinator.timeout)?;
    Ok(CoordinatorClient::new(config.coordinator.address.clone(), timeout))
}

pub fn scale_controller(config: &TidescaleConfig) -> Result<ScaleController, ConfigError> {
    let kube = KubeScaler::from_section(&config.kube)?;
    Ok(ScaleController::new(kube, coordinator_client(config)?))
}

/// Metrics, placement and control clients for the engine.
pub fn collaborators(config: &TidescaleConfig) -> Result<Collaborators, ConfigError> {
    let placement_timeout = duration_field("placement.timeout", &config.placement.timeout)?;
    Ok(Collaborators {
        metrics: Arc::new(coordinator_client(config)?),
        shards: Arc::new(PlacementClient::new(
            config.placement.address.clone(),
            placement_timeout,
        )),
        controller: Arc::new(scale_controller(config)?),
    })
}

pub fn cluster_target(config: &TidescaleConfig) -> ClusterTarget {
    ClusterTarget {
        namespace: config.cluster.namespace.clone(),
        cluster_name: config.cluster.name.clone(),
        selector_key: config.cluster.selector_key.clone(),
        selector_value: config.cluster.selector_value.clone(),
    }
}

/// The capacity planner and its check interval.
pub fn capacity_planner(
    config: &TidescaleConfig,
) -> Result<(CapacityPlanner, Duration), ConfigError> {
    let section = &config.capacity;
    let interval = duration_field("capacity.interval", &section.interval)?;
    if interval.is_zero() {
        return Err(ConfigError::Invalid {
            field: "capacity.interval",
            reason: "must be positive".to_string(),
        });
    }
    let timeout = duration_field("capacity.timeout", &section.timeout)?;
    let sizes = PrometheusClient::new(section.prometheus.clone(), timeout, section.query.clone());
    let planner = CapacityPlanner::new(
        Arc::new(sizes),
        Arc::new(scale_controller(config)?),
        cluster_target(config),
        CapacityPolicy::from(section),
    );
    Ok((planner, interval))
}
