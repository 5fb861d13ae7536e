//! Prometheus text exposition format.
//!
//! Renders the engine status snapshot for scraping by a Prometheus server
//! or compatible agent.

use tidescale_core::{EngineState, EngineStatus};

/// Render an engine status snapshot into Prometheus text format.
///
/// Every sample carries a `variant` label.
pub fn render_prometheus(status: &EngineStatus) -> String {
    let mut out = String::new();
    let variant = status.variant.as_str();

    gauge(
        &mut out,
        "tidescale_replicas",
        "Current storage replica count.",
        variant,
        status.replicas as f64,
    );
    gauge(
        &mut out,
        "tidescale_bandwidth_ceiling_mbps",
        "Per-node read/write bandwidth ceiling in MB/s.",
        variant,
        status.ceiling_mbps,
    );
    gauge(
        &mut out,
        "tidescale_frozen",
        "1 while cooling down after a scale-out.",
        variant,
        if status.state == EngineState::Frozen { 1.0 } else { 0.0 },
    );
    if let Some(up) = status.smoothed_up {
        gauge(
            &mut out,
            "tidescale_smoothed_demand_up_mbps",
            "Mean peak demand over the scale-up window.",
            variant,
            up,
        );
    }
    if let Some(down) = status.smoothed_down {
        gauge(
            &mut out,
            "tidescale_smoothed_demand_down_mbps",
            "Mean peak demand over the scale-down window.",
            variant,
            down,
        );
    }
    gauge(
        &mut out,
        "tidescale_active_streak",
        "Consecutive ticks above the scale-out bound.",
        variant,
        status.active_streak as f64,
    );
    gauge(
        &mut out,
        "tidescale_frozen_streak",
        "Consecutive cooldown ticks at or below the low bound.",
        variant,
        status.frozen_streak as f64,
    );
    gauge(
        &mut out,
        "tidescale_resource_allocation_mbps",
        "Ceiling times replicas.",
        variant,
        status.ledger.allocation_mb,
    );

    out.push_str("# HELP tidescale_resource_time_gb Accumulated allocation over time in GB.\n");
    out.push_str("# TYPE tidescale_resource_time_gb counter\n");
    out.push_str(&format!(
        "tidescale_resource_time_gb{{variant=\"{variant}\"}} {}\n",
        status.ledger.resource_time_gb()
    ));

    out.push_str("# HELP tidescale_ticks_total Decision ticks evaluated.\n");
    out.push_str("# TYPE tidescale_ticks_total counter\n");
    out.push_str(&format!(
        "tidescale_ticks_total{{variant=\"{variant}\"}} {}\n",
        status.ticks
    ));

    out
}

fn gauge(out: &mut String, name: &str, help: &str, variant: &str, value: f64) {
    out.push_str(&format!("# HELP {name} {help}\n"));
    out.push_str(&format!("# TYPE {name} gauge\n"));
    out.push_str(&format!("{name}{{variant=\"{variant}\"}} {value:.2}\n"));
}
