//! Turns one metrics snapshot into one aggregate demand figure.
//!
//! Unparsable rates count as zero for their node. A node reporting either
//! rate above the sanity ceiling is dropped from the tick entirely; the
//! remaining nodes are still aggregated.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use tidescale_core::{AggregateDemand, CollaboratorError, MetricsSource, NodeRates, Sample};

/// Why a snapshot could not be reduced to a demand figure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("no nodes reported rates")]
    NoNodes,

    #[error("all {0} reporting nodes exceeded the sanity ceiling")]
    AllDiscarded(usize),
}

/// Failure producing a demand figure for a tick.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("metrics source failed: {0}")]
    Source(#[from] CollaboratorError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

/// Parse a reported rate. Anything that is not a finite, non-negative
/// number contributes zero.
pub fn parse_rate(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => v,
        _ => 0.0,
    }
}

/// Parse every node in a snapshot.
pub fn parse_samples(rates: &NodeRates) -> Vec<Sample> {
    rates
        .iter()
        .map(|(node_id, raw)| Sample {
            node_id: node_id.clone(),
            read_rate: parse_rate(&raw.read),
            write_rate: parse_rate(&raw.write),
        })
        .collect()
}

/// Average read and write rates across the nodes within `sanity_ceiling`.
pub fn aggregate(rates: &NodeRates, sanity_ceiling: f64) -> Result<AggregateDemand, AggregateError> {
    if rates.is_empty() {
        return Err(AggregateError::NoNodes);
    }

    let mut sum_read = 0.0;
    let mut sum_write = 0.0;
    let mut nodes = 0usize;
    let mut discarded = 0usize;

    for sample in parse_samples(rates) {
        if sample.read_rate > sanity_ceiling || sample.write_rate > sanity_ceiling {
            warn!(
                node = %sample.node_id,
                read = sample.read_rate,
                write = sample.write_rate,
                ceiling = sanity_ceiling,
                "discarding outlier reading"
            );
            discarded += 1;
            continue;
        }
        debug!(
            node = %sample.node_id,
            read = sample.read_rate,
            write = sample.write_rate,
            "node rates"
        );
        sum_read += sample.read_rate;
        sum_write += sample.write_rate;
        nodes += 1;
    }

    if nodes == 0 {
        return Err(AggregateError::AllDiscarded(discarded));
    }

    Ok(AggregateDemand {
        avg_read: sum_read / nodes as f64,
        avg_write: sum_write / nodes as f64,
        nodes,
        discarded,
    })
}

/// Pulls a snapshot from the metrics source and aggregates it.
#[derive(Clone)]
pub struct Sampler {
    source: Arc<dyn MetricsSource>,
    sanity_ceiling: f64,
}

impl Sampler {
    pub fn new(source: Arc<dyn MetricsSource>, sanity_ceiling: f64) -> Self {
        Self {
            source,
            sanity_ceiling,
        }
    }

    pub async fn sample(&self) -> Result<AggregateDemand, SampleError> {
        let rates = self.source.node_rates().await?;
        let demand = aggregate(&rates, self.sanity_ceiling)?;
        debug!(
            avg_read = demand.avg_read,
            avg_write = demand.avg_write,
            nodes = demand.nodes,
            discarded = demand.discarded,
            "aggregated demand"
        );
        Ok(demand)
    }
}
