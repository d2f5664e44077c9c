//! Online bid-price optimization.
//!
//! - **space**: per-context bucket ensembles and their winning curves
//! - **calibration**: pluggable learners and the periodic recalibrator
//! - **ledger**: per-request attempt/impression bookkeeping
//! - **background**: scheduled recalibration and ledger sweeping
//! - **infra**: logging and the HTTP surface
//! - **simulation**: synthetic auction for offline experiments
//!
//! [`PricingService`] ties them together: `optimize` answers bids from the
//! ledger alone, `feedback` feeds observed outcomes into the space of the
//! originating context, and `curve_snapshot` reports the learned curves.

pub mod background;
pub mod calibration;
pub mod config;
pub mod infra;
pub mod ledger;
pub mod simulation;
pub mod space;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{ConfigError, Error, Result};
use config::{load_contexts, ContextSpec, OptimizerConfig, ServiceConfig, SpaceConfig};
use infra::logging::targets;
use ledger::{RequestLedger, RoutingMetadata};
use space::{CurveSnapshot, PricingSpace};

/// Minimum number of levels per space
pub const MIN_LEVEL_COUNT: usize = 1;
/// Minimum number of buckets per level
pub const MIN_BUCKET_COUNT: usize = 5;
/// Minimum outcome window per bucket
pub const MIN_WINDOW_CAPACITY: usize = 10;

/// Outcome class of an optimize call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizeStatus {
    /// Still gathering feedback for this request id
    Explored,
    /// Past exploration with at least one impression recorded
    Optimized,
    /// Request rejected (price below floor)
    Error,
}

/// Result of [`PricingService::optimize`].
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct OptimizeResponse {
    pub optimized_price: f64,
    pub status: OptimizeStatus,
}

impl OptimizeResponse {
    fn rejected() -> Self {
        Self {
            optimized_price: 0.0,
            status: OptimizeStatus::Error,
        }
    }
}

/// Bid pricing front end over a fixed set of pricing spaces.
#[derive(Debug)]
pub struct PricingService {
    /// Built once, never mutated afterwards
    spaces: HashMap<String, Arc<PricingSpace>>,
    ledger: RequestLedger,
    config: OptimizerConfig,
}

impl PricingService {
    /// Wrap prebuilt spaces. Context ids must be unique.
    pub fn new(spaces: Vec<PricingSpace>, config: OptimizerConfig) -> Result<Self> {
        config.validate()?;
        let mut map = HashMap::with_capacity(spaces.len());
        for space in spaces {
            let id = space.context_id().to_string();
            if map.insert(id.clone(), Arc::new(space)).is_some() {
                return Err(ConfigError::DuplicateContext(id).into());
            }
        }
        Ok(Self {
            spaces: map,
            ledger: RequestLedger::new(),
            config,
        })
    }

    /// Build one space per context with the given random source.
    pub fn from_contexts<R: Rng + ?Sized>(
        rng: &mut R,
        contexts: &[ContextSpec],
        space_config: &SpaceConfig,
        config: OptimizerConfig,
    ) -> Result<Self> {
        let spaces = contexts
            .iter()
            .map(|c| {
                PricingSpace::build(
                    &mut *rng,
                    c.context_id.clone(),
                    c.min_price,
                    c.max_price,
                    space_config,
                )
            })
            .collect::<std::result::Result<Vec<_>, ConfigError>>()?;
        Self::new(spaces, config)
    }

    /// Validate `config`, load its contexts and build every space.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        config.validate()?;
        let contexts = load_contexts(&config.contexts)?;
        let service = Self::from_contexts(
            &mut StdRng::from_entropy(),
            &contexts,
            &config.space,
            config.optimizer.clone(),
        )?;
        info!(
            target: targets::SERVICE,
            contexts = service.spaces.len(),
            levels = config.space.level_count,
            buckets = config.space.bucket_count,
            "Pricing spaces built"
        );
        Ok(service)
    }

    /// Price one bid request.
    ///
    /// The answer depends only on the request and its ledger entry:
    /// `max(price * shrink_factor, floor_price)`, reported as explored until
    /// the id has been seen more than `exploration_rounds` times and received
    /// feedback at least once.
    pub fn optimize(
        &self,
        request_id: &str,
        context_id: &str,
        price: f64,
        floor_price: f64,
        metadata: &RoutingMetadata,
    ) -> Result<OptimizeResponse> {
        if !self.spaces.contains_key(context_id) {
            return Err(Error::UnknownContext(context_id.to_string()));
        }

        if price < floor_price {
            debug!(
                target: targets::SERVICE,
                request_id, price, floor_price, "Price below floor"
            );
            return Ok(OptimizeResponse::rejected());
        }

        let (attempts, impressions) = self.ledger.record_attempt(
            request_id,
            context_id,
            price,
            floor_price,
            metadata,
            Instant::now(),
        );

        let optimized_price = (price * self.config.shrink_factor).max(floor_price);
        let status = if attempts <= self.config.exploration_rounds || impressions == 0 {
            OptimizeStatus::Explored
        } else {
            OptimizeStatus::Optimized
        };

        debug!(
            target: targets::SERVICE,
            request_id,
            context = context_id,
            price,
            floor_price,
            optimized_price,
            ?status,
            attempts,
            data_center = %metadata.data_center,
            "Optimize"
        );

        Ok(OptimizeResponse {
            optimized_price,
            status,
        })
    }

    /// Record the outcome of a previously optimized request.
    ///
    /// `Ok(false)` for unknown ids, and then nothing is mutated. Fails with
    /// [`Error::SpaceBusy`] when the context's space stays locked past the bid
    /// timeout, in which case the ledger is left untouched. The ledger entry
    /// stays locked while the space is updated, so the sweeper cannot evict
    /// it in between.
    pub fn feedback(&self, request_id: &str, price: f64, impression: bool) -> Result<bool> {
        let recorded = self
            .ledger
            .record_feedback(request_id, Instant::now(), |context_id| -> Result<_> {
                let space = self
                    .spaces
                    .get(context_id)
                    .ok_or_else(|| Error::UnknownContext(context_id.to_string()))?;
                let levels =
                    space.try_record_feedback(price, impression, self.config.bid_timeout())?;
                Ok((context_id.to_string(), levels))
            });

        let ((context_id, levels), impressions) = match recorded {
            Ok(Some(recorded)) => recorded,
            Ok(None) => {
                debug!(target: targets::SERVICE, request_id, "Feedback for unknown request");
                return Ok(false);
            }
            Err(e) => {
                warn!(target: targets::SERVICE, request_id, error = %e, "Feedback dropped");
                return Err(e);
            }
        };

        debug!(
            target: targets::SERVICE,
            request_id,
            context = %context_id,
            price,
            impression,
            levels,
            impressions,
            "Feedback"
        );
        Ok(true)
    }

    /// Learned curves of `context_id`; empty for unknown contexts.
    pub fn curve_snapshot(&self, context_id: &str) -> CurveSnapshot {
        self.spaces
            .get(context_id)
            .map(|s| s.curve_snapshot())
            .unwrap_or_default()
    }

    pub fn space(&self, context_id: &str) -> Option<&Arc<PricingSpace>> {
        self.spaces.get(context_id)
    }

    pub fn spaces(&self) -> impl Iterator<Item = &Arc<PricingSpace>> {
        self.spaces.values()
    }

    pub fn context_count(&self) -> usize {
        self.spaces.len()
    }

    pub fn ledger(&self) -> &RequestLedger {
        &self.ledger
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }
}
