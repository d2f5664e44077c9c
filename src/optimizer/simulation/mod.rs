//! Offline simulation against a synthetic auction.
//!
//! ```text
//! request price ─► PricingService::optimize ─► bid ─► SyntheticAuction::step
//!                                                            │
//!        PricingService::feedback(bid, won) ◄────────────────┘
//! ```

mod auction;

pub use auction::{SyntheticAuction, CURVE_REFRESH_STEPS, FEASIBLE_PRICES};

use rand::Rng;
use tracing::info;

use crate::errors::Result;
use crate::optimizer::infra::logging::targets;
use crate::optimizer::ledger::RoutingMetadata;
use crate::optimizer::{OptimizeStatus, PricingService};

/// Totals of one simulation run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimulationSummary {
    pub rounds: usize,
    pub wins: usize,
    pub rejected: usize,
    /// Sum of winning bids
    pub spend: f64,
}

impl SimulationSummary {
    pub fn win_rate(&self) -> f64 {
        if self.rounds == 0 {
            0.0
        } else {
            self.wins as f64 / self.rounds as f64
        }
    }
}

/// Drive `rounds` bid/feedback cycles through `service` for one context.
///
/// Request prices are drawn so that the shrunk bids cover the auction's
/// range; the floor is the bottom of the range.
pub fn simulate<R: Rng + ?Sized>(
    service: &PricingService,
    context_id: &str,
    auction: &mut SyntheticAuction,
    rounds: usize,
    rng: &mut R,
) -> Result<SimulationSummary> {
    let (min_price, max_price) = auction.price_range();
    let top_request = min_price + (max_price - min_price) / service.config().shrink_factor;
    let metadata = RoutingMetadata::default();
    let mut summary = SimulationSummary::default();

    for round in 0..rounds {
        let request_id = format!("sim-{round}");
        let price = rng.gen_range(min_price..=top_request);
        let response = service.optimize(&request_id, context_id, price, min_price, &metadata)?;
        summary.rounds += 1;
        if response.status == OptimizeStatus::Error {
            summary.rejected += 1;
            continue;
        }

        let bid = response.optimized_price;
        let won = auction.step(bid);
        if won {
            summary.wins += 1;
            summary.spend += bid;
        }
        service.feedback(&request_id, bid, won)?;
    }

    info!(
        target: targets::SIMULATION,
        context = context_id,
        rounds = summary.rounds,
        wins = summary.wins,
        win_rate = summary.win_rate(),
        "Simulation finished"
    );
    Ok(summary)
}
