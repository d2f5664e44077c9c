//! Scheduled background work.
//!
//! - one recalibration task per pricing space, so a slow learner on one
//!   context never delays another; each cycle runs on the blocking pool
//! - one ledger sweeper evicting idle request entries
//!
//! All tasks watch a shared stop signal and are awaited by [`BackgroundTasks::shutdown`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::calibration::Recalibrator;
use super::infra::logging::targets;
use super::space::PricingSpace;
use super::PricingService;

/// Timing of the background jobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundSchedule {
    pub recalibration_interval: Duration,
    pub ledger_sweep_interval: Duration,
    pub ledger_retention: Duration,
}

impl Default for BackgroundSchedule {
    fn default() -> Self {
        Self {
            recalibration_interval: Duration::from_secs(60),
            ledger_sweep_interval: Duration::from_secs(60),
            ledger_retention: Duration::from_secs(600),
        }
    }
}

/// Handles to the running background tasks.
#[derive(Debug)]
pub struct BackgroundTasks {
    stop_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    /// Start recalibration for every space of `service` plus the ledger sweeper.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        service: Arc<PricingService>,
        recalibrator: Recalibrator,
        schedule: BackgroundSchedule,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);

        let mut handles: Vec<JoinHandle<()>> = service
            .spaces()
            .map(|space| {
                tokio::spawn(recalibration_loop(
                    Arc::clone(space),
                    recalibrator.clone(),
                    schedule.recalibration_interval,
                    stop_rx.clone(),
                ))
            })
            .collect();

        handles.push(tokio::spawn(ledger_sweep_loop(
            service,
            schedule.ledger_sweep_interval,
            schedule.ledger_retention,
            stop_rx,
        )));

        info!(
            target: targets::BACKGROUND,
            tasks = handles.len(),
            trainer = recalibrator.trainer_name(),
            interval_secs = schedule.recalibration_interval.as_secs(),
            "Background tasks started"
        );

        Self { stop_tx, handles }
    }

    pub fn task_count(&self) -> usize {
        self.handles.len()
    }

    /// Signal every task to stop and wait for them to finish.
    ///
    /// A recalibration cycle already running on the blocking pool completes
    /// before its task exits.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(target: targets::BACKGROUND, error = %e, "Background task failed");
            }
        }
        info!(target: targets::BACKGROUND, "Background tasks stopped");
    }
}

fn new_interval(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn recalibration_loop(
    space: Arc<PricingSpace>,
    recalibrator: Recalibrator,
    period: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut interval = new_interval(period);

    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            _ = interval.tick() => {
                let space = Arc::clone(&space);
                let recalibrator = recalibrator.clone();
                let cycle = tokio::task::spawn_blocking(move || recalibrator.run_cycle(&space));
                match cycle.await {
                    Ok(report) if report.recalibrated() + report.failed() > 0 => {
                        info!(
                            target: targets::BACKGROUND,
                            context = %report.context_id,
                            recalibrated = report.recalibrated(),
                            failed = report.failed(),
                            elapsed_ms = report.elapsed.as_millis() as u64,
                            "Recalibration cycle"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(target: targets::BACKGROUND, error = %e, "Recalibration cycle aborted");
                    }
                }
            }
        }
    }

    debug!(target: targets::BACKGROUND, context = %space.context_id(), "Recalibration task stopped");
}

async fn ledger_sweep_loop(
    service: Arc<PricingService>,
    period: Duration,
    retention: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut interval = new_interval(period);

    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            _ = interval.tick() => {
                service.ledger().evict_idle(Instant::now(), retention);
            }
        }
    }

    debug!(target: targets::BACKGROUND, "Ledger sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::calibration::LearnerKind;
    use crate::optimizer::config::{ContextSpec, OptimizerConfig, SpaceConfig};
    use crate::optimizer::ledger::RoutingMetadata;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn service() -> Arc<PricingService> {
        let contexts = vec![
            ContextSpec {
                context_id: "a".to_string(),
                min_price: 1.0,
                max_price: 2.0,
            },
            ContextSpec {
                context_id: "b".to_string(),
                min_price: 0.0,
                max_price: 10.0,
            },
        ];
        Arc::new(
            PricingService::from_contexts(
                &mut StdRng::seed_from_u64(3),
                &contexts,
                &SpaceConfig::default(),
                OptimizerConfig::default(),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_spawn_and_shutdown() {
        let svc = service();
        let tasks = BackgroundTasks::spawn(
            Arc::clone(&svc),
            Recalibrator::new(LearnerKind::default().trainer(), 10),
            BackgroundSchedule::default(),
        );
        assert_eq!(tasks.task_count(), 3);

        tokio::time::timeout(Duration::from_secs(5), tasks.shutdown())
            .await
            .expect("shutdown should complete promptly");
    }

    #[tokio::test]
    async fn test_recalibration_runs_on_schedule() {
        let svc = service();
        for i in 0..30 {
            let id = format!("r{i}");
            let price = 1.0 + (i % 10) as f64 / 10.0;
            svc.optimize(&id, "a", price, 1.0, &RoutingMetadata::default())
                .unwrap();
            assert!(svc.feedback(&id, price, i % 2 == 0).unwrap());
        }
        let space = Arc::clone(svc.space("a").unwrap());
        assert!(space.pending_samples().iter().all(|&n| n == 30));

        let tasks = BackgroundTasks::spawn(
            Arc::clone(&svc),
            Recalibrator::new(LearnerKind::Logistic.trainer(), 10),
            BackgroundSchedule {
                recalibration_interval: Duration::from_millis(20),
                ..Default::default()
            },
        );

        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if space.pending_samples().iter().all(|&n| n == 0) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        tasks.shutdown().await;

        assert!(drained.is_ok(), "recalibration never drained the samples");
        assert!(svc.space("b").unwrap().pending_samples().iter().all(|&n| n == 0));
    }

    #[tokio::test]
    async fn test_sweeper_evicts_idle_entries() {
        let svc = service();
        svc.optimize("r1", "a", 1.5, 1.0, &RoutingMetadata::default())
            .unwrap();
        assert_eq!(svc.ledger().len(), 1);

        let tasks = BackgroundTasks::spawn(
            Arc::clone(&svc),
            Recalibrator::new(LearnerKind::default().trainer(), 10),
            BackgroundSchedule {
                ledger_sweep_interval: Duration::from_millis(10),
                ledger_retention: Duration::ZERO,
                ..Default::default()
            },
        );

        let emptied = tokio::time::timeout(Duration::from_secs(5), async {
            while !svc.ledger().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        tasks.shutdown().await;
        assert!(emptied.is_ok());
    }
}
