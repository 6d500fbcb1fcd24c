//! Background circuit-breaker maintenance.

use std::sync::Arc;
use std::time::{Duration, Instant};

use corelib::health::Transition;
use corelib::{NodeId, Partitioner};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::router::ServiceRouter;

/// Periodically evaluates node health for one service.
///
/// Each tick closes the current health window, rebuilds the working ring if
/// any node changed state, and re-balances the weighted balancer. Callers
/// never run this work themselves.
pub struct Maintenance<C, P> {
    router: Arc<ServiceRouter<C, P>>,
    interval: Duration,
}

impl<C: Send + Sync + 'static, P: Partitioner> Maintenance<C, P> {
    pub fn new(router: Arc<ServiceRouter<C, P>>, interval: Duration) -> Self {
        Self { router, interval }
    }

    /// Use the router's configured health check interval.
    pub fn from_config(router: Arc<ServiceRouter<C, P>>) -> Self {
        let interval = router.config().health_check_interval();
        Self::new(router, interval)
    }

    /// Starts the maintenance task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        let mut interval = tokio::time::interval(self.interval);
        // the first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            self.tick(Instant::now());
        }
    }

    /// Run one maintenance pass.
    pub fn tick(&self, now: Instant) -> Vec<(NodeId, Transition)> {
        match self.router.run_maintenance(now) {
            Ok(transitions) => {
                if !transitions.is_empty() {
                    debug!(
                        service = self.router.service(),
                        transitions = transitions.len(),
                        "maintenance applied transitions"
                    );
                }
                transitions
            }
            Err(err) => {
                warn!(service = self.router.service(), error = %err, "maintenance pass failed");
                Vec::new()
            }
        }
    }
}
