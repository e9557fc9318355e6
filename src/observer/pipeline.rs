// Ring-ordered observer pipeline with explicit registration

use futures::future::join_all;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio::time::timeout;

use crate::observer::context::ObserverContext;
use crate::observer::error::{ObserverError, ObserverResult};
use crate::observer::traits::{AsyncObserver, ObserverBox, ObserverRing, Signal};

/// Executes observers in ring order: synchronous rings inline, asynchronous
/// rings on a background task.
pub struct ObserverPipeline {
    observers: BTreeMap<ObserverRing, Vec<ObserverBox>>,
}

static PIPELINE: OnceLock<ObserverPipeline> = OnceLock::new();

/// Process-wide pipeline with every built-in observer registered
pub fn pipeline() -> &'static ObserverPipeline {
    PIPELINE.get_or_init(|| {
        let mut pipeline = ObserverPipeline::new();
        crate::observer::implementations::register_default_observers(&mut pipeline);
        pipeline
    })
}

/// Dispatch a signal through the global pipeline
pub async fn dispatch(signal: Signal, pool: PgPool) -> ObserverResult {
    pipeline().dispatch(signal, pool).await
}

impl ObserverPipeline {
    pub fn new() -> Self {
        Self {
            observers: BTreeMap::new(),
        }
    }

    /// Register an observer, keeping each ring sorted by priority
    pub fn register_observer(&mut self, observer: ObserverBox) {
        let ring = observer.ring();
        let name = observer.name();
        let ring_observers = self.observers.entry(ring).or_default();
        ring_observers.push(observer);
        ring_observers.sort_by_key(|o| o.priority());

        tracing::debug!("Registered observer '{}' for ring {:?}", name, ring);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.values().map(Vec::len).sum()
    }

    pub async fn dispatch(&self, signal: Signal, pool: PgPool) -> ObserverResult {
        let start_time = Instant::now();
        let kind = signal.kind();
        let mut ctx = ObserverContext::new(signal, pool);
        let mut rings_executed = Vec::new();

        tracing::debug!("Observer pipeline starting: signal={:?}", kind);

        for ring in ObserverRing::ALL.into_iter().filter(|r| r.is_synchronous()) {
            if self.execute_ring(ring, &mut ctx).await {
                rings_executed.push(ring);
            }
            // Later synchronous rings assume earlier ones succeeded
            if ctx.has_errors() {
                tracing::warn!("Observer pipeline stopped at ring {:?} due to errors", ring);
                break;
            }
        }

        if !ctx.has_errors() {
            rings_executed.extend(self.execute_async_rings(&ctx));
        }

        ObserverResult {
            success: ctx.errors.is_empty(),
            errors: ctx.errors,
            warnings: ctx.warnings,
            execution_time: start_time.elapsed(),
            rings_executed,
        }
    }

    /// Returns whether any observer ran in this ring
    async fn execute_ring(&self, ring: ObserverRing, ctx: &mut ObserverContext) -> bool {
        let Some(observers) = self.observers.get(&ring) else {
            return false;
        };
        let kind = ctx.signal.kind();
        let mut ran = false;

        for observer in observers {
            let ObserverBox::Sync(observer) = observer else {
                continue;
            };
            if !observer.applies_to(kind) {
                continue;
            }
            ran = true;
            ctx.current_ring = Some(ring);
            let observer_start = Instant::now();

            match timeout(observer.timeout(), observer.execute(ctx)).await {
                Ok(Ok(())) => {
                    tracing::debug!("Observer: {} completed in {:?}", observer.name(), observer_start.elapsed());
                }
                Ok(Err(error)) => {
                    tracing::warn!("Observer: {} failed in {:?}: {}", observer.name(), observer_start.elapsed(), error);
                    ctx.add_error(error);
                }
                Err(_elapsed) => {
                    tracing::error!("Observer: {} timed out after {:?}", observer.name(), observer.timeout());
                    ctx.add_error(ObserverError::TimeoutError(format!(
                        "Observer {} timed out after {:?}",
                        observer.name(),
                        observer.timeout()
                    )));
                }
            }
        }
        ran
    }

    /// Spawn the applicable async observers; failures are only logged
    fn execute_async_rings(&self, ctx: &ObserverContext) -> Vec<ObserverRing> {
        let kind = ctx.signal.kind();
        let mut rings = Vec::new();
        let mut pending: Vec<Arc<dyn AsyncObserver>> = Vec::new();

        for (ring, observers) in self.observers.iter().filter(|(r, _)| r.is_asynchronous()) {
            let before = pending.len();
            for observer in observers {
                if let ObserverBox::Async(observer) = observer {
                    if observer.applies_to(kind) {
                        pending.push(Arc::clone(observer));
                    }
                }
            }
            if pending.len() > before {
                rings.push(*ring);
            }
        }

        if pending.is_empty() {
            return rings;
        }

        let ctx = ctx.clone();
        tokio::spawn(async move {
            let ctx = &ctx;
            let runs = pending.iter().map(|observer| async move {
                match timeout(observer.timeout(), observer.execute(ctx)).await {
                    Ok(Ok(())) => tracing::debug!("Async observer: {} completed", observer.name()),
                    Ok(Err(error)) => tracing::error!("Async observer: {} failed: {}", observer.name(), error),
                    Err(_elapsed) => tracing::error!("Async observer: {} timed out", observer.name()),
                }
            });
            join_all(runs).await;
        });

        rings
    }
}

impl Default for ObserverPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::Tenant;
    use crate::observer::traits::{Observer, SignalKind, SyncObserver};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Counting {
        ring: ObserverRing,
        priority: u8,
        fail: bool,
        order: Arc<std::sync::Mutex<Vec<&'static str>>>,
        name: &'static str,
    }

    impl Observer for Counting {
        fn name(&self) -> &'static str { self.name }
        fn ring(&self) -> ObserverRing { self.ring }
        fn applies_to(&self, signal: SignalKind) -> bool { signal == SignalKind::TenantCreated }
        fn priority(&self) -> u8 { self.priority }
    }

    #[async_trait]
    impl SyncObserver for Counting {
        async fn execute(&self, _ctx: &mut ObserverContext) -> Result<(), ObserverError> {
            self.order.lock().unwrap().push(self.name);
            if self.fail {
                return Err(ObserverError::ValidationError(format!("{} failed", self.name)));
            }
            Ok(())
        }
    }

    struct Slow;

    impl Observer for Slow {
        fn name(&self) -> &'static str { "Slow" }
        fn ring(&self) -> ObserverRing { ObserverRing::Business }
        fn applies_to(&self, _signal: SignalKind) -> bool { true }
        fn timeout(&self) -> Duration { Duration::from_millis(10) }
    }

    #[async_trait]
    impl SyncObserver for Slow {
        async fn execute(&self, _ctx: &mut ObserverContext) -> Result<(), ObserverError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        }
    }

    struct Background(Arc<AtomicUsize>);

    impl Observer for Background {
        fn name(&self) -> &'static str { "Background" }
        fn ring(&self) -> ObserverRing { ObserverRing::Integration }
        fn applies_to(&self, _signal: SignalKind) -> bool { true }
    }

    #[async_trait]
    impl AsyncObserver for Background {
        async fn execute(&self, _ctx: &ObserverContext) -> Result<(), ObserverError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn tenant_signal() -> Signal {
        let now = Utc::now();
        Signal::TenantCreated(Tenant {
            id: 1,
            name: "Acme".into(),
            schema_name: "acme_1234abcd".into(),
            domain: "acme_1234abcd.localhost".into(),
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    fn lazy_pool() -> PgPool {
        sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap()
    }

    fn counting(name: &'static str, ring: ObserverRing, priority: u8, fail: bool, order: &Arc<std::sync::Mutex<Vec<&'static str>>>) -> ObserverBox {
        ObserverBox::Sync(Box::new(Counting { ring, priority, fail, order: order.clone(), name }))
    }

    #[tokio::test]
    async fn runs_rings_in_order_and_priority_within_ring() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut p = ObserverPipeline::new();
        p.register_observer(counting("post", ObserverRing::PostDatabase, 10, false, &order));
        p.register_observer(counting("late", ObserverRing::Business, 90, false, &order));
        p.register_observer(counting("early", ObserverRing::Business, 10, false, &order));

        let result = p.dispatch(tenant_signal(), lazy_pool()).await;
        assert!(result.success);
        assert_eq!(*order.lock().unwrap(), vec!["early", "late", "post"]);
        assert_eq!(result.rings_executed, vec![ObserverRing::Business, ObserverRing::PostDatabase]);
    }

    #[tokio::test]
    async fn errors_stop_later_rings() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut p = ObserverPipeline::new();
        p.register_observer(counting("broken", ObserverRing::InputValidation, 50, true, &order));
        p.register_observer(counting("never", ObserverRing::PostDatabase, 50, false, &order));

        let result = p.dispatch(tenant_signal(), lazy_pool()).await;
        assert!(!result.success);
        assert_eq!(*order.lock().unwrap(), vec!["broken"]);
        assert!(matches!(result.into_result(), Err(ObserverError::ValidationError(_))));
    }

    #[tokio::test]
    async fn slow_observers_time_out() {
        let mut p = ObserverPipeline::new();
        p.register_observer(ObserverBox::Sync(Box::new(Slow)));
        let result = p.dispatch(tenant_signal(), lazy_pool()).await;
        assert!(matches!(result.errors.first(), Some(ObserverError::TimeoutError(_))));
    }

    #[tokio::test]
    async fn async_rings_run_in_background() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut p = ObserverPipeline::new();
        p.register_observer(ObserverBox::Async(Arc::new(Background(hits.clone()))));

        let result = p.dispatch(tenant_signal(), lazy_pool()).await;
        assert!(result.success);
        assert_eq!(result.rings_executed, vec![ObserverRing::Integration]);

        for _ in 0..50 {
            if hits.load(Ordering::SeqCst) == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("async observer never ran");
    }
}
