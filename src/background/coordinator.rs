use crate::background::cancel::CancellationToken;
use crate::core::bounds::BoundingBox;
use crate::core::geo::LatLng;
use crate::core::pipeline::{LoadOutcome, StationPipeline};
use crate::core::viewport::{FilterSet, Viewport};
use crate::data::record::StationRecord;
use crate::runtime::{self, AsyncHandle, AsyncSpawner};
use crate::{MapError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How a committed result was obtained
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateMeta {
    pub cache_hit: bool,
    pub source: String,
    pub request_id: u64,
}

/// Output of the coordinator, consumed by the rendering layer
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// The committed result of the latest request
    RecordsUpdated {
        records: Vec<StationRecord>,
        meta: UpdateMeta,
    },
    /// A condition that is not degraded silently: an invalid box, or an
    /// exhausted provider chain
    Error(String),
}

/// A fetch that may commit its result if it is still the latest one
#[derive(Debug, Clone)]
pub struct InFlightRequest {
    pub request_id: u64,
    pub token: CancellationToken,
}

#[derive(Default)]
struct CoordinatorState {
    last_request_id: u64,
    /// Token of the live request, cancelled when a newer one begins
    current: Option<CancellationToken>,
    /// Pending debounce timer
    timer: Option<Box<dyn AsyncHandle>>,
    /// Filters of the last viewport event, reused for search results
    filters: FilterSet,
}

/// Turns viewport events into fetches, latest request wins.
///
/// Bursts of events inside the debounce window collapse to the trailing
/// one. Every issued fetch gets the next request id and cancels the token of
/// the previous fetch; a result is only committed when its id still equals
/// the last issued id, so a slow early response can never overwrite a newer
/// one. Clones drive the same state.
#[derive(Clone)]
pub struct RequestCoordinator {
    pipeline: Arc<StationPipeline>,
    state: Arc<Mutex<CoordinatorState>>,
    events: Sender<PipelineEvent>,
    spawner: Arc<dyn AsyncSpawner>,
    debounce: Duration,
    search_radius_km: f64,
    shutdown_signal: Arc<AtomicBool>,
}

impl RequestCoordinator {
    /// Create a coordinator and the receiving end of its event channel.
    /// Debounce timers and fetches run on `spawner`.
    pub fn new(
        pipeline: Arc<StationPipeline>,
        spawner: Arc<dyn AsyncSpawner>,
    ) -> (Self, Receiver<PipelineEvent>) {
        let (events, receiver) = unbounded();
        let debounce = pipeline.options().fetch.debounce();
        let search_radius_km = pipeline.options().fetch.search_radius_km;
        let coordinator = Self {
            debounce,
            search_radius_km,
            pipeline,
            spawner,
            state: Arc::new(Mutex::new(CoordinatorState::default())),
            events,
            shutdown_signal: Arc::new(AtomicBool::new(false)),
        };
        (coordinator, receiver)
    }

    pub fn pipeline(&self) -> &Arc<StationPipeline> {
        &self.pipeline
    }

    /// Pan/zoom settled on `bounds` with `filters` active
    pub fn on_viewport_change(&self, bounds: BoundingBox, filters: FilterSet) -> Result<()> {
        self.on_viewport(Viewport::new(bounds).with_filters(filters))
    }

    /// Debounces a viewport; an invalid box is reported right away
    pub fn on_viewport(&self, viewport: Viewport) -> Result<()> {
        let bounds = match viewport.bounds.normalized() {
            Ok(bounds) => bounds,
            Err(err) => {
                self.emit(PipelineEvent::Error(err.to_string()));
                return Err(err);
            }
        };
        let viewport = Viewport { bounds, ..viewport };
        self.schedule(viewport)
    }

    /// A geocoder hit becomes a viewport around `point` with the current filters
    pub fn on_search_resolved(&self, point: LatLng) -> Result<()> {
        let filters = self.lock_state()?.filters.clone();
        let viewport = match Viewport::around(point, self.search_radius_km) {
            Ok(viewport) => viewport.with_filters(filters),
            Err(err) => {
                self.emit(PipelineEvent::Error(err.to_string()));
                return Err(err);
            }
        };
        self.schedule(viewport)
    }

    /// Replaces the pending debounce timer with one for `viewport`
    fn schedule(&self, viewport: Viewport) -> Result<()> {
        if self.is_shutting_down() {
            return Ok(());
        }

        let mut state = self.lock_state()?;
        state.filters = viewport.filters.clone();
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }

        let coordinator = self.clone();
        let debounce = self.debounce;
        state.timer = Some(runtime::spawn_on(self.spawner.as_ref(), async move {
            runtime::async_delay(debounce).await;
            if coordinator.is_shutting_down() {
                return;
            }
            // the fetch runs detached so a later timer reset cannot abort it
            let fetcher = coordinator.clone();
            let _detached = runtime::spawn_on(coordinator.spawner.as_ref(), async move {
                fetcher.request_now(&viewport).await;
            });
        }));
        Ok(())
    }

    /// Issues a fetch immediately, bypassing the debounce. Returns whether
    /// its result was committed.
    pub async fn request_now(&self, viewport: &Viewport) -> bool {
        let request = match self.begin() {
            Ok(request) => request,
            Err(MapError::Cancelled) => {
                log::trace!("coordinator shut down, dropping request");
                return false;
            }
            Err(err) => {
                log::warn!("coordinator unavailable: {err}");
                return false;
            }
        };
        log::debug!("request {} started", request.request_id);
        let outcome = self.pipeline.load(viewport, &request.token).await;
        self.commit(&request, outcome)
    }

    /// Starts a new request: next id, previous token cancelled. Fails with
    /// `Cancelled` once the coordinator is shut down.
    pub fn begin(&self) -> Result<InFlightRequest> {
        let mut state = self.lock_state()?;
        if self.is_shutting_down() {
            return Err(MapError::Cancelled);
        }
        state.last_request_id += 1;
        if let Some(previous) = state.current.take() {
            previous.cancel();
        }

        let token = CancellationToken::new();
        state.current = Some(token.clone());
        Ok(InFlightRequest {
            request_id: state.last_request_id,
            token,
        })
    }

    /// Commits `outcome` if `request` is still the latest one.
    ///
    /// The check and the event send happen under the state lock, so a newer
    /// request cannot begin between them.
    pub fn commit(&self, request: &InFlightRequest, outcome: Result<LoadOutcome>) -> bool {
        let Ok(state) = self.lock_state() else {
            return false;
        };
        if self.is_shutting_down() {
            log::trace!("coordinator shut down, dropping request {}", request.request_id);
            return false;
        }
        if request.request_id != state.last_request_id {
            log::trace!(
                "discarding stale request {} (latest is {})",
                request.request_id,
                state.last_request_id
            );
            return false;
        }

        match outcome {
            Ok(outcome) => {
                log::info!(
                    "request {} committed {} records from {}{}",
                    request.request_id,
                    outcome.records.len(),
                    outcome.source,
                    if outcome.cache_hit { " (cached)" } else { "" }
                );
                self.emit(PipelineEvent::RecordsUpdated {
                    records: outcome.records,
                    meta: UpdateMeta {
                        cache_hit: outcome.cache_hit,
                        source: outcome.source,
                        request_id: request.request_id,
                    },
                });
                true
            }
            Err(MapError::Cancelled) => {
                log::trace!("request {} cancelled", request.request_id);
                false
            }
            Err(err) if err.is_user_visible() => {
                self.emit(PipelineEvent::Error(err.to_string()));
                false
            }
            Err(err) => {
                log::warn!("request {} failed: {err}", request.request_id);
                false
            }
        }
    }

    /// Whether `request_id` is the one allowed to commit
    pub fn is_current(&self, request_id: u64) -> bool {
        self.last_request_id() == request_id
    }

    pub fn last_request_id(&self) -> u64 {
        self.lock_state()
            .map(|state| state.last_request_id)
            .unwrap_or(0)
    }

    /// Drop the pending timer and cancel the live request
    pub fn shutdown(&self) {
        self.shutdown_signal.store(true, AtomicOrdering::SeqCst);
        if let Ok(mut state) = self.lock_state() {
            if let Some(timer) = state.timer.take() {
                timer.cancel();
            }
            if let Some(token) = state.current.take() {
                token.cancel();
            }
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_signal.load(AtomicOrdering::SeqCst)
    }

    fn emit(&self, event: PipelineEvent) {
        if self.events.send(event).is_err() {
            log::debug!("event receiver dropped");
        }
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, CoordinatorState>> {
        self.state
            .lock()
            .map_err(|_| MapError::Config("coordinator state poisoned".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builder::PipelineBuilder;
    use crate::providers::SyntheticProvider;

    fn coordinator() -> (RequestCoordinator, Receiver<PipelineEvent>) {
        PipelineBuilder::new()
            .with_provider(Arc::new(SyntheticProvider::new(3)))
            .with_debounce(Duration::from_millis(400))
            .build_coordinator()
            .unwrap()
    }

    fn outcome(source: &str) -> LoadOutcome {
        LoadOutcome {
            records: Vec::new(),
            cache_hit: false,
            source: source.to_string(),
            tiles: 1,
        }
    }

    #[tokio::test]
    async fn test_begin_cancels_previous_token() {
        let (coordinator, _rx) = coordinator();
        let first = coordinator.begin().unwrap();
        let second = coordinator.begin().unwrap();

        assert_eq!(second.request_id, first.request_id + 1);
        assert!(first.token.is_cancelled());
        assert!(!second.token.is_cancelled());
        assert!(coordinator.is_current(second.request_id));
    }

    #[tokio::test]
    async fn test_late_result_never_overwrites_newer() {
        let (coordinator, rx) = coordinator();
        let a = coordinator.begin().unwrap();
        let b = coordinator.begin().unwrap();

        // B answers first, A arrives late
        assert!(coordinator.commit(&b, Ok(outcome("b"))));
        assert!(!coordinator.commit(&a, Ok(outcome("a"))));

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        match &events[0] {
            PipelineEvent::RecordsUpdated { meta, .. } => {
                assert_eq!(meta.source, "b");
                assert_eq!(meta.request_id, b.request_id);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_only_user_visible_errors_are_emitted() {
        let (coordinator, rx) = coordinator();
        let request = coordinator.begin().unwrap();
        assert!(!coordinator.commit(&request, Err(MapError::Cancelled)));
        assert!(!coordinator.commit(&request, Err(MapError::EmptyResult("ocm".into()))));
        assert!(rx.try_recv().is_err());

        assert!(!coordinator.commit(&request, Err(MapError::ChainExhausted)));
        assert!(matches!(rx.try_recv(), Ok(PipelineEvent::Error(_))));
    }

    #[tokio::test]
    async fn test_invalid_viewport_is_reported() {
        let (coordinator, rx) = coordinator();
        let bounds = BoundingBox {
            west: -200.0,
            south: 0.0,
            east: 0.0,
            north: 1.0,
        };
        let result = coordinator.on_viewport_change(bounds, FilterSet::default());
        assert!(matches!(result, Err(MapError::InvalidBoundingBox(_))));
        assert!(matches!(rx.try_recv(), Ok(PipelineEvent::Error(_))));
        assert_eq!(coordinator.last_request_id(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_collapses_burst() {
        let (coordinator, rx) = coordinator();
        for i in 0..5 {
            let bounds = BoundingBox::new(0.0, 0.0, 0.1 + i as f64 * 0.01, 0.1).unwrap();
            coordinator
                .on_viewport_change(bounds, FilterSet::default())
                .unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(coordinator.last_request_id(), 0);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(coordinator.last_request_id(), 1);

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            PipelineEvent::RecordsUpdated { meta, .. } if meta.source == "synthetic"
        ));
    }

    #[tokio::test]
    async fn test_nothing_is_emitted_after_shutdown() {
        let (coordinator, rx) = coordinator();
        let live = coordinator.begin().unwrap();
        coordinator.shutdown();

        assert!(live.token.is_cancelled());
        assert!(matches!(coordinator.begin(), Err(MapError::Cancelled)));
        assert!(!coordinator.commit(&live, Ok(outcome("late"))));

        let viewport = Viewport::new(BoundingBox::new(0.0, 0.0, 0.1, 0.1).unwrap());
        assert!(!coordinator.request_now(&viewport).await);
        assert_eq!(coordinator.last_request_id(), live.request_id);
        assert!(rx.try_recv().is_err());
    }

    /// Counts spawns and forwards them to Tokio
    struct CountingSpawner {
        inner: crate::runtime::spawners::TokioSpawner,
        spawned: std::sync::atomic::AtomicUsize,
    }

    impl AsyncSpawner for CountingSpawner {
        fn spawn_boxed(
            &self,
            future: std::pin::Pin<Box<dyn crate::prelude::Future<Output = ()> + Send + 'static>>,
        ) -> Box<dyn AsyncHandle> {
            self.spawned.fetch_add(1, AtomicOrdering::SeqCst);
            self.inner.spawn_boxed(future)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timers_and_fetches_use_the_given_spawner() {
        let spawner = Arc::new(CountingSpawner {
            inner: crate::runtime::spawners::TokioSpawner::current().unwrap(),
            spawned: std::sync::atomic::AtomicUsize::new(0),
        });
        let (coordinator, rx) = PipelineBuilder::new()
            .with_provider(Arc::new(SyntheticProvider::new(3)))
            .with_debounce(Duration::from_millis(400))
            .with_spawner(spawner.clone())
            .build_coordinator()
            .unwrap();

        coordinator
            .on_viewport_change(BoundingBox::new(0.0, 0.0, 0.1, 0.1).unwrap(), FilterSet::default())
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        // one debounce timer, one detached fetch
        assert_eq!(spawner.spawned.load(AtomicOrdering::SeqCst), 2);
        assert!(matches!(rx.try_recv(), Ok(PipelineEvent::RecordsUpdated { .. })));
    }

    #[test]
    fn test_building_outside_a_runtime_fails_cleanly() {
        let result = PipelineBuilder::new()
            .with_provider(Arc::new(SyntheticProvider::new(3)))
            .build_coordinator();
        assert!(matches!(result, Err(MapError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_reuses_filters() {
        let (coordinator, rx) = coordinator();
        let filters = FilterSet::default().with_connector("ccs");
        coordinator
            .on_viewport_change(BoundingBox::new(0.0, 0.0, 0.1, 0.1).unwrap(), filters)
            .unwrap();
        coordinator
            .on_search_resolved(LatLng::new(51.5, -0.12))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        match &events[0] {
            PipelineEvent::RecordsUpdated { records, .. } => {
                assert!(!records.is_empty());
                assert!(records.iter().all(|r| (r.lat - 51.5).abs() < 0.1));
                assert!(records.iter().all(|r| r.connectors_detailed[0]
                    .kind
                    .as_deref()
                    .is_some_and(|kind| kind.contains("ccs"))));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
