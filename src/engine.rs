//! Facade that lets a presentation layer drive the world without blocking on it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::runtime::Handle;

use crate::app_settings::EngineSettings;
use crate::error::{EngineError, Result};
use crate::physics::{Parameters, World, WorldSnapshot};

/// Receives a snapshot after every completed tick.
pub trait WorldUpdateListener: Send + Sync {
    fn world_updated(&self, snapshot: &WorldSnapshot);
}

impl<F> WorldUpdateListener for F
where
    F: Fn(&WorldSnapshot) + Send + Sync,
{
    fn world_updated(&self, snapshot: &WorldSnapshot) {
        self(snapshot)
    }
}

struct Shared {
    world: Mutex<World>,
    listeners: RwLock<Vec<Arc<dyn WorldUpdateListener>>>,
    in_flight: AtomicBool,
}

impl Shared {
    fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn try_claim(shared: &Arc<Shared>) -> Option<InFlight> {
        shared
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(Arc::clone(shared)))
    }

    fn notify(&self, snapshot: &WorldSnapshot) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        for listener in &listeners {
            listener.world_updated(snapshot);
        }
    }
}

/// Proof that the caller owns the single tick slot. Dropping it frees the
/// slot, even if the tick panicked.
struct InFlight(Arc<Shared>);

impl InFlight {
    /// Ticks, frees the slot, then hands the snapshot to every listener.
    fn run(self) -> WorldSnapshot {
        let shared = Arc::clone(&self.0);
        let snapshot = shared.world().compute();
        drop(self);
        shared.notify(&snapshot);
        snapshot
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::Release);
    }
}

pub struct SimulationEngine {
    shared: Arc<Shared>,
    params: Arc<Parameters>,
    runtime: Handle,
}

impl SimulationEngine {
    pub fn new(settings: &EngineSettings, runtime: Handle) -> Result<Self> {
        Ok(Self::from_world(World::new(settings)?, runtime))
    }

    pub fn from_world(world: World, runtime: Handle) -> Self {
        let params = Arc::clone(world.params());
        Self {
            shared: Arc::new(Shared {
                world: Mutex::new(world),
                listeners: RwLock::new(Vec::new()),
                in_flight: AtomicBool::new(false),
            }),
            params,
            runtime,
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn WorldUpdateListener>) {
        self.shared
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }

    /// Starts a tick on a background thread and returns immediately.
    ///
    /// Returns `false` and does nothing if the previous tick has not finished;
    /// requests are dropped, not queued.
    pub fn request_tick(&self) -> bool {
        let Some(claim) = Shared::try_claim(&self.shared) else {
            log::trace!("tick requested while one is in flight, dropped");
            return false;
        };

        self.runtime.spawn_blocking(move || {
            claim.run();
        });
        true
    }

    /// Runs a tick on the calling thread and notifies listeners.
    pub fn tick_now(&self) -> Result<WorldSnapshot> {
        let claim = Shared::try_claim(&self.shared).ok_or(EngineError::TickInFlight)?;
        Ok(claim.run())
    }

    pub fn is_tick_in_flight(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    pub fn params(&self) -> &Arc<Parameters> {
        &self.params
    }

    pub fn change_rule(&self, rule: usize, value: i32) -> Result<()> {
        self.params.change_rule(rule, value)
    }

    pub fn change_velocity_cap(&self, group: usize, value: i32) -> Result<()> {
        self.params.change_velocity_cap(group, value)
    }

    pub fn change_range(&self, group: usize, value: i32) -> Result<()> {
        self.params.change_range(group, value)
    }

    /// Waits for any running tick to finish before touching the grid.
    pub fn add_particles(&self, group: usize, amount: usize) -> Result<usize> {
        self.shared.world().add_particles(group, amount)
    }

    pub fn remove_particles(&self, group: usize, amount: usize) -> Result<usize> {
        self.shared.world().remove_particles(group, amount)
    }

    /// Adds `amount` particles to every group, stopping at the first failure.
    pub fn add_particles_to_all(&self, amount: usize) -> Result<usize> {
        let mut world = self.shared.world();
        let mut added = 0;
        for group in 0..world.group_count() {
            added += world.add_particles(group, amount)?;
        }
        Ok(added)
    }

    pub fn remove_particles_from_all(&self, amount: usize) -> Result<usize> {
        let mut world = self.shared.world();
        let mut removed = 0;
        for group in 0..world.group_count() {
            removed += world.remove_particles(group, amount)?;
        }
        Ok(removed)
    }

    pub fn population(&self) -> Vec<usize> {
        self.shared.world().population()
    }

    pub fn tick_count(&self) -> u64 {
        self.shared.world().tick_count()
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        self.shared.world().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::UNCAPPED;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::Weak;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn settings() -> EngineSettings {
        EngineSettings {
            width: 40,
            height: 30,
            groups: 3,
            velocity_cap: UNCAPPED,
            range_max: 20.0,
            initial_particles: 15,
            worker_threads: Some(2),
            seed: Some(1),
            ..EngineSettings::default()
        }
    }

    fn channel_listener(engine: &SimulationEngine) -> mpsc::UnboundedReceiver<WorldSnapshot> {
        let (tx, rx) = mpsc::unbounded_channel();
        engine.add_listener(Arc::new(move |snapshot: &WorldSnapshot| {
            let _ = tx.send(snapshot.clone());
        }));
        rx
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<WorldSnapshot>) -> WorldSnapshot {
        tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("tick should finish")
            .expect("listener channel open")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn request_tick_delivers_snapshot_to_listeners() {
        let engine = SimulationEngine::new(&settings(), Handle::current()).unwrap();
        let mut first = channel_listener(&engine);
        let mut second = channel_listener(&engine);

        assert!(engine.request_tick());
        let a = next(&mut first).await;
        let b = next(&mut second).await;
        assert_eq!(a, b);
        assert_eq!(a.tick, 1);
        assert_eq!(a.occupied(), 45);
        assert_eq!(a.population, vec![15, 15, 15]);
        assert!(!engine.is_tick_in_flight());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn second_request_is_dropped_while_in_flight() {
        let engine = SimulationEngine::new(&settings(), Handle::current()).unwrap();
        let mut rx = channel_listener(&engine);

        {
            let _held = engine.shared.world();
            assert!(engine.request_tick());
            assert!(!engine.request_tick());
            assert!(engine.is_tick_in_flight());
            assert!(matches!(engine.tick_now(), Err(EngineError::TickInFlight)));
        }

        let snapshot = next(&mut rx).await;
        assert_eq!(snapshot.tick, 1);
        assert!(!engine.is_tick_in_flight());

        assert!(engine.request_tick());
        assert_eq!(next(&mut rx).await.tick, 2);
        assert_eq!(engine.tick_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn parameter_changes_do_not_wait_for_the_world() {
        let engine = SimulationEngine::new(&settings(), Handle::current()).unwrap();
        let _held = engine.shared.world();

        engine.change_rule(4, 40).unwrap();
        engine.change_velocity_cap(1, 3).unwrap();
        engine.change_range(2, 12).unwrap();

        assert_eq!(engine.params().rules().get(4).map(|r| r.strength()), Some(0.2));
        assert_eq!(engine.params().types()[1].velocity_cap(), 3.0);
        assert_eq!(engine.params().types()[2].range_max(), 12.0);
        assert!(engine.change_rule(9, 1).is_err());
        assert!(engine.change_range(3, 1).is_err());
    }

    #[test]
    fn tick_now_runs_synchronously() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let engine = SimulationEngine::new(&settings(), runtime.handle().clone()).unwrap();
        let seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        engine.add_listener(Arc::new(move |_: &WorldSnapshot| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        for tick in 1..=3 {
            assert_eq!(engine.tick_now().unwrap().tick, tick);
        }
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn bulk_add_and_remove_touch_every_group() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let engine = SimulationEngine::new(&settings(), runtime.handle().clone()).unwrap();

        assert_eq!(engine.add_particles_to_all(5).unwrap(), 15);
        assert_eq!(engine.population(), vec![20, 20, 20]);
        assert_eq!(engine.remove_particles(1, 50).unwrap(), 20);
        assert_eq!(engine.remove_particles_from_all(10).unwrap(), 20);
        assert_eq!(engine.population(), vec![10, 0, 10]);

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.count_of(2), 0);
        assert_eq!(snapshot.occupied(), 20);
        assert!(matches!(engine.add_particles(3, 1), Err(EngineError::InvalidIndex { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn listener_can_chain_the_next_tick() {
        let engine = Arc::new(SimulationEngine::new(&settings(), Handle::current()).unwrap());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let weak: Weak<SimulationEngine> = Arc::downgrade(&engine);
        engine.add_listener(Arc::new(move |snapshot: &WorldSnapshot| {
            let accepted = snapshot.tick < 5 && weak.upgrade().map_or(false, |e| e.request_tick());
            let _ = tx.send((snapshot.tick, accepted));
        }));

        assert!(engine.request_tick());
        let mut seen = Vec::new();
        for _ in 0..5 {
            let entry = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("chained tick should finish")
                .expect("listener channel open");
            seen.push(entry);
        }
        // a chained tick may report before the listener that requested it
        seen.sort();
        assert_eq!(seen, vec![(1, true), (2, true), (3, true), (4, true), (5, false)]);
        assert_eq!(engine.tick_count(), 5);
    }

    #[test]
    fn panicking_tick_releases_the_slot() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let engine = SimulationEngine::new(&settings(), runtime.handle().clone()).unwrap();

        let claim = Shared::try_claim(&engine.shared).expect("slot is free");
        assert!(engine.is_tick_in_flight());
        let outcome = panic::catch_unwind(AssertUnwindSafe(move || {
            let _claim = claim;
            panic!("world failed mid-tick");
        }));
        assert!(outcome.is_err());

        assert!(!engine.is_tick_in_flight());
        assert_eq!(engine.tick_now().unwrap().tick, 1);
    }

    #[test]
    fn panicking_listener_leaves_engine_usable() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let engine = SimulationEngine::new(&settings(), runtime.handle().clone()).unwrap();
        let armed = Arc::new(AtomicBool::new(true));
        let trigger = Arc::clone(&armed);
        engine.add_listener(Arc::new(move |_: &WorldSnapshot| {
            if trigger.swap(false, Ordering::SeqCst) {
                panic!("listener failed");
            }
        }));

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| engine.tick_now()));
        assert!(outcome.is_err());
        assert!(!armed.load(Ordering::SeqCst));
        assert!(!engine.is_tick_in_flight());

        assert_eq!(engine.tick_count(), 1);
        assert!(engine.request_tick());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_listener_in_background_tick_frees_the_slot() {
        let engine = SimulationEngine::new(&settings(), Handle::current()).unwrap();
        let mut rx = channel_listener(&engine);
        engine.add_listener(Arc::new(|snapshot: &WorldSnapshot| {
            if snapshot.tick == 1 {
                panic!("listener failed");
            }
        }));

        assert!(engine.request_tick());
        assert_eq!(next(&mut rx).await.tick, 1);
        // the slot is freed before listeners run, so the panic cannot hold it
        assert!(!engine.is_tick_in_flight());
        assert!(engine.request_tick());
        assert_eq!(next(&mut rx).await.tick, 2);
    }
}
