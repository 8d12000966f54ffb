use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use grid_life::clock::Clock;
use grid_life::{EngineSettings, SimulationEngine, WorldSnapshot};

/// Particles added to each group when the settings start the world empty.
const DEFAULT_BATCH: usize = 50;
/// Largest magnitude an integer rule value takes.
const RULE_LIMIT: i32 = 999;
const REPORT_EVERY: u64 = 60;

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = match std::env::args().nth(1) {
        Some(path) => EngineSettings::load_from(path)?,
        None => EngineSettings::load()?,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("grid-life")
        .build()?;
    let engine = SimulationEngine::new(&settings, runtime.handle().clone())?;

    if settings.initial_particles == 0 {
        engine.add_particles_to_all(DEFAULT_BATCH)?;
    }

    let mut rng = rand::thread_rng();
    for rule in 0..settings.rule_count() {
        engine.change_rule(rule, rng.gen_range(-RULE_LIMIT..=RULE_LIMIT))?;
    }

    let completed = Arc::new(AtomicU64::new(0));
    let clock = Arc::new(Mutex::new(Clock::new(settings.target_tps)));
    {
        let completed = Arc::clone(&completed);
        let clock = Arc::clone(&clock);
        engine.add_listener(Arc::new(move |snapshot: &WorldSnapshot| {
            completed.store(snapshot.tick, Ordering::Release);
            let mut clock = clock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            clock.tick();
            if snapshot.tick % REPORT_EVERY == 0 {
                log::info!(
                    "tick {}: {:.1} ticks/s ({:.1}ms), population {:?}",
                    snapshot.tick,
                    clock.avg_rate(),
                    clock.dt_millis(),
                    snapshot.population
                );
            }
        }));
    }

    let period = Clock::new(settings.target_tps).period();
    let run_ticks = settings.run_ticks;
    runtime.block_on(async {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        while completed.load(Ordering::Acquire) < run_ticks {
            interval.tick().await;
            engine.request_tick();
        }
    });

    let snapshot = engine.snapshot();
    log::info!(
        "finished after {} ticks, {} cells occupied, population {:?}",
        snapshot.tick,
        snapshot.occupied(),
        snapshot.population
    );
    Ok(())
}
