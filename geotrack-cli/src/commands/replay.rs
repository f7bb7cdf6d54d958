//! Replay command - run a scenario against the in-memory store.
//!
//! Seeds the store, tracks the initial subjects, waits for their bootstrap,
//! then applies each step after its delay. Every engine event is printed as
//! it arrives; a table of the final locations closes the run.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use geotrack::geo::GeoBounds;
use geotrack::store::MemoryLocationStore;
use geotrack::sync::{ChannelEventSink, EngineConfig, Freshness, SyncEngine};
use geotrack::{LocationRecord, SyncEvent};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::error::CliError;
use crate::runner::CliRunner;
use crate::scenario::{Action, Scenario};

/// Outcome of a replay.
#[derive(Debug)]
pub struct ReplayReport {
    /// Every event in arrival order.
    pub events: Vec<SyncEvent>,
    /// Cached records at the end of the run, by subject.
    pub locations: BTreeMap<String, (LocationRecord, Option<Freshness>)>,
    pub active_subscriptions: usize,
    pub bounds: Option<GeoBounds>,
}

/// Run the replay command.
pub fn run(path: &Path, config_path: Option<&Path>, verbose: bool) -> Result<(), CliError> {
    let runner = CliRunner::new(config_path, verbose)?;
    runner.log_startup("replay");

    let scenario = Scenario::load(path)?;
    let engine_config = runner.config().engine_config();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    let report = runtime.block_on(replay(scenario, engine_config, |elapsed, event| {
        println!("{:>6}ms  {}", elapsed.as_millis(), event);
    }));

    println!();
    for line in render_summary(&report) {
        println!("{}", line);
    }
    Ok(())
}

/// Replay `scenario`, reporting each event to `on_event` with the time
/// elapsed since the start.
pub async fn replay<F>(scenario: Scenario, config: EngineConfig, mut on_event: F) -> ReplayReport
where
    F: FnMut(Duration, &SyncEvent),
{
    let started = Instant::now();
    let store = Arc::new(MemoryLocationStore::new());
    for doc in &scenario.documents {
        store.put_location(&doc.subject, doc.latitude, doc.longitude, doc.timestamp);
    }

    let engine = SyncEngine::with_config(store.clone(), Handle::current(), config);
    let (sink, mut rx) = ChannelEventSink::new();
    engine.set_event_sink(Some(Arc::new(sink)));

    let driver = async {
        if let Some(batch) = engine.track(scenario.track.iter().cloned()) {
            match batch.await {
                Ok(summary) => info!(
                    success_count = summary.success_count,
                    total_count = summary.total_count,
                    "Initial subjects bootstrapped"
                ),
                Err(e) => warn!(error = %e, "Bootstrap task failed"),
            }
        }

        let mut pending = Vec::new();
        for (index, step) in scenario.steps.iter().enumerate() {
            tokio::time::sleep(Duration::from_millis(step.after_ms)).await;
            debug!(step = index, action = ?step.action, "Applying step");

            match &step.action {
                Action::Put(doc) => {
                    store.put_location(&doc.subject, doc.latitude, doc.longitude, doc.timestamp)
                }
                Action::Delete { subject } => {
                    store.delete(subject);
                }
                Action::Track { subjects } => pending.extend(engine.track(subjects.iter().cloned())),
                Action::Untrack { subject } => engine.untrack(subject),
                Action::UntrackAll => engine.untrack_all(),
            }
        }

        for batch in pending {
            if let Err(e) = batch.await {
                warn!(error = %e, "Bootstrap task failed");
            }
        }
        tokio::time::sleep(Duration::from_millis(scenario.settle_ms)).await;

        let locations = engine
            .all_current_locations()
            .into_iter()
            .map(|(subject, record)| {
                let freshness = engine.freshness(&subject);
                (subject, (record, freshness))
            })
            .collect();
        let active_subscriptions = engine.active_subscription_count();
        let bounds = engine.current_bounds();

        // Detaching the sink closes the event channel
        engine.shutdown();
        (locations, active_subscriptions, bounds)
    };

    let collector = async {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            on_event(started.elapsed(), &event);
            events.push(event);
        }
        events
    };

    let ((locations, active_subscriptions, bounds), events) = tokio::join!(driver, collector);

    ReplayReport {
        events,
        locations,
        active_subscriptions,
        bounds,
    }
}

/// Final table printed after the event log.
pub fn render_summary(report: &ReplayReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Final locations ({} subjects, {} subscriptions)",
        report.locations.len(),
        report.active_subscriptions
    )];

    for (subject, (record, freshness)) in &report.locations {
        let freshness = match freshness {
            Some(Freshness::Fresh) => "fresh",
            Some(Freshness::Stale) => "stale",
            None => "-",
        };
        lines.push(format!(
            "  {:<12} {:>10.6} {:>11.6}  {}  {}",
            subject,
            record.latitude(),
            record.longitude(),
            record.observed_at().to_rfc3339(),
            freshness
        ));
    }

    if let Some(bounds) = &report.bounds {
        let (lat, lon) = bounds.center();
        lines.push(format!("  center       {:>10.6} {:>11.6}", lat, lon));
    }
    lines
}
