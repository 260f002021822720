//! Background behavior under a paused Tokio clock.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use asuna_agent::{AutonomousEvent, BehaviorCategory, EventSink, FnSink, SessionBuilder, SinkError};
use asuna_core::AsunaConfig;
use asuna_core::clock::Clock;

/// Wall time derived from Tokio's (pausable) clock.
struct TokioClock {
    origin: tokio::time::Instant,
    base: DateTime<Utc>,
}

impl TokioClock {
    fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
            base: Utc::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed()).unwrap_or_default();
        self.base + elapsed
    }
}

fn config() -> AsunaConfig {
    let mut config = AsunaConfig::default();
    config.persistence.enabled = false;
    config.llm.provider = "none".into();
    config.autonomous.tick_secs = 1;
    config.autonomous.environment_check_secs = 60;
    config.autonomous.memory_trigger_secs = 3_600;
    config.autonomous.proactive_chat_secs = 3_600;
    config.autonomous.file_organization_secs = 3_600;
    config.autonomous.seed = Some(21);
    config
}

fn collector(events: &Arc<Mutex<Vec<AutonomousEvent>>>) -> Arc<dyn EventSink> {
    let events = Arc::clone(events);
    Arc::new(FnSink::new(move |event: &AutonomousEvent| {
        events.lock().push(event.clone());
        Ok::<(), SinkError>(())
    }))
}

#[tokio::test(start_paused = true)]
async fn environment_checks_fire_on_schedule_and_stop_cleanly() {
    let session = SessionBuilder::new(config())
        .clock(Arc::new(TokioClock::new()))
        .build()
        .expect("build");
    let events = Arc::new(Mutex::new(Vec::new()));
    session.register_sink(BehaviorCategory::EnvironmentCheck, collector(&events));

    let handle = session.start_autonomous().expect("autonomous enabled");
    assert!(session.status().autonomous_running);
    assert!(session.start_autonomous().is_none(), "second start must be refused");

    tokio::time::sleep(Duration::from_secs(185)).await;
    let fired = events.lock().len();
    assert!((2..=3).contains(&fired), "fired {fired} times");
    assert!(events.lock().iter().all(|e| e.category == BehaviorCategory::EnvironmentCheck));

    handle.stop().await;
    assert!(!session.status().autonomous_running);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(events.lock().len(), fired, "no events after stop");
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_stops_the_loops() {
    let session = SessionBuilder::new(config())
        .clock(Arc::new(TokioClock::new()))
        .build()
        .expect("build");
    let events = Arc::new(Mutex::new(Vec::new()));
    session.register_sink(BehaviorCategory::EnvironmentCheck, collector(&events));

    drop(session.start_autonomous().expect("autonomous enabled"));
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert!(events.lock().is_empty());
    assert!(!session.status().autonomous_running);
}

#[test]
fn deterministic_ticks_match_across_identical_sessions() {
    let run = || {
        let start = Utc::now();
        let clock = asuna_core::clock::ManualClock::new(start);
        let mut cfg = config();
        cfg.autonomous.proactive_chat_secs = 30;
        let session = SessionBuilder::new(cfg)
            .clock(Arc::new(clock))
            .build()
            .expect("build");
        let scheduler = session.scheduler().expect("enabled");
        (1..=20)
            .flat_map(|m| scheduler.tick(start + chrono::Duration::seconds(m * 30)))
            .map(|e| (e.category, e.payload.message().to_string()))
            .collect::<Vec<_>>()
    };
    let first = run();
    assert!(!first.is_empty());
    assert_eq!(first, run());
}
