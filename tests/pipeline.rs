use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use neb_lib::backend::AnnotationClient;
use neb_lib::consumers::{
    consumer_loop, AnnotationHandler, ConsumerStats, DecisionConsumer, PersistenceConsumer,
};
use neb_lib::db::Database;
use neb_lib::models::{ActivityKind, Annotation, Batch, ScreenSnapshot};
use neb_lib::pipeline::{
    Broadcaster, DriverConfig, PipelineController, PipelineDriver, TickOutcome,
};
use neb_lib::sensing::EventBuffer;
use neb_lib::tasks::{compute_task_id, TaskStateStore};

fn debugging_python() -> Arc<Annotation> {
    Arc::new(
        Annotation::new("Debugging Python", "Terminal", "shell", 0.9, ActivityKind::Blocked)
            .unwrap(),
    )
}

/// Labels every batch with whatever app the snapshot shows.
struct ScreenAnnotator;

#[async_trait]
impl AnnotationClient for ScreenAnnotator {
    async fn annotate(&self, batch: &Batch) -> Result<Annotation> {
        Annotation::new(
            "Debugging Python",
            batch.app().unwrap_or("unknown"),
            batch.window_title().unwrap_or(""),
            0.9,
            ActivityKind::Blocked,
        )
    }
}

struct Collector {
    name: &'static str,
    seen: Mutex<Vec<String>>,
    panic_on_first: bool,
}

#[async_trait]
impl AnnotationHandler for Collector {
    fn name(&self) -> &str {
        self.name
    }

    async fn handle(&self, annotation: Arc<Annotation>) -> Result<()> {
        let first = {
            let mut seen = self.seen.lock().unwrap();
            seen.push(annotation.task_label.clone());
            seen.len() == 1
        };
        if self.panic_on_first && first {
            panic!("{} handler blew up", self.name);
        }
        Ok(())
    }
}

#[tokio::test]
async fn repeated_detection_prompts_once() {
    let hub = Broadcaster::new(8);
    let state = TaskStateStore::new();
    let (decision, mut suggestions) = DecisionConsumer::new(state.clone(), 0.4, 8);
    let token = CancellationToken::new();
    let handle = tokio::spawn(consumer_loop(Arc::new(decision), hub.subscribe(), token));

    let annotation = debugging_python();
    assert_eq!(hub.publish(annotation.clone()).delivered, 1);
    assert_eq!(hub.publish(annotation.clone()).delivered, 1);
    drop(hub);

    let stats = handle.await.unwrap();
    assert_eq!(stats.handled, 2);

    let suggestion = suggestions.try_recv().expect("one suggestion");
    assert_eq!(suggestion.task_id, compute_task_id(&annotation));
    assert!(suggestions.try_recv().is_err());
    assert_eq!(state.current(), Some(compute_task_id(&annotation)));

    // The store agrees the task is no longer new.
    assert!(!state.update_current(&compute_task_id(&annotation)));
}

#[tokio::test]
async fn panic_in_one_consumer_does_not_starve_another() {
    let hub = Broadcaster::new(8);
    let faulty = Arc::new(Collector {
        name: "faulty",
        seen: Mutex::new(Vec::new()),
        panic_on_first: true,
    });
    let healthy = Arc::new(Collector {
        name: "healthy",
        seen: Mutex::new(Vec::new()),
        panic_on_first: false,
    });

    let token = CancellationToken::new();
    let faulty_task = tokio::spawn(consumer_loop(faulty.clone(), hub.subscribe(), token.clone()));
    let healthy_task = tokio::spawn(consumer_loop(healthy.clone(), hub.subscribe(), token.clone()));

    let report = hub.publish(debugging_python());
    assert_eq!(report.delivered, 2);
    hub.publish(debugging_python());
    drop(hub);

    let faulty_stats = faulty_task.await.unwrap();
    let healthy_stats = healthy_task.await.unwrap();

    assert_eq!(
        faulty_stats,
        ConsumerStats {
            handled: 1,
            failed: 0,
            panicked: 1
        }
    );
    assert_eq!(healthy_stats.handled, 2);
    assert_eq!(healthy.seen.lock().unwrap().len(), 2);
    assert_eq!(faulty.seen.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn buffered_activity_reaches_storage_and_decision() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(dir.path().join("neb.sqlite3")).unwrap();

    let buffer = EventBuffer::new();
    let hub = Broadcaster::new(8);
    let (decision, mut suggestions) = DecisionConsumer::new(TaskStateStore::new(), 0.4, 8);

    let driver = PipelineDriver::new(
        buffer.clone(),
        Arc::new(ScreenAnnotator),
        hub.clone(),
        DriverConfig {
            tick_interval: Duration::from_millis(20),
            annotate_timeout: Duration::from_secs(1),
            capture_timeout: Duration::from_secs(1),
            refresh_before_drain: false,
        },
    );

    buffer.update_snapshot(ScreenSnapshot::new("Terminal", "shell"));
    buffer.append_signal("python main.py");

    let consumers: Vec<Arc<dyn AnnotationHandler>> = vec![
        Arc::new(PersistenceConsumer::new(db.clone())),
        Arc::new(decision),
    ];
    let mut controller = PipelineController::new();
    controller.start(driver, &hub, consumers, None).unwrap();
    assert!(controller.is_running());

    let suggestion = tokio::time::timeout(Duration::from_secs(5), suggestions.recv())
        .await
        .expect("suggestion in time")
        .expect("channel open");
    assert_eq!(suggestion.annotation.app, "Terminal");

    // The retained snapshot keeps producing the same task; give it a few ticks.
    tokio::time::sleep(Duration::from_millis(100)).await;
    controller.stop().await.unwrap();
    assert!(!controller.is_running());

    assert!(suggestions.try_recv().is_err());
    let stored = db
        .get_annotations_for_task(&suggestion.task_id)
        .await
        .unwrap();
    assert!(!stored.is_empty());
    assert_eq!(hub.subscriber_count(), 0);
}

#[tokio::test]
async fn driver_tick_with_zero_subscribers_still_succeeds() {
    let buffer = EventBuffer::new();
    let hub = Broadcaster::new(1);
    let driver = PipelineDriver::new(
        buffer.clone(),
        Arc::new(ScreenAnnotator),
        hub,
        DriverConfig::default(),
    );

    buffer.append_signal("x");
    match driver.tick().await {
        TickOutcome::Published(report) => assert_eq!(report.delivered, 0),
        other => panic!("unexpected outcome {other:?}"),
    }
}
