use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use gland_events::{
    config, CorrelationIdFactory, EmitOutcome, EventConfig, EventError, EventHook, EventManager,
    Listener, Phase, StrategyKind,
};
use serde_json::{json, Value};
use tokio::time::{sleep, timeout, Duration};

fn recorder(sink: Arc<Mutex<Vec<Value>>>) -> Listener {
    Listener::sync(move |event| {
        sink.lock().unwrap().push(event.data);
        Ok(Value::Null)
    })
}

#[tokio::test]
async fn test_emit_before_subscribe_is_replayed() {
    let manager = EventManager::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    manager.emit("x", json!({"d": 42})).await;
    manager.on("x", recorder(seen.clone())).await;

    assert_eq!(*seen.lock().unwrap(), vec![json!({"d": 42})]);
}

#[tokio::test]
async fn test_replay_delivers_every_queued_event() {
    let manager = EventManager::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    manager.emit("x", json!(1)).await;
    manager.emit("x:pre", json!(2)).await;
    manager.emit("x", json!(3)).await;
    assert_eq!(manager.queued_len("x"), 3);

    manager.on("x", recorder(seen.clone())).await;

    // newest first; the subscriber is drained only after the whole batch
    assert_eq!(*seen.lock().unwrap(), vec![json!(3), json!(2), json!(1)]);
    assert!(!manager.has_queue("x"));
    assert_eq!(manager.listener_count("x"), 0);
}

#[tokio::test]
async fn test_unsubscribed_type_drops_instead_of_queueing() {
    let manager = EventManager::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let subscription = manager.on("x", recorder(seen.clone())).await;
    subscription.unsubscribe();

    assert_eq!(manager.emit("x", json!("late")).await, EmitOutcome::Dropped);
    manager.on("x", recorder(seen.clone())).await;

    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_request_user_get() {
    let manager = EventManager::new();
    manager
        .on(
            "user:get",
            Listener::new(|event| async move {
                Ok(json!({"id": event.data["id"].clone(), "name": "Grace"}))
            }),
        )
        .await;

    let user = manager.request("user:get", json!({"id": "abc"})).await.unwrap();

    assert_eq!(user, json!({"id": "abc", "name": "Grace"}));
}

#[tokio::test]
async fn test_request_order_created() {
    let manager = EventManager::new();
    manager
        .on("order:created", Listener::sync(|_| Ok(json!({"status": "ok"}))))
        .await;

    let result = manager
        .request("order:created", json!({"orderId": 5}))
        .await
        .unwrap();

    assert_eq!(result, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_pay_without_listeners_queues_one() {
    let manager = EventManager::new();

    let outcome = manager.emit("pay", json!({"amount": 100})).await;

    assert_eq!(outcome, EmitOutcome::Queued { queue_len: 1 });
    assert_eq!(manager.queued_len("pay"), 1);
}

#[tokio::test]
async fn test_request_listeners_run_concurrently() {
    let manager = EventManager::new();
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    for key in ["a", "b", "c"] {
        let in_flight = in_flight.clone();
        let peak = peak.clone();
        manager
            .on(
                "stats",
                Listener::new(move |_| {
                    let in_flight = in_flight.clone();
                    let peak = peak.clone();
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        sleep(Duration::from_millis(20)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(json!({ key: true }))
                    }
                }),
            )
            .await;
    }

    let merged = manager.request("stats", Value::Null).await.unwrap();

    assert_eq!(merged, json!({"a": true, "b": true, "c": true}));
    assert_eq!(peak.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_failed_emit_is_visible_on_event_and_context() {
    let manager = EventManager::new();
    manager
        .on(
            "invoice:pre",
            Listener::sync(|_| Err(EventError::listener("rejected"))),
        )
        .await;

    let outcome = manager.emit("invoice:pre", json!({})).await;

    let event = match outcome {
        EmitOutcome::Dispatched(event) => event,
        other => panic!("expected dispatch, got {:?}", other),
    };
    assert_eq!(event.is_failure, Some(true));
    assert_eq!(event.phase, Phase::Fallback);
    let lifecycle = event.lifecycle.as_ref().unwrap();
    assert!(lifecycle.finished_at.is_some());
    assert!(lifecycle.duration_ms.unwrap() >= 0);
    assert_eq!(manager.context().failed_phase(), Some(Phase::Pre));
    assert!(manager.context().is_processed());
}

#[tokio::test]
async fn test_phases_share_one_type() {
    let manager = EventManager::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    manager
        .on(
            "order:validation",
            Listener::sync(move |event| {
                sink.lock().unwrap().push(event.phase);
                Ok(Value::Null)
            }),
        )
        .await;

    manager.emit("order:audit", Value::Null).await;

    assert_eq!(*seen.lock().unwrap(), vec![Phase::Audit]);
}

#[tokio::test]
async fn test_channel_round_trip_and_error_companion() {
    let manager = EventManager::new();
    let errors = Arc::new(Mutex::new(Vec::new()));

    let lookup = manager.channel("lookup");
    lookup
        .respond(|data| async move {
            match data["id"].as_i64() {
                Some(id) => Ok(json!({"id": id})),
                None => Err(EventError::listener("missing id")),
            }
        })
        .await
        .unwrap();
    assert_eq!(
        lookup.request(json!({"id": 3})).await.unwrap(),
        json!({"id": 3})
    );

    let sink = errors.clone();
    manager
        .on(
            &lookup.error_qualified(),
            Listener::sync(move |event| {
                if event.phase == Phase::Error {
                    sink.lock().unwrap().push(event.data);
                }
                Ok(Value::Null)
            }),
        )
        .await;
    lookup.emit(json!({})).await;

    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["error"], json!("Listener failed: missing id"));
    let correlation_id = errors[0]["correlationId"].as_str().unwrap();
    assert!(CorrelationIdFactory::validate(correlation_id));
}

#[derive(Default)]
struct Counting(AtomicUsize);

impl EventHook for Counting {
    fn on_error(&self, _: &EventError, _: &gland_events::Event, _: &Listener) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_default_pipeline_never_reaches_hooks() {
    let manager = EventManager::new();
    let hook = Arc::new(Counting::default());
    manager.add_hook(hook.clone());
    manager
        .on("job", Listener::sync(|_| Err(EventError::listener("x"))))
        .await;

    manager.emit("job", Value::Null).await;

    assert_eq!(hook.0.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_manager_from_json_config() {
    let config: EventConfig = config::from_str(
        r#"{"queue_capacity": 3, "namespace": "billing", "strategy": "queue"}"#,
    )
    .unwrap();
    assert_eq!(config.strategy, StrategyKind::Queue);
    let manager = EventManager::with_config(config).unwrap();

    for i in 0..10 {
        manager.emit("charge", json!(i)).await;
    }
    assert_eq!(manager.queued_len("charge"), 3);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    manager
        .on(
            "charge",
            Listener::sync(move |event| {
                sink.lock().unwrap().push(event.correlation_id.into_inner());
                Ok(Value::Null)
            }),
        )
        .await;

    let ids = seen.lock().unwrap();
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|id| id.ends_with("-billing")));
}

#[tokio::test]
async fn test_failing_responder_completes_under_every_strategy() {
    for strategy in [StrategyKind::Immediate, StrategyKind::Broadcast, StrategyKind::Queue] {
        let manager = EventManager::with_config(EventConfig {
            strategy,
            ..Default::default()
        })
        .unwrap();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        manager
            .on(
                "report:error",
                Listener::sync(move |event| {
                    if event.phase == Phase::Error {
                        sink.lock().unwrap().push(event.data);
                    }
                    Ok(Value::Null)
                }),
            )
            .await;
        let channel = manager.channel("report");
        channel
            .respond(|_| async { Err(EventError::listener("boom")) })
            .await
            .unwrap();

        let outcome = timeout(Duration::from_secs(2), channel.emit(json!({})))
            .await
            .unwrap_or_else(|_| panic!("emit under {} did not complete", strategy));

        assert!(matches!(outcome, EmitOutcome::Dispatched(_)), "{}", strategy);
        assert_eq!(errors.lock().unwrap().len(), 1, "{}", strategy);
    }
}

#[tokio::test]
async fn test_listener_emitting_from_inside_emit() {
    for strategy in [StrategyKind::Immediate, StrategyKind::Broadcast, StrategyKind::Queue] {
        let manager = EventManager::with_config(EventConfig {
            strategy,
            ..Default::default()
        })
        .unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let glue = manager.clone();
        let counter = calls.clone();
        manager
            .on(
                "tick",
                Listener::new(move |_| {
                    let glue = glue.clone();
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        glue.emit("tock", json!({"from": "tick"})).await;
                        Ok(Value::Null)
                    }
                }),
            )
            .await;
        let tock_calls = calls.clone();
        manager
            .on(
                "tock",
                Listener::sync(move |_| {
                    tock_calls.fetch_add(10, Ordering::SeqCst);
                    Ok(Value::Null)
                }),
            )
            .await;

        timeout(Duration::from_secs(2), manager.emit("tick", Value::Null))
            .await
            .unwrap_or_else(|_| panic!("nested emit under {} did not complete", strategy));

        assert_eq!(calls.load(Ordering::SeqCst), 11, "{}", strategy);
    }
}
