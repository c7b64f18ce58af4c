use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tripgen_rs::{
    GenerationBackend, GenerationError, GenerationPath, GenerationState, Itinerary,
    MemorySessionStorage, NormalizationReason, Orchestrator, SessionStorage, TripRequest,
    TripStore, LATEST_TRIP_KEY,
};

#[derive(Debug, Clone)]
enum Reply {
    /// Structured plan for the requested city
    Plan,
    Body(Value),
    Upstream(&'static str),
    Network(&'static str),
}

#[derive(Debug, Clone)]
struct Script {
    delay: Duration,
    reply: Reply,
}

impl Script {
    fn after(secs: u64, reply: Reply) -> Self {
        Self {
            delay: Duration::from_secs(secs),
            reply,
        }
    }

    async fn play(&self, request: &TripRequest) -> tripgen_rs::Result<Value> {
        tokio::time::sleep(self.delay).await;
        match &self.reply {
            Reply::Plan => Ok(plan_for(&request.city)),
            Reply::Body(body) => Ok(body.clone()),
            Reply::Upstream(message) => Err(GenerationError::upstream(Some(500), *message)),
            Reply::Network(message) => Err(GenerationError::NetworkFailure(message.to_string())),
        }
    }
}

#[derive(Debug)]
struct ScriptedBackend {
    primary: Script,
    fallback: Script,
    primary_calls: AtomicUsize,
    fallback_calls: AtomicUsize,
}

impl ScriptedBackend {
    fn new(primary: Script, fallback: Script) -> Arc<Self> {
        Arc::new(Self {
            primary,
            fallback,
            primary_calls: AtomicUsize::new(0),
            fallback_calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> (usize, usize) {
        (
            self.primary_calls.load(Ordering::SeqCst),
            self.fallback_calls.load(Ordering::SeqCst),
        )
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate_trip(&self, request: &TripRequest) -> tripgen_rs::Result<Value> {
        self.primary_calls.fetch_add(1, Ordering::SeqCst);
        self.primary.play(request).await
    }

    async fn generate_itinerary(&self, request: &TripRequest) -> tripgen_rs::Result<Value> {
        self.fallback_calls.fetch_add(1, Ordering::SeqCst);
        self.fallback.play(request).await
    }
}

fn plan_for(city: &str) -> Value {
    json!({
        "city": city,
        "days": [
            {
                "day_number": 1,
                "activities": [
                    {"name": format!("{city} 老城区"), "start_time": "09:00", "end_time": "11:30"}
                ]
            }
        ]
    })
}

fn beijing() -> TripRequest {
    TripRequest::new("Beijing", 2).with_preferences(["美食"])
}

fn orchestrator(backend: &Arc<ScriptedBackend>) -> Orchestrator {
    Orchestrator::from_shared(backend.clone())
}

#[tokio::test(start_paused = true)]
async fn test_primary_success_populates_defaults() {
    let primary = Reply::Body(json!({
        "days": [
            {"day_number": 1, "activities": [{"name": "故宫"}, {"name": "全聚德"}]},
            {"day_number": 2, "activities": [{"name": "长城"}]}
        ]
    }));
    let backend = ScriptedBackend::new(Script::after(2, primary), Script::after(0, Reply::Plan));
    let session = Arc::new(MemorySessionStorage::new());
    let orchestrator =
        orchestrator(&backend).with_store(Arc::new(TripStore::new(session.clone())));

    let outcome = orchestrator.submit(&beijing()).await.unwrap();

    assert_eq!(outcome.path, GenerationPath::Primary);
    assert_eq!(orchestrator.state(), GenerationState::Succeeded);
    assert_eq!(backend.calls(), (1, 0));

    let itinerary = &outcome.itinerary;
    assert_eq!(itinerary.city, "Beijing");
    assert_eq!(itinerary.days.len(), 2);
    for activity in itinerary.days.iter().flat_map(|day| &day.activities) {
        assert_eq!(activity.rating, Some(4.5));
        assert!(activity.tags.is_empty());
    }
    assert_eq!(itinerary.days[0].activities[1].id, "1-2");

    let stored = orchestrator.store().get().unwrap();
    assert_eq!(stored.as_ref(), itinerary.as_ref());

    let mirrored = session.get(LATEST_TRIP_KEY).unwrap().unwrap();
    let mirrored: Itinerary = serde_json::from_str(&mirrored).unwrap();
    assert_eq!(&mirrored, itinerary.as_ref());

    let progress = orchestrator.progress().current();
    assert!(progress.visible);
    assert_eq!(progress.value, 100.0);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!orchestrator.progress().current().visible);
}

#[tokio::test(start_paused = true)]
async fn test_primary_timeout_falls_back_once() {
    let backend = ScriptedBackend::new(
        Script::after(45, Reply::Plan),
        Script::after(5, Reply::Plan),
    );
    let orchestrator = orchestrator(&backend);

    let outcome = orchestrator.submit(&beijing()).await.unwrap();

    assert_eq!(outcome.path, GenerationPath::Fallback);
    assert_eq!(backend.calls(), (1, 1));
    assert_eq!(orchestrator.state(), GenerationState::Succeeded);
    let budget = orchestrator.config().primary_timeout;
    assert!(outcome.elapsed >= budget + Duration::from_secs(5));

    // the abandoned primary would have answered at 45s
    let stored = orchestrator.store().get().unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(Arc::ptr_eq(&stored, &orchestrator.store().get().unwrap()));
    assert_eq!(backend.calls(), (1, 1));
}

#[tokio::test(start_paused = true)]
async fn test_state_during_fallback() {
    let backend = ScriptedBackend::new(
        Script::after(45, Reply::Plan),
        Script::after(30, Reply::Plan),
    );
    let orchestrator = Arc::new(orchestrator(&backend));

    let task = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.submit(&beijing()).await })
    };

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(orchestrator.state(), GenerationState::Requesting);

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(orchestrator.state(), GenerationState::FallbackRequesting);
    let progress = orchestrator.progress().current();
    assert!(progress.visible);
    assert!(progress.value <= 95.0);

    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome.path, GenerationPath::Fallback);
}

#[tokio::test(start_paused = true)]
async fn test_primary_error_fails_without_fallback() {
    let backend = ScriptedBackend::new(
        Script::after(1, Reply::Upstream("AI generation failed")),
        Script::after(0, Reply::Plan),
    );
    let orchestrator = orchestrator(&backend);

    let err = orchestrator.submit(&beijing()).await.unwrap_err();

    match &err {
        GenerationError::UpstreamError { status, message } => {
            assert_eq!(*status, Some(500));
            assert_eq!(message, "AI generation failed");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.user_message(), "AI generation failed");
    assert_eq!(backend.calls(), (1, 0));
    assert_eq!(orchestrator.state(), GenerationState::Failed);
    assert!(orchestrator.store().get().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_network_failure_is_terminal() {
    let backend = ScriptedBackend::new(
        Script::after(0, Reply::Network("connection refused")),
        Script::after(0, Reply::Plan),
    );
    let orchestrator = orchestrator(&backend);

    let err = orchestrator.submit(&beijing()).await.unwrap_err();

    assert!(matches!(err, GenerationError::NetworkFailure(_)));
    assert_eq!(backend.calls(), (1, 0));
    assert_eq!(orchestrator.state(), GenerationState::Failed);
}

// Both endpoints fail upstream. Only a timeout hands over to the fallback, so the
// primary's error arrives after its wait budget and is never observed.
#[tokio::test(start_paused = true)]
async fn test_upstream_error_on_both_paths_keeps_previous_itinerary() {
    let store = Arc::new(TripStore::in_memory());

    let healthy = ScriptedBackend::new(Script::after(1, Reply::Plan), Script::after(0, Reply::Plan));
    orchestrator(&healthy)
        .with_store(store.clone())
        .submit(&beijing())
        .await
        .unwrap();

    let failing = ScriptedBackend::new(
        Script::after(30, Reply::Upstream("primary exploded late")),
        Script::after(3, Reply::Upstream("fallback generation failed")),
    );
    let orchestrator = orchestrator(&failing).with_store(store.clone());

    let err = orchestrator
        .submit(&TripRequest::new("Shanghai", 3))
        .await
        .unwrap_err();

    assert_eq!(err.user_message(), "fallback generation failed");
    assert_eq!(failing.calls(), (1, 1));
    assert_eq!(orchestrator.state(), GenerationState::Failed);
    assert_eq!(store.get().unwrap().city, "Beijing");

    let progress = orchestrator.progress().current();
    assert!(!progress.visible);
    assert!(progress.value < 100.0);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_timeout_is_terminal() {
    let backend = ScriptedBackend::new(
        Script::after(45, Reply::Plan),
        Script::after(120, Reply::Plan),
    );
    let orchestrator = orchestrator(&backend);

    let err = orchestrator.submit(&beijing()).await.unwrap_err();

    assert!(matches!(err, GenerationError::Timeout(_)));
    assert_eq!(backend.calls(), (1, 1));
    assert_eq!(orchestrator.state(), GenerationState::Failed);
    assert!(orchestrator.store().get().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_error_field_in_successful_body() {
    let backend = ScriptedBackend::new(
        Script::after(1, Reply::Body(json!({"error": "quota exceeded"}))),
        Script::after(0, Reply::Plan),
    );
    let orchestrator = orchestrator(&backend);

    let err = orchestrator.submit(&beijing()).await.unwrap_err();

    match err {
        GenerationError::UpstreamError { status, message } => {
            assert_eq!(status, None);
            assert_eq!(message, "quota exceeded");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(orchestrator.state(), GenerationState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_unrecognized_body_fails_normalization() {
    let backend = ScriptedBackend::new(
        Script::after(1, Reply::Body(json!({"status": "ok", "plan": null}))),
        Script::after(0, Reply::Plan),
    );
    let orchestrator = orchestrator(&backend);

    let err = orchestrator.submit(&beijing()).await.unwrap_err();

    match &err {
        GenerationError::Normalization(failure) => {
            assert_eq!(failure.reason, NormalizationReason::UnrecognizedShape);
            assert!(failure.fragment.contains("plan"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.error_code(), "NORMALIZATION_FAILURE");
    assert_eq!(orchestrator.state(), GenerationState::Failed);
    assert!(orchestrator.store().get().is_none());
    assert!(!orchestrator.progress().current().visible);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_request_never_leaves_idle() {
    let backend = ScriptedBackend::new(Script::after(0, Reply::Plan), Script::after(0, Reply::Plan));
    let orchestrator = orchestrator(&backend);

    let err = orchestrator
        .submit(&TripRequest::new("   ", 2))
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::InvalidRequest(_)));

    let err = orchestrator
        .submit(&TripRequest::new("Beijing", 31))
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::InvalidRequest(_)));

    assert_eq!(orchestrator.state(), GenerationState::Idle);
    assert_eq!(backend.calls(), (0, 0));
    assert!(!orchestrator.progress().current().visible);
}

#[tokio::test(start_paused = true)]
async fn test_new_submission_supersedes_in_flight_attempt() {
    let backend = ScriptedBackend::new(
        Script::after(10, Reply::Plan),
        Script::after(0, Reply::Plan),
    );
    let orchestrator = Arc::new(orchestrator(&backend));

    let first = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.submit(&TripRequest::new("Beijing", 2)).await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    let second = orchestrator
        .submit(&TripRequest::new("Chengdu", 2))
        .await
        .unwrap();

    let first = first.await.unwrap();
    assert!(matches!(first, Err(GenerationError::Superseded)));

    assert_eq!(second.itinerary.city, "Chengdu");
    assert_eq!(orchestrator.store().get().unwrap().city, "Chengdu");
    assert_eq!(orchestrator.state(), GenerationState::Succeeded);
    assert_eq!(backend.calls(), (2, 0));
}

#[tokio::test(start_paused = true)]
async fn test_superseded_attempt_cannot_fail_the_new_one() {
    let backend = ScriptedBackend::new(
        Script::after(10, Reply::Upstream("generation failed")),
        Script::after(0, Reply::Plan),
    );
    let orchestrator = Arc::new(orchestrator(&backend));

    let first = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.submit(&beijing()).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;

    let second = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.submit(&TripRequest::new("Chengdu", 1)).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(matches!(first.await.unwrap(), Err(GenerationError::Superseded)));

    // past the point where the first attempt's failure would have landed
    tokio::time::sleep(Duration::from_millis(8500)).await;
    assert_eq!(orchestrator.state(), GenerationState::Requesting);
    assert!(orchestrator.progress().current().visible);

    let err = second.await.unwrap().unwrap_err();
    assert_eq!(err.user_message(), "generation failed");
    assert_eq!(orchestrator.state(), GenerationState::Failed);
}
