//! End-to-end loop behaviour against a scripted model and a recording browser.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use agent::{Event, GenerateRequest, LoopConfig, LoopHandle, ModelClient, start_loop};
use async_trait::async_trait;
use parking_lot::Mutex;
use proto::{FunctionDeclaration, LlmError, LoopError, Part, Role, SettleError, ToolCall, Turn};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tools::ScrollDirection;
use tools::testing::{Action, RecordingSession};

const SEARCH_URL: &str = "https://google.com/search?q=go+tutorials";

/// Replays canned model turns and records each request's history.
struct ScriptedModel {
    turns: Mutex<VecDeque<Turn>>,
    seen: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedModel {
    fn new(turns: Vec<Turn>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> usize {
        self.seen.lock().len()
    }

    fn last_history(&self) -> Vec<Turn> {
        self.seen.lock().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn generate(&self, req: GenerateRequest<'_>) -> Result<Turn, LlmError> {
        self.seen.lock().push(req.history.to_vec());
        self.turns
            .lock()
            .pop_front()
            .ok_or_else(|| LlmError::Api("script exhausted".to_string()))
    }
}

fn model_turn(text: &str, calls: Vec<ToolCall>) -> Turn {
    let mut parts = vec![Part::text(text)];
    parts.extend(calls.into_iter().map(Part::ToolCall));
    Turn::new(Role::Model, parts)
}

fn navigate() -> ToolCall {
    ToolCall::new("navigate", json!({"url": SEARCH_URL}))
}

fn start(
    model: Arc<ScriptedModel>,
    session: Arc<RecordingSession>,
    configure: impl FnOnce(&mut LoopConfig),
) -> (LoopHandle, CancellationToken) {
    let mut config = LoopConfig::new(model, session, "Search for Go tutorials on Google");
    configure(&mut config);
    let cancel = CancellationToken::new();
    (start_loop(config, cancel.clone()), cancel)
}

async fn drain(handle: &mut LoopHandle) -> Vec<Event> {
    let mut events = Vec::new();
    while let Some(event) = handle.events.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn google_search_example() {
    let model = ScriptedModel::new(vec![
        model_turn("I'll search Google.", vec![navigate()]),
        model_turn("Here are the top Go tutorials.", vec![]),
    ]);
    let session = Arc::new(RecordingSession::new("https://www.google.com"));
    let (mut handle, _cancel) = start(model.clone(), session.clone(), |_| {});

    let events = drain(&mut handle).await;
    let history = handle.task.await.expect("loop task");

    assert_eq!(events.len(), 2);
    match &events[0] {
        Event::Progress { text, calls } => {
            assert_eq!(text, "I'll search Google.");
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].name(), "navigate");
            assert!(!calls[0].needs_action());
        }
        other => panic!("expected progress, got {other:?}"),
    }
    assert!(matches!(&events[1], Event::Progress { calls, .. } if calls.is_empty()));

    assert_eq!(session.browser_actions(), vec![Action::Navigate(SEARCH_URL.to_string())]);
    assert_eq!(model.requests(), 2);

    // prompt, model, tool results, final model turn
    assert_eq!(history.len(), 4);
    let Part::ToolResult(result) = &history[2].parts[0] else {
        panic!("expected tool result");
    };
    assert_eq!(result.name, "navigate");
    assert_eq!(result.payload["url"], SEARCH_URL);
    assert_eq!(result.attachments.len(), 1);
    assert_eq!(result.attachments[0].mime_type, "image/png");
}

#[tokio::test]
async fn custom_call_response_reaches_model() {
    let lookup = ToolCall::new("lookup_order", json!({"order_id": "A-17"}));
    let model = ScriptedModel::new(vec![
        model_turn("Checking the order.", vec![lookup]),
        model_turn("It shipped.", vec![]),
    ]);
    let session = Arc::new(RecordingSession::new("https://shop.example"));
    let (mut handle, _cancel) = start(model.clone(), session, |config| {
        config.extra_tools = vec![FunctionDeclaration::new(
            "lookup_order",
            "Finds an order",
            json!({"type": "object", "properties": {"order_id": {"type": "string"}}}),
        )];
    });

    match handle.events.recv().await {
        Some(Event::Progress { calls, .. }) => {
            assert!(calls[0].needs_action());
            assert_eq!(calls[0].args()["order_id"], "A-17");
            calls[0].respond(json!({"status": "shipped"})).expect("respond");
            assert_eq!(calls[0].respond(json!({})), Err(SettleError::AlreadySettled));
        }
        other => panic!("expected progress, got {other:?}"),
    }
    let rest = drain(&mut handle).await;
    assert_eq!(rest.len(), 1);

    let history = model.last_history();
    let Part::ToolResult(result) = &history[2].parts[0] else {
        panic!("expected tool result");
    };
    assert_eq!(result.name, "lookup_order");
    assert_eq!(result.payload["status"], "shipped");
    assert!(result.attachments.is_empty());
}

#[tokio::test]
async fn rejected_custom_call_ends_with_one_error() {
    let model = ScriptedModel::new(vec![
        model_turn("Checking.", vec![ToolCall::new("lookup_order", json!({}))]),
        model_turn("never requested", vec![]),
    ]);
    let session = Arc::new(RecordingSession::new("https://shop.example"));
    let (mut handle, _cancel) = start(model.clone(), session, |_| {});

    match handle.events.recv().await {
        Some(Event::Progress { calls, .. }) => calls[0].reject("backend down").expect("reject"),
        other => panic!("expected progress, got {other:?}"),
    }
    let rest = drain(&mut handle).await;

    assert_eq!(rest.len(), 1);
    assert!(matches!(
        &rest[0],
        Event::Error(LoopError::CustomRejected { cause, .. }) if cause == "backend down"
    ));
    assert_eq!(model.requests(), 1);
}

#[tokio::test]
async fn cancel_while_waiting_appends_no_results() {
    let model = ScriptedModel::new(vec![model_turn(
        "Need input.",
        vec![navigate(), ToolCall::new("ask_user", json!({"question": "Which one?"}))],
    )]);
    let session = Arc::new(RecordingSession::new("https://www.google.com"));
    let (mut handle, cancel) = start(model.clone(), session, |_| {});

    let calls = match handle.events.recv().await {
        Some(Event::Progress { calls, .. }) => calls,
        other => panic!("expected progress, got {other:?}"),
    };
    cancel.cancel();

    let rest = drain(&mut handle).await;
    let history = handle.task.await.expect("loop task");

    assert_eq!(rest.len(), 1);
    assert!(matches!(&rest[0], Event::Error(LoopError::Cancelled)));
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].role, Role::Model);
    assert_eq!(calls[1].respond(json!({})), Err(SettleError::Abandoned));
}

#[tokio::test]
async fn results_follow_call_order() {
    let model = ScriptedModel::new(vec![
        model_turn(
            "Several things at once.",
            vec![
                ToolCall::new("first_custom", json!({})),
                ToolCall::new("click_at", json!({"x": 100, "y": 200})),
                ToolCall::new("second_custom", json!({})),
                ToolCall::new("scroll_at", json!({"x": 50, "y": 50, "direction": "down"})),
            ],
        ),
        model_turn("Done.", vec![]),
    ]);
    let session = Arc::new(RecordingSession::new("https://www.google.com"));
    let (mut handle, _cancel) = start(model.clone(), session.clone(), |_| {});

    match handle.events.recv().await {
        Some(Event::Progress { calls, .. }) => {
            calls[2].respond(json!({"n": 2})).expect("respond");
            calls[0].respond(json!({"n": 1})).expect("respond");
        }
        other => panic!("expected progress, got {other:?}"),
    }
    drain(&mut handle).await;

    let history = model.last_history();
    let names: Vec<&str> = history[2]
        .parts
        .iter()
        .map(|part| match part {
            Part::ToolResult(result) => result.name.as_str(),
            other => panic!("unexpected part {other:?}"),
        })
        .collect();
    assert_eq!(names, vec!["first_custom", "click_at", "second_custom", "scroll_at"]);
    assert_eq!(
        session.browser_actions(),
        vec![
            Action::ClickAt(100, 200),
            Action::ScrollAt(50, 50, ScrollDirection::Down, 800),
        ]
    );
}

#[tokio::test]
async fn old_screenshots_are_pruned_between_turns() {
    let scroll = || ToolCall::new("scroll_document", json!({"direction": "down"}));
    let mut script: Vec<Turn> = (0..5)
        .map(|_| model_turn("Scrolling.", vec![scroll()]))
        .collect();
    script.push(model_turn("Reached the bottom.", vec![]));
    let model = ScriptedModel::new(script);
    let session = Arc::new(RecordingSession::new("https://go.dev/doc"));
    let (mut handle, _cancel) = start(model.clone(), session, |_| {});

    drain(&mut handle).await;
    let history = handle.task.await.expect("loop task");

    let kept: Vec<bool> = history
        .iter()
        .filter(|turn| turn.role == Role::User)
        .skip(1)
        .map(Turn::has_attachments)
        .collect();
    assert_eq!(kept, vec![false, false, true, true, true]);
    for turn in history.iter().filter(|turn| turn.role == Role::User).skip(1) {
        let Part::ToolResult(result) = &turn.parts[0] else {
            panic!("expected tool result");
        };
        assert_eq!(result.payload["url"], "https://go.dev/doc");
    }
}

#[tokio::test]
async fn negative_window_keeps_every_screenshot() {
    let mut script: Vec<Turn> = (0..5)
        .map(|_| model_turn("Going back.", vec![ToolCall::new("go_back", json!({}))]))
        .collect();
    script.push(model_turn("Done.", vec![]));
    let model = ScriptedModel::new(script);
    let session = Arc::new(RecordingSession::new("https://go.dev"));
    let (mut handle, _cancel) = start(model, session, |config| {
        config.max_recent_turns_with_screenshots = -1;
    });

    drain(&mut handle).await;
    let history = handle.task.await.expect("loop task");
    let with_screenshots = history.iter().filter(|turn| turn.has_attachments()).count();
    assert_eq!(with_screenshots, 5);
}

#[tokio::test]
async fn invalid_builtin_arguments_end_the_loop() {
    let model = ScriptedModel::new(vec![model_turn(
        "Typing.",
        vec![ToolCall::new("type_text_at", json!({"x": 100, "y": 200}))],
    )]);
    let session = Arc::new(RecordingSession::new("https://www.google.com"));
    let (mut handle, _cancel) = start(model, session.clone(), |_| {});

    let events = drain(&mut handle).await;
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[1],
        Event::Error(LoopError::Tool(proto::ToolError::InvalidArgument { field, .. })) if field == "text"
    ));
    assert!(session.browser_actions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unanswered_custom_call_times_out() {
    let model = ScriptedModel::new(vec![model_turn(
        "Waiting on you.",
        vec![ToolCall::new("ask_user", json!({}))],
    )]);
    let session = Arc::new(RecordingSession::new("https://www.google.com"));
    let (mut handle, _cancel) = start(model, session, |config| {
        config.custom_call_timeout = Some(Duration::from_secs(60));
    });

    let events = drain(&mut handle).await;
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[1],
        Event::Error(LoopError::CustomTimedOut { timeout, .. }) if *timeout == Duration::from_secs(60)
    ));
}

#[tokio::test]
async fn type_text_defaults_press_enter_and_clear() {
    let model = ScriptedModel::new(vec![
        model_turn(
            "Typing.",
            vec![ToolCall::new("type_text_at", json!({"x": 100, "y": 200, "text": "golang"}))],
        ),
        model_turn("Done.", vec![]),
    ]);
    let session = Arc::new(RecordingSession::new("https://www.google.com"));
    let (mut handle, _cancel) = start(model, session.clone(), |_| {});
    drain(&mut handle).await;

    assert_eq!(
        session.browser_actions(),
        vec![Action::TypeTextAt {
            x: 100,
            y: 200,
            text: "golang".to_string(),
            clear_before_typing: true,
            press_enter: true,
        }]
    );
}

#[tokio::test]
async fn cancel_during_safety_prompt_ends_with_one_error() {
    let flagged = ToolCall::new(
        "click_at",
        json!({
            "x": 10, "y": 20,
            "safety_decision": {"decision": "require_confirmation", "explanation": "Accept cookies?"}
        }),
    );
    let model = ScriptedModel::new(vec![model_turn("Clicking.", vec![flagged])]);
    let session = Arc::new(RecordingSession::new("https://www.google.com"));
    let (mut handle, cancel) = start(model.clone(), session.clone(), |_| {});

    assert!(matches!(handle.events.recv().await, Some(Event::Progress { .. })));
    let confirmation = match handle.events.recv().await {
        Some(Event::SafetyConfirmation { tool, explanation, confirmation }) => {
            assert_eq!(tool, "click_at");
            assert_eq!(explanation, "Accept cookies?");
            confirmation
        }
        other => panic!("expected safety confirmation, got {other:?}"),
    };
    cancel.cancel();

    let rest = drain(&mut handle).await;
    let history = handle.task.await.expect("loop task");

    assert_eq!(rest.len(), 1);
    assert!(matches!(&rest[0], Event::Error(LoopError::Cancelled)));
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].role, Role::Model);
    assert!(session.browser_actions().is_empty());
    assert_eq!(model.requests(), 1);
    assert_eq!(confirmation.approve(), Err(SettleError::Abandoned));
}

#[tokio::test]
async fn dropping_an_unsettled_handle_ends_with_one_error() {
    let model = ScriptedModel::new(vec![
        model_turn("Asking.", vec![ToolCall::new("ask_user", json!({}))]),
        model_turn("never requested", vec![]),
    ]);
    let session = Arc::new(RecordingSession::new("https://www.google.com"));
    let (mut handle, _cancel) = start(model.clone(), session, |_| {});

    match handle.events.recv().await {
        Some(Event::Progress { calls, .. }) => {
            assert!(calls[0].needs_action());
            drop(calls);
        }
        other => panic!("expected progress, got {other:?}"),
    }

    let rest = drain(&mut handle).await;
    let history = handle.task.await.expect("loop task");

    assert_eq!(rest.len(), 1);
    assert!(matches!(
        &rest[0],
        Event::Error(LoopError::HandleDropped { name }) if name == "ask_user"
    ));
    assert_eq!(history.len(), 2);
    assert_eq!(model.requests(), 1);
}
