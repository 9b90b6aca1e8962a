//! Conversation driver: request, dispatch, append, prune, repeat.

use std::sync::Arc;
use std::time::Duration;

use proto::{FunctionDeclaration, LoopError, ToolCall, Turn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tools::BrowserSession;
use tracing::{debug, info, warn};

use crate::{
    dispatcher::Dispatcher,
    event::{Event, emit},
    llm::{DEFAULT_MODEL, GenerateRequest, GenerationConfig, ModelClient},
    pruner::{self, DEFAULT_RECENT_TURNS_WITH_SCREENSHOTS, RetentionWindow},
    tool_registry::ToolRegistry,
};

/// tokio has no zero-capacity channel; one slot is the closest rendezvous.
const EVENT_CHANNEL_CAPACITY: usize = 1;

/// Everything one loop invocation needs.
pub struct LoopConfig {
    pub client: Arc<dyn ModelClient>,
    pub session: Arc<dyn BrowserSession>,
    /// Initial user prompt.
    pub prompt: String,
    /// Model id. Empty means [`DEFAULT_MODEL`].
    pub model: String,
    /// Caller-handled tools offered next to computer use.
    pub extra_tools: Vec<FunctionDeclaration>,
    /// Predefined computer-use functions the model must not call.
    pub excluded_functions: Vec<String>,
    /// `0` means the default of 3; negative keeps every screenshot.
    pub max_recent_turns_with_screenshots: i64,
    /// Upper bound on waiting for a custom call response. `None` waits forever.
    pub custom_call_timeout: Option<Duration>,
    /// Upper bound on model requests. `None` is unbounded.
    pub max_turns: Option<usize>,
}

impl LoopConfig {
    /// Creates a config with default model, window and no limits.
    pub fn new(
        client: Arc<dyn ModelClient>,
        session: Arc<dyn BrowserSession>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            client,
            session,
            prompt: prompt.into(),
            model: DEFAULT_MODEL.to_string(),
            extra_tools: Vec::new(),
            excluded_functions: Vec::new(),
            max_recent_turns_with_screenshots: DEFAULT_RECENT_TURNS_WITH_SCREENSHOTS as i64,
            custom_call_timeout: None,
            max_turns: None,
        }
    }
}

/// A running loop.
pub struct LoopHandle {
    /// Ordered events. Closes after the final `Progress` or an `Error`.
    pub events: mpsc::Receiver<Event>,
    /// Resolves to the final conversation history.
    pub task: JoinHandle<Vec<Turn>>,
}

/// Spawns the driver for `config` on the tokio runtime.
///
/// `cancel` stops the loop before its next request and unblocks any wait on
/// a custom call; browser actions already performed are not undone.
pub fn start_loop(config: LoopConfig, cancel: CancellationToken) -> LoopHandle {
    let (tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let task = tokio::spawn(run(config, tx, cancel));
    LoopHandle { events, task }
}

async fn run(
    config: LoopConfig,
    events: mpsc::Sender<Event>,
    cancel: CancellationToken,
) -> Vec<Turn> {
    let mut history = vec![Turn::user_text(config.prompt.clone())];
    info!(model = %model_id(&config), "Conversation loop started");

    match drive(&config, &mut history, &events, &cancel).await {
        Ok(turns) => info!(turns, "Conversation loop finished"),
        Err(LoopError::EventChannelClosed) => {
            warn!("Event receiver dropped, stopping conversation loop");
        }
        Err(err) => {
            warn!(error = %err, "Conversation loop failed");
            if events.send(Event::Error(err)).await.is_err() {
                debug!("Event receiver dropped before the error was delivered");
            }
        }
    }
    history
}

/// Runs turns until the model stops calling tools. Returns the number of requests.
async fn drive(
    config: &LoopConfig,
    history: &mut Vec<Turn>,
    events: &mpsc::Sender<Event>,
    cancel: &CancellationToken,
) -> Result<usize, LoopError> {
    let model = model_id(config);
    let generation = GenerationConfig::computer_use(
        config.extra_tools.clone(),
        config.excluded_functions.clone(),
    );
    let registry = ToolRegistry::without(&config.excluded_functions);
    let retention = RetentionWindow::from_config(config.max_recent_turns_with_screenshots);
    let dispatcher = Dispatcher {
        registry: &registry,
        session: config.session.as_ref(),
        events,
        cancel,
        custom_call_timeout: config.custom_call_timeout,
    };

    let mut turns = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(LoopError::Cancelled);
        }
        if let Some(max) = config.max_turns.filter(|max| turns >= *max) {
            return Err(LoopError::MaxTurnsExceeded(max));
        }
        turns += 1;

        debug!(turn = turns, history = history.len(), "Requesting model turn");
        let request = GenerateRequest {
            model,
            history: history.as_slice(),
            config: &generation,
        };
        let turn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LoopError::Cancelled),
            turn = config.client.generate(request) => turn?,
        };

        let text = turn.text();
        let calls: Vec<ToolCall> = turn.tool_calls().into_iter().cloned().collect();
        history.push(turn);

        if calls.is_empty() {
            emit(
                events,
                cancel,
                Event::Progress {
                    text,
                    calls: Vec::new(),
                },
            )
            .await?;
            return Ok(turns);
        }

        let results = dispatcher.dispatch(text, &calls).await?;
        history.push(Turn::tool_results(results));
        pruner::prune(history, retention);
    }
}

fn model_id(config: &LoopConfig) -> &str {
    if config.model.trim().is_empty() {
        DEFAULT_MODEL
    } else {
        &config.model
    }
}
