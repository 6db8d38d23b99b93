use conversation::{
    ChatView, ControllerEvent, ControllerOptions, ConversationController, MessageStore,
    SequencerState, StatusPool,
};
use parking_lot::Mutex;
use providers::{SendRequest, Transport, TransportError};
use services::{KeyValueStore, MemoryStorage};
use shared::settings::TimingSettings;
use shared::{ChatMode, Endpoint, HistoryTurn, Message, Role, Usage};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const SESSION_KEY: &str = "session";

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Rendered(usize, Role, String),
    RemovedTransient,
    Status(String),
    Input(bool),
    Scrolled,
    Models(Vec<String>, Option<String>),
    Usage(Option<Usage>),
    Cleared,
}

#[derive(Default)]
struct RecordingView {
    calls: Vec<Call>,
}

impl RecordingView {
    fn status_lines(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Status(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn saw(&self, call: &Call) -> bool {
        self.calls.contains(call)
    }

    fn last_input_state(&self) -> Option<bool> {
        self.calls.iter().rev().find_map(|c| match c {
            Call::Input(enabled) => Some(*enabled),
            _ => None,
        })
    }
}

impl ChatView for RecordingView {
    fn render_message(&mut self, index: usize, message: &Message) {
        self.calls
            .push(Call::Rendered(index, message.role, message.content.clone()));
    }

    fn remove_transient(&mut self) {
        self.calls.push(Call::RemovedTransient);
    }

    fn render_status_line(&mut self, text: &str) {
        self.calls.push(Call::Status(text.to_string()));
    }

    fn set_input_enabled(&mut self, enabled: bool) {
        self.calls.push(Call::Input(enabled));
    }

    fn scroll_to_latest(&mut self) {
        self.calls.push(Call::Scrolled);
    }

    fn populate_model_options(&mut self, models: &[String], selected: Option<&str>) {
        self.calls
            .push(Call::Models(models.to_vec(), selected.map(str::to_string)));
    }

    fn show_usage(&mut self, usage: Option<&Usage>) {
        self.calls.push(Call::Usage(usage.copied()));
    }

    fn clear(&mut self) {
        self.calls.push(Call::Cleared);
    }
}

type Outcome = Result<Vec<Message>, TransportError>;

/// Transport that replays canned outcomes after a simulated latency
#[derive(Default)]
struct ScriptedTransport {
    replies: Mutex<VecDeque<(Duration, Outcome)>>,
    catalog: Mutex<Option<Result<Vec<String>, TransportError>>>,
    requests: Mutex<Vec<SendRequest>>,
    in_flight: AtomicUsize,
}

/// Counts a send as running until its future completes or is dropped
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedTransport {
    fn replying(latency: Duration, outcome: Outcome) -> Arc<Self> {
        let transport = Self::default();
        transport.replies.lock().push_back((latency, outcome));
        Arc::new(transport)
    }

    fn then(self: Arc<Self>, latency: Duration, outcome: Outcome) -> Arc<Self> {
        self.replies.lock().push_back((latency, outcome));
        self
    }

    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn with_catalog(self: Arc<Self>, catalog: Result<Vec<String>, TransportError>) -> Arc<Self> {
        *self.catalog.lock() = Some(catalog);
        self
    }

    fn requests(&self) -> Vec<SendRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: SendRequest) -> Outcome {
        let _running = InFlight::enter(&self.in_flight);
        let endpoint = request.endpoint;
        self.requests.lock().push(request);
        let next = self.replies.lock().pop_front();
        match next {
            Some((latency, outcome)) => {
                tokio::time::sleep(latency).await;
                outcome
            }
            None => Err(TransportError::Status {
                endpoint,
                status: 503,
            }),
        }
    }

    async fn list_models(&self) -> Result<Vec<String>, TransportError> {
        self.catalog
            .lock()
            .take()
            .unwrap_or(Err(TransportError::EmptyReply {
                endpoint: Endpoint::Models,
            }))
    }
}

fn controller(
    mode: ChatMode,
    options: ControllerOptions,
    store: MessageStore,
    transport: Arc<ScriptedTransport>,
) -> ConversationController<RecordingView> {
    let profile = mode.profile(&TimingSettings::default());
    ConversationController::with_seed(profile, options, store, transport, RecordingView::default(), 7)
}

fn basic(transport: Arc<ScriptedTransport>) -> ConversationController<RecordingView> {
    controller(
        ChatMode::Basic,
        ControllerOptions::default(),
        MessageStore::ephemeral(),
        transport,
    )
}

/// Feed events to the controller until a reply has been applied.
async fn pump_until_reply(c: &mut ConversationController<RecordingView>) {
    loop {
        let event = c.next_event().await.expect("channel open");
        let is_reply = matches!(event, ControllerEvent::Reply { .. });
        c.handle(event);
        if is_reply {
            return;
        }
    }
}

async fn pump_until_models(c: &mut ConversationController<RecordingView>) {
    loop {
        let event = c.next_event().await.expect("channel open");
        let is_models = matches!(event, ControllerEvent::Models(_));
        c.handle(event);
        if is_models {
            return;
        }
    }
}

fn assistant(content: &str) -> Outcome {
    Ok(vec![Message::assistant(content)])
}

#[tokio::test(start_paused = true)]
async fn test_blank_input_is_ignored() {
    let transport = ScriptedTransport::replying(Duration::ZERO, assistant("hi"));
    let mut c = basic(transport.clone());

    assert!(!c.submit(""));
    assert!(!c.submit("   \n\t "));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(c.transcript().is_empty());
    assert!(!c.is_pending());
    assert_eq!(c.sequencer().state(), SequencerState::Idle);
    assert!(transport.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_second_submit_while_pending_is_a_noop() {
    let transport = ScriptedTransport::replying(Duration::from_secs(2), assistant("hi"));
    let mut c = basic(transport.clone());

    assert!(c.submit("first"));
    assert!(!c.submit("second"));
    c.handle(ControllerEvent::Input("third".into()));
    assert_eq!(c.transcript().len(), 1);

    pump_until_reply(&mut c).await;

    assert_eq!(transport.requests().len(), 1);
    assert_eq!(transport.requests()[0].message, "first");
    assert_eq!(
        c.transcript(),
        &[Message::user("first"), Message::assistant("hi")]
    );
}

#[tokio::test(start_paused = true)]
async fn test_basic_round_trip() {
    let transport = ScriptedTransport::replying(Duration::from_secs(2), assistant("hi"));
    let mut c = basic(transport.clone());

    assert!(c.submit("  hello "));
    assert_eq!(c.transcript(), &[Message::user("hello")]);
    assert!(!c.input_enabled());
    assert_eq!(c.pending().map(|p| p.input_text.as_str()), Some("hello"));

    pump_until_reply(&mut c).await;

    assert_eq!(
        c.transcript(),
        &[Message::user("hello"), Message::assistant("hi")]
    );
    assert!(!c.store().has_transient());
    assert!(c.input_enabled());
    assert!(!c.is_pending());
    assert_eq!(c.sequencer().state(), SequencerState::Idle);

    // The placeholder was shown while waiting and taken down afterwards
    assert!(c.view().saw(&Call::Rendered(1, Role::Loading, String::new())));
    assert!(c.view().saw(&Call::RemovedTransient));
    assert!(c.view().saw(&Call::Rendered(1, Role::Assistant, "hi".into())));
    assert_eq!(c.view().last_input_state(), Some(true));

    let request = &transport.requests()[0];
    assert_eq!(request.endpoint, Endpoint::Send);
    assert_eq!(request.model, None);
    assert_eq!(request.history, None);
}

#[tokio::test(start_paused = true)]
async fn test_fast_reply_never_shows_placeholder() {
    let transport = ScriptedTransport::replying(Duration::from_millis(100), assistant("quick"));
    let mut c = basic(transport);

    c.submit("hello");
    pump_until_reply(&mut c).await;

    let timed_out = tokio::time::timeout(Duration::from_secs(120), c.next_event()).await;
    assert!(timed_out.is_err(), "no timer may fire after teardown");
    assert!(!c
        .view()
        .calls
        .iter()
        .any(|call| matches!(call, Call::Rendered(_, Role::Loading, _))));
    assert!(c.view().status_lines().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_slow_basic_request_alternates_status_pools() {
    let transport = ScriptedTransport::replying(Duration::from_millis(40_500), assistant("done"));
    let mut c = basic(transport);

    c.submit("how many 2 bedroom houses sold in 2008?");
    pump_until_reply(&mut c).await;

    let lines = c.view().status_lines();
    assert!(lines.len() >= 3, "got {:?}", lines);
    for (i, line) in lines.iter().enumerate() {
        let pool = if i % 2 == 0 {
            StatusPool::Formulating
        } else {
            StatusPool::Executing
        };
        assert!(pool.lines().contains(&line.as_str()), "line {} from wrong pool", i);
    }

    // Status lines are cosmetic and never enter the transcript
    assert_eq!(c.transcript().len(), 2);
    let timed_out = tokio::time::timeout(Duration::from_secs(120), c.next_event()).await;
    assert!(timed_out.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_llm_sends_history_and_persists() {
    let storage = Arc::new(MemoryStorage::new());
    let earlier = vec![Message::user("q1"), Message::assistant("a1")];
    storage
        .set(SESSION_KEY, &serde_json::to_string(&earlier).unwrap())
        .unwrap();

    let transport = ScriptedTransport::replying(
        Duration::from_secs(1),
        Ok(vec![Message::assistant("a2").with_model("gpt-3.5-turbo")]),
    );
    let mut c = controller(
        ChatMode::Llm,
        ControllerOptions::default(),
        MessageStore::durable(storage.clone(), SESSION_KEY),
        transport.clone(),
    );
    c.replay_transcript();
    assert!(c.view().saw(&Call::Rendered(1, Role::Assistant, "a1".into())));

    c.submit("q2");
    pump_until_reply(&mut c).await;

    let request = &transport.requests()[0];
    assert_eq!(request.endpoint, Endpoint::SendLlm);
    assert_eq!(request.model.as_deref(), Some("gpt-3.5-turbo"));
    assert_eq!(
        request.history.as_deref(),
        Some(
            &[
                HistoryTurn {
                    role: Role::User,
                    content: "q1".into()
                },
                HistoryTurn {
                    role: Role::Assistant,
                    content: "a1".into()
                },
                HistoryTurn {
                    role: Role::User,
                    content: "q2".into()
                },
            ][..]
        )
    );

    let reopened = MessageStore::durable(storage, SESSION_KEY);
    assert_eq!(reopened.messages(), c.transcript());
    assert_eq!(reopened.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_llm_error_reply_is_shown_but_not_persisted() {
    let storage = Arc::new(MemoryStorage::new());
    let transport = ScriptedTransport::replying(
        Duration::from_secs(1),
        Ok(vec![Message::error("Model not found.")]),
    );
    let mut c = controller(
        ChatMode::Llm,
        ControllerOptions::default(),
        MessageStore::durable(storage.clone(), SESSION_KEY),
        transport,
    );

    c.submit("q");
    pump_until_reply(&mut c).await;

    assert_eq!(c.transcript().last().map(|m| m.role), Some(Role::Error));
    assert!(storage.get(SESSION_KEY).unwrap().is_none());
    assert!(c.input_enabled());
}

#[tokio::test(start_paused = true)]
async fn test_llm_error_entry_is_stored_with_next_successful_reply() {
    let storage = Arc::new(MemoryStorage::new());
    let transport = ScriptedTransport::replying(
        Duration::from_secs(1),
        Ok(vec![Message::error("Model not found.")]),
    )
    .then(Duration::from_secs(1), assistant("42"));
    let mut c = controller(
        ChatMode::Llm,
        ControllerOptions::default(),
        MessageStore::durable(storage.clone(), SESSION_KEY),
        transport.clone(),
    );

    c.submit("q1");
    pump_until_reply(&mut c).await;
    assert!(storage.get(SESSION_KEY).unwrap().is_none());

    c.submit("q2");
    pump_until_reply(&mut c).await;

    let reopened = MessageStore::durable(storage, SESSION_KEY);
    let roles: Vec<Role> = reopened.messages().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Error, Role::User, Role::Assistant]);

    // The error entry is never sent back to the model
    let history = transport.requests()[1].history.clone().unwrap_or_default();
    assert!(history.iter().all(|turn| turn.role != Role::Error));
}

#[tokio::test(start_paused = true)]
async fn test_llm_shows_exactly_two_status_lines() {
    let transport = ScriptedTransport::replying(Duration::from_secs(60), assistant("slow"));
    let mut c = controller(
        ChatMode::Llm,
        ControllerOptions::default(),
        MessageStore::ephemeral(),
        transport,
    );

    c.submit("q");
    pump_until_reply(&mut c).await;

    let lines = c.view().status_lines();
    assert_eq!(lines.len(), 2);
    assert!(StatusPool::Formulating.lines().contains(&lines[0].as_str()));
    assert!(StatusPool::Executing.lines().contains(&lines[1].as_str()));
}

#[tokio::test(start_paused = true)]
async fn test_completion_model_selection_and_usage() {
    let usage = Usage {
        prompt_tokens: 21,
        completion_tokens: 5,
        total_tokens: 26,
    };
    let transport = ScriptedTransport::replying(
        Duration::from_secs(30),
        Ok(vec![Message::assistant("ok").with_model("gpt-4").with_usage(usage)]),
    )
    .with_catalog(Ok(vec![
        "gpt-4".into(),
        "text-embedding-ada-002".into(),
        "gpt-3.5".into(),
    ]));
    let mut c = controller(
        ChatMode::Completion,
        ControllerOptions::default(),
        MessageStore::ephemeral(),
        transport.clone(),
    );

    c.load_model_options();
    pump_until_models(&mut c).await;

    assert_eq!(c.models(), &["gpt-4".to_string(), "gpt-3.5".to_string()]);
    // The configured default is not offered, so the first entry is selected
    assert_eq!(c.selected_model(), Some("gpt-4"));

    c.select_model("gpt-3.5");
    c.select_model("text-embedding-ada-002");
    assert_eq!(c.selected_model(), Some("gpt-3.5"));

    c.submit("summarise sales");
    pump_until_reply(&mut c).await;

    let request = &transport.requests()[0];
    assert_eq!(request.endpoint, Endpoint::SendCompletion);
    assert_eq!(request.model.as_deref(), Some("gpt-3.5"));
    assert!(c.view().saw(&Call::Usage(None)));
    assert_eq!(
        c.view()
            .calls
            .iter()
            .rev()
            .find(|call| matches!(call, Call::Usage(_))),
        Some(&Call::Usage(Some(usage)))
    );
    assert!(c.view().status_lines().is_empty());
    assert_eq!(c.transcript()[1].usage, Some(usage));
}

#[tokio::test(start_paused = true)]
async fn test_failed_catalog_leaves_selector_unpopulated() {
    let transport = ScriptedTransport::replying(Duration::ZERO, assistant("x")).with_catalog(Err(
        TransportError::Status {
            endpoint: Endpoint::Models,
            status: 500,
        },
    ));
    let mut c = controller(
        ChatMode::Completion,
        ControllerOptions::default(),
        MessageStore::ephemeral(),
        transport,
    );

    c.load_model_options();
    pump_until_models(&mut c).await;

    assert!(c.models().is_empty());
    assert_eq!(c.selected_model(), Some("gpt-3.5-turbo"));
    assert!(!c
        .view()
        .calls
        .iter()
        .any(|call| matches!(call, Call::Models(..))));
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_surfaces_error_entry() {
    let transport = ScriptedTransport::replying(
        Duration::from_secs(2),
        Err(TransportError::Status {
            endpoint: Endpoint::Send,
            status: 502,
        }),
    );
    let mut c = basic(transport);

    c.submit("hello");
    pump_until_reply(&mut c).await;

    let roles: Vec<Role> = c.transcript().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Error]);
    assert!(c.transcript()[1].content.contains("502"));
    assert!(c.input_enabled());
    assert_eq!(c.sequencer().state(), SequencerState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_can_stay_log_only() {
    let transport = ScriptedTransport::replying(
        Duration::from_secs(2),
        Err(TransportError::EmptyReply {
            endpoint: Endpoint::Send,
        }),
    );
    let options = ControllerOptions {
        surface_transport_errors: false,
        ..ControllerOptions::default()
    };
    let mut c = controller(ChatMode::Basic, options, MessageStore::ephemeral(), transport);

    c.submit("hello");
    pump_until_reply(&mut c).await;

    let roles: Vec<Role> = c.transcript().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Loading]);
    assert!(c.input_enabled());

    // The leftover placeholder is cleared by the next submission
    assert!(c.submit("again"));
    let roles: Vec<Role> = c.transcript().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::User]);
}

#[tokio::test(start_paused = true)]
async fn test_reset_abandons_pending_request() {
    let storage = Arc::new(MemoryStorage::new());
    storage
        .set(
            SESSION_KEY,
            &serde_json::to_string(&vec![Message::user("old")]).unwrap(),
        )
        .unwrap();
    let transport = ScriptedTransport::replying(Duration::from_secs(5), assistant("late"));
    let mut c = controller(
        ChatMode::Llm,
        ControllerOptions::default(),
        MessageStore::durable(storage.clone(), SESSION_KEY),
        transport,
    );

    c.submit("new question");
    c.handle(ControllerEvent::Reset);

    assert_eq!(c.transcript(), &[Message::boundary()]);
    assert!(storage.get(SESSION_KEY).unwrap().is_none());
    assert!(c.input_enabled());
    assert!(!c.is_pending());
    assert!(c.view().saw(&Call::Cleared));

    // The abandoned request never answers
    let quiet = tokio::time::timeout(Duration::from_secs(30), c.next_event()).await;
    assert!(quiet.is_err());
    assert_eq!(c.transcript(), &[Message::boundary()]);
    assert!(storage.get(SESSION_KEY).unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reset_then_submit_keeps_one_request_in_flight() {
    let transport = ScriptedTransport::replying(Duration::from_secs(30), assistant("first"))
        .then(Duration::from_secs(30), assistant("second"));
    let mut c = basic(transport.clone());

    c.submit("first");
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(transport.in_flight(), 1);

    c.handle(ControllerEvent::Reset);
    assert!(c.submit("second"));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(transport.in_flight(), 1);
    assert_eq!(transport.requests().len(), 2);

    pump_until_reply(&mut c).await;
    assert_eq!(c.transcript().last(), Some(&Message::assistant("second")));
    assert_eq!(transport.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_pending_reply() {
    let transport = ScriptedTransport::replying(Duration::from_secs(1), assistant("bye"));
    let mut c = basic(transport);

    c.submit("last question");
    assert!(c.handle(ControllerEvent::Shutdown));

    let mut keep_going = true;
    while keep_going {
        let event = c.next_event().await.unwrap();
        keep_going = c.handle(event);
    }
    assert_eq!(c.transcript().last(), Some(&Message::assistant("bye")));
}
