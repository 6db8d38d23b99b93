//! One query at a time: validate → load → dispatch → resolve → render.
//!
//! The controller is the single consumer of its event channel. Timers, the
//! transport call and the input source only send [`ControllerEvent`]s, so all
//! transcript and view mutation happens on one logical thread.

use providers::{selectable_models, SendRequest, Transport, TransportError};
use shared::settings::ClientSettings;
use shared::{ChatMode, Message, ModeProfile, Role};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::sequencer::{LoadingCue, LoadingSequencer, TickSink, TimerTick};
use crate::store::MessageStore;
use crate::view::ChatView;

#[derive(Debug)]
pub enum ControllerEvent {
    /// Raw text from the input box
    Input(String),
    SelectModel(String),
    LoadModels,
    Reset,
    Timer(TimerTick),
    Reply {
        request_id: u64,
        outcome: Result<Vec<Message>, TransportError>,
    },
    Models(Result<Vec<String>, TransportError>),
    Shutdown,
}

/// The request currently awaiting a reply
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub id: u64,
    pub input_text: String,
    pub mode: ChatMode,
    pub model: Option<String>,
    pub started_at: Instant,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Selected until the catalog says otherwise
    pub default_model: Option<String>,
    /// Catalog entry never offered for selection
    pub excluded_model: String,
    pub surface_transport_errors: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self::from(&ClientSettings::default())
    }
}

impl From<&ClientSettings> for ControllerOptions {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            default_model: Some(settings.default_model.clone()).filter(|m| !m.is_empty()),
            excluded_model: settings.excluded_model.clone(),
            surface_transport_errors: settings.surface_transport_errors,
        }
    }
}

pub struct ConversationController<V: ChatView> {
    profile: ModeProfile,
    options: ControllerOptions,
    store: MessageStore,
    sequencer: LoadingSequencer,
    transport: Arc<dyn Transport>,
    view: V,
    pending: Option<PendingRequest>,
    /// Transport task serving `pending`
    in_flight: Option<JoinHandle<()>>,
    next_request_id: u64,
    input_enabled: bool,
    models: Vec<String>,
    selected_model: Option<String>,
    shutdown_requested: bool,
    events_tx: UnboundedSender<ControllerEvent>,
    events_rx: UnboundedReceiver<ControllerEvent>,
}

impl<V: ChatView> ConversationController<V> {
    pub fn new(
        profile: ModeProfile,
        options: ControllerOptions,
        store: MessageStore,
        transport: Arc<dyn Transport>,
        view: V,
    ) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        let sequencer = LoadingSequencer::for_profile(&profile, Self::tick_sink(&events_tx));
        Self::assemble(profile, options, store, sequencer, transport, view, events_tx, events_rx)
    }

    /// Same as [`Self::new`] with a seeded sequencer.
    pub fn with_seed(
        profile: ModeProfile,
        options: ControllerOptions,
        store: MessageStore,
        transport: Arc<dyn Transport>,
        view: V,
        seed: u64,
    ) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        let sequencer = LoadingSequencer::with_seed(
            profile.placeholder_delay,
            profile.status_lines,
            Self::tick_sink(&events_tx),
            seed,
        );
        Self::assemble(profile, options, store, sequencer, transport, view, events_tx, events_rx)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        profile: ModeProfile,
        options: ControllerOptions,
        store: MessageStore,
        sequencer: LoadingSequencer,
        transport: Arc<dyn Transport>,
        view: V,
        events_tx: UnboundedSender<ControllerEvent>,
        events_rx: UnboundedReceiver<ControllerEvent>,
    ) -> Self {
        let selected_model = if profile.sends_model {
            options.default_model.clone()
        } else {
            None
        };
        Self {
            profile,
            options,
            store,
            sequencer,
            transport,
            view,
            pending: None,
            in_flight: None,
            next_request_id: 0,
            input_enabled: true,
            models: Vec::new(),
            selected_model,
            shutdown_requested: false,
            events_tx,
            events_rx,
        }
    }

    fn tick_sink(events_tx: &UnboundedSender<ControllerEvent>) -> TickSink {
        let tx = events_tx.clone();
        Arc::new(move |tick| {
            let _ = tx.send(ControllerEvent::Timer(tick));
        })
    }

    /// Handle for input sources.
    pub fn sender(&self) -> UnboundedSender<ControllerEvent> {
        self.events_tx.clone()
    }

    pub async fn next_event(&mut self) -> Option<ControllerEvent> {
        self.events_rx.recv().await
    }

    /// Process events until shutdown.
    pub async fn run(&mut self) {
        while let Some(event) = self.events_rx.recv().await {
            if !self.handle(event) {
                break;
            }
        }
        self.abort_in_flight();
        self.sequencer.cancel_all();
    }

    /// Apply one event. Returns `false` once the controller should stop.
    pub fn handle(&mut self, event: ControllerEvent) -> bool {
        match event {
            ControllerEvent::Input(text) => {
                self.submit(&text);
            }
            ControllerEvent::SelectModel(id) => self.select_model(&id),
            ControllerEvent::LoadModels => self.load_model_options(),
            ControllerEvent::Reset => self.reset(),
            ControllerEvent::Timer(tick) => self.on_timer(tick),
            ControllerEvent::Reply {
                request_id,
                outcome,
            } => self.on_reply(request_id, outcome),
            ControllerEvent::Models(outcome) => self.on_models(outcome),
            ControllerEvent::Shutdown => {
                if self.pending.is_some() {
                    tracing::info!("shutdown deferred until the pending reply arrives");
                    self.shutdown_requested = true;
                } else {
                    return false;
                }
            }
        }
        !(self.shutdown_requested && self.pending.is_none())
    }

    /// Draw every entry already in the transcript (restored sessions).
    pub fn replay_transcript(&mut self) {
        for (index, message) in self.store.messages().iter().enumerate() {
            self.view.render_message(index, message);
        }
        if !self.store.is_empty() {
            self.view.scroll_to_latest();
        }
        self.view.set_input_enabled(self.input_enabled);
    }

    /// Start a query. Returns `false` (and does nothing) for blank input or
    /// while another query is pending.
    pub fn submit(&mut self, raw: &str) -> bool {
        let text = raw.trim();
        if text.is_empty() {
            tracing::debug!("ignoring blank input");
            return false;
        }
        if self.pending.is_some() {
            tracing::debug!("ignoring input while a request is pending");
            return false;
        }

        // A placeholder left behind by a failed request belongs to that turn.
        if self.store.remove_transient() {
            self.view.remove_transient();
        }

        let index = self.store.append(Message::user(text));
        self.view.render_message(index, &self.store.messages()[index]);
        self.view.scroll_to_latest();
        self.set_input_enabled(false);
        if self.profile.shows_usage_stats {
            self.view.show_usage(None);
        }

        self.sequencer.begin();

        let model = if self.profile.sends_model {
            self.selected_model.clone()
        } else {
            None
        };
        let history = self.profile.uses_history.then(|| self.store.history());
        let request = SendRequest::new(self.profile.endpoint, text)
            .with_model(model.clone())
            .with_history(history);

        self.next_request_id += 1;
        let id = self.next_request_id;
        self.pending = Some(PendingRequest {
            id,
            input_text: text.to_string(),
            mode: self.profile.mode,
            model,
            started_at: Instant::now(),
        });
        tracing::info!(
            request = id,
            endpoint = %self.profile.endpoint,
            model = self.selected_model.as_deref().unwrap_or("-"),
            "query dispatched"
        );

        let transport = Arc::clone(&self.transport);
        let tx = self.events_tx.clone();
        self.in_flight = Some(tokio::spawn(async move {
            let outcome = transport.send(request).await;
            let _ = tx.send(ControllerEvent::Reply {
                request_id: id,
                outcome,
            });
        }));
        true
    }

    pub fn select_model(&mut self, id: &str) {
        let id = id.trim();
        if id.is_empty() {
            return;
        }
        if !self.models.is_empty() && !self.models.iter().any(|m| m == id) {
            tracing::warn!(model = id, "model is not in the catalog");
            return;
        }
        self.selected_model = Some(id.to_string());
        self.view
            .populate_model_options(&self.models, self.selected_model.as_deref());
    }

    /// Fetch the catalog; the result arrives as [`ControllerEvent::Models`].
    pub fn load_model_options(&mut self) {
        if !self.profile.sends_model {
            tracing::debug!(mode = %self.profile.mode, "mode has no model selection");
            return;
        }
        let transport = Arc::clone(&self.transport);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let outcome = transport.list_models().await;
            let _ = tx.send(ControllerEvent::Models(outcome));
        });
    }

    /// Begin a new session.
    pub fn reset(&mut self) {
        self.sequencer.cancel_all();
        if let Some(dropped) = self.pending.take() {
            tracing::info!(request = dropped.id, "pending request abandoned by reset");
        }
        self.abort_in_flight();
        let index = self.store.reset();
        self.view.clear();
        self.view.render_message(index, &self.store.messages()[index]);
        self.view.scroll_to_latest();
        if self.profile.shows_usage_stats {
            self.view.show_usage(None);
        }
        self.set_input_enabled(true);
    }

    fn on_timer(&mut self, tick: TimerTick) {
        match self.sequencer.accept(tick) {
            Some(LoadingCue::Placeholder) => {
                if self.pending.is_none() || self.store.has_transient() {
                    return;
                }
                let index = self.store.append(Message::loading());
                self.view.render_message(index, &self.store.messages()[index]);
                self.view.scroll_to_latest();
            }
            Some(LoadingCue::StatusLine { text, .. }) => {
                self.view.render_status_line(&text);
                self.view.scroll_to_latest();
            }
            None => {}
        }
    }

    fn on_reply(&mut self, request_id: u64, outcome: Result<Vec<Message>, TransportError>) {
        let pending = match self.pending.take() {
            Some(p) if p.id == request_id => p,
            other => {
                self.pending = other;
                tracing::warn!(request = request_id, "discarding reply for an abandoned request");
                return;
            }
        };
        self.in_flight = None;
        self.sequencer.cancel_all();
        let elapsed_ms = pending.started_at.elapsed().as_millis() as u64;

        match outcome {
            Ok(mut messages) => {
                if self.store.remove_transient() {
                    self.view.remove_transient();
                }
                let reply = match messages.pop() {
                    Some(m) if matches!(m.role, Role::Assistant | Role::Error) => m,
                    Some(m) => {
                        tracing::warn!(role = m.role.as_str(), "unexpected reply role");
                        Message::error(format!("Unexpected reply of type '{}'.", m.role.as_str()))
                    }
                    None => Message::error("The server returned an empty reply."),
                };
                tracing::info!(
                    request = request_id,
                    elapsed_ms,
                    role = reply.role.as_str(),
                    "reply received"
                );

                let is_error = reply.role == Role::Error;
                let index = self.store.append(reply);
                let reply = &self.store.messages()[index];
                self.view.render_message(index, reply);
                self.view.scroll_to_latest();
                if self.profile.shows_usage_stats {
                    self.view.show_usage(reply.usage.as_ref());
                }
                if self.profile.persists && !is_error {
                    if let Err(e) = self.store.persist() {
                        tracing::warn!(error = %e, "could not persist transcript");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(request = request_id, elapsed_ms, error = %e, "query failed");
                if self.options.surface_transport_errors {
                    if self.store.remove_transient() {
                        self.view.remove_transient();
                    }
                    let index = self.store.append(Message::error(format!(
                        "The request could not be completed ({}). Please try again.",
                        e
                    )));
                    self.view.render_message(index, &self.store.messages()[index]);
                    self.view.scroll_to_latest();
                }
            }
        }

        self.set_input_enabled(true);
    }

    fn on_models(&mut self, outcome: Result<Vec<String>, TransportError>) {
        let catalog = match outcome {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::warn!(error = %e, "could not load model catalog");
                return;
            }
        };
        let models = selectable_models(catalog, &self.options.excluded_model);
        if models.is_empty() {
            tracing::warn!("model catalog is empty");
            return;
        }

        let keep_selection = self
            .selected_model
            .as_ref()
            .is_some_and(|m| models.contains(m));
        if !keep_selection {
            self.selected_model = models.first().cloned();
        }
        tracing::info!(count = models.len(), "model catalog loaded");
        self.models = models;
        self.view
            .populate_model_options(&self.models, self.selected_model.as_deref());
    }

    fn abort_in_flight(&mut self) {
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
    }

    fn set_input_enabled(&mut self, enabled: bool) {
        self.input_enabled = enabled;
        self.view.set_input_enabled(enabled);
    }

    pub fn transcript(&self) -> &[Message] {
        self.store.messages()
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn selected_model(&self) -> Option<&str> {
        self.selected_model.as_deref()
    }

    pub fn sequencer(&self) -> &LoadingSequencer {
        &self.sequencer
    }

    pub fn profile(&self) -> &ModeProfile {
        &self.profile
    }

    pub fn view(&self) -> &V {
        &self.view
    }
}
