//! Drives one realtime voice session
//!
//! The controller owns the transport resources and the [`FunctionRegistry`].
//! Every input becomes a [`SessionEvent`]; the pure transition decides the next
//! state and the effects, which are executed here one at a time.
//!
//! While [`RealtimeSessionController::run`] owns the controller, hosts drive it
//! through a [`SessionHandle`].

use super::effect::Effect;
use super::event::{ClientEvent, ServerEvent, SessionEvent};
use super::state::{SessionContext, SessionState};
use super::transition::{transition, TransitionError};
use super::transport::{
    AudioTrack, ChannelEvent, ChannelEvents, DataChannel, HttpSignaling, HttpTokenSource,
    PeerTransport, Signaling, TokenSource, TransportFactory,
};
use crate::config::VoiceConfig;
use crate::error::ControlError;
use crate::functions::{FunctionDescriptor, FunctionRegistry, ToolError};
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

type TranscriptionHandler = Box<dyn Fn(&str) + Send + Sync>;

/// Host operations forwarded to a running event loop
#[derive(Debug)]
enum SessionCommand {
    Setup,
    Stop,
    SetContext(String),
    UpdateContext(String),
}

struct CommandRequest {
    command: SessionCommand,
    reply: oneshot::Sender<Result<(), ControlError>>,
}

/// Cloneable handle to a controller whose event loop is running
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<CommandRequest>,
}

impl SessionHandle {
    pub async fn setup_session(&self) -> Result<(), ControlError> {
        self.request(SessionCommand::Setup).await
    }

    pub async fn stop_session(&self) -> Result<(), ControlError> {
        self.request(SessionCommand::Stop).await
    }

    pub async fn set_context(&self, context: impl Into<String>) -> Result<(), ControlError> {
        self.request(SessionCommand::SetContext(context.into())).await
    }

    pub async fn update_context(&self, text: impl Into<String>) -> Result<(), ControlError> {
        self.request(SessionCommand::UpdateContext(text.into())).await
    }

    /// Queue `command` and wait for the loop to apply it
    async fn request(&self, command: SessionCommand) -> Result<(), ControlError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(CommandRequest { command, reply })
            .map_err(|_| ControlError::transport("session controller dropped"))?;
        response
            .await
            .map_err(|_| ControlError::transport("session controller dropped before replying"))?
    }
}

/// Transport resources held while a session exists
struct SessionResources {
    transport: Box<dyn PeerTransport>,
    tracks: Vec<Box<dyn AudioTrack>>,
    channel: Option<Arc<dyn DataChannel>>,
}

/// Controller for one persistent-transport conversation
pub struct RealtimeSessionController {
    session_id: String,
    config: VoiceConfig,
    registry: FunctionRegistry,
    state: SessionState,
    context: String,
    tokens: Arc<dyn TokenSource>,
    signaling: Arc<dyn Signaling>,
    transports: Arc<dyn TransportFactory>,
    resources: Option<SessionResources>,
    inbound: Option<ChannelEvents>,
    commands_tx: mpsc::UnboundedSender<CommandRequest>,
    commands: mpsc::UnboundedReceiver<CommandRequest>,
    transcription_handler: Option<TranscriptionHandler>,
}

impl RealtimeSessionController {
    /// Use the HTTP token service and signaling endpoint from `config`
    pub fn new(config: VoiceConfig, transports: Arc<dyn TransportFactory>) -> Self {
        let client = reqwest::Client::new();
        let tokens = Arc::new(HttpTokenSource::from_config(client.clone(), &config));
        let signaling = Arc::new(HttpSignaling::from_config(client, &config));
        Self::with_collaborators(config, tokens, signaling, transports)
    }

    pub fn with_collaborators(
        config: VoiceConfig,
        tokens: Arc<dyn TokenSource>,
        signaling: Arc<dyn Signaling>,
        transports: Arc<dyn TransportFactory>,
    ) -> Self {
        let context = config.initial_context.clone();
        let (commands_tx, commands) = mpsc::unbounded_channel();
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            config,
            registry: FunctionRegistry::new(),
            state: SessionState::Idle,
            context,
            tokens,
            signaling,
            transports,
            resources: None,
            inbound: None,
            commands_tx,
            commands,
            transcription_handler: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Handle for setup, stop and context changes while [`Self::run`] is live
    pub fn session_handle(&self) -> SessionHandle {
        SessionHandle {
            commands: self.commands_tx.clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.registry
    }

    /// Register a tool the provider may call during the session
    pub fn add_function<F, Fut>(
        &mut self,
        descriptor: FunctionDescriptor,
        func: F,
    ) -> Result<(), ControlError>
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        self.registry.register(descriptor, func)
    }

    /// Replace the transcript callback
    pub fn register_transcription_handler<F>(&mut self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.transcription_handler = Some(Box::new(handler));
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Start a session. A no-op with a warning when one is already live.
    ///
    /// Setup failures are returned and leave the session in a non-active state;
    /// call again to retry.
    pub async fn setup_session(&mut self) -> Result<(), ControlError> {
        self.apply(SessionEvent::SetupRequested).await
    }

    /// Release audio tracks, the data channel and the transport, in that order
    pub async fn stop_session(&mut self) -> Result<(), ControlError> {
        self.apply(SessionEvent::StopRequested).await
    }

    /// Update the held context; pushed immediately when active
    pub async fn set_context(&mut self, context: impl Into<String>) -> Result<(), ControlError> {
        self.context = context.into();
        self.apply(SessionEvent::ContextChanged).await
    }

    /// Push a system item without changing the held context
    pub async fn update_context(&mut self, text: impl Into<String>) -> Result<(), ControlError> {
        self.apply(SessionEvent::ContextPushed { text: text.into() })
            .await
    }

    /// Process one data-channel event.
    ///
    /// Malformed events are returned as [`ControlError::Protocol`] and dropped;
    /// the session continues.
    pub async fn handle_channel_event(&mut self, event: ChannelEvent) -> Result<(), ControlError> {
        let event = match event {
            ChannelEvent::Open => SessionEvent::ChannelOpened,
            ChannelEvent::Closed => SessionEvent::ChannelClosed,
            ChannelEvent::Message(text) => SessionEvent::ServerMessage(ServerEvent::parse(&text)?),
        };
        self.apply(event).await
    }

    /// Process channel events and handle commands until the session closes.
    ///
    /// Channel events are taken ahead of queued commands. Both queues live on
    /// the controller, so cancelling this future drops nothing; a later call
    /// resumes where it stopped.
    pub async fn run(&mut self) {
        loop {
            tokio::select! {
                biased;
                event = next_channel_event(&mut self.inbound) => match event {
                    Some(event) => {
                        if let Err(e) = self.handle_channel_event(event).await {
                            tracing::error!(session_id = %self.session_id, error = %e, "Dropped channel event");
                        }
                    }
                    None => {
                        tracing::info!(session_id = %self.session_id, "Data channel ended");
                        self.inbound = None;
                        if let Err(e) = self.apply(SessionEvent::ChannelClosed).await {
                            tracing::error!(session_id = %self.session_id, error = %e, "Failed to close session");
                        }
                    }
                },
                Some(request) = self.commands.recv() => {
                    tracing::debug!(session_id = %self.session_id, command = ?request.command, "Session command");
                    let result = self.execute_command(request.command).await;
                    let _ = request.reply.send(result);
                }
                else => break,
            }

            if self.state == SessionState::Closed {
                break;
            }
        }
        tracing::info!(session_id = %self.session_id, state = %self.state, "Session event loop finished");
    }

    async fn execute_command(&mut self, command: SessionCommand) -> Result<(), ControlError> {
        match command {
            SessionCommand::Setup => self.setup_session().await,
            SessionCommand::Stop => self.stop_session().await,
            SessionCommand::SetContext(context) => self.set_context(context).await,
            SessionCommand::UpdateContext(text) => self.update_context(text).await,
        }
    }

    // ========================================================================
    // Transition driver
    // ========================================================================

    fn session_context(&self) -> SessionContext {
        SessionContext {
            instructions: self.config.instructions.clone(),
            context: self.context.clone(),
            tools: self.registry.realtime_tools(),
        }
    }

    async fn apply(&mut self, event: SessionEvent) -> Result<(), ControlError> {
        let mut pending = VecDeque::from([event]);
        let mut outcome = Ok(());

        while let Some(event) = pending.pop_front() {
            let result = match transition(self.state, &self.session_context(), event) {
                Ok(result) => result,
                Err(TransitionError::AlreadyStarted(state)) => {
                    tracing::warn!(session_id = %self.session_id, state = %state, "Session already started, skipping setup");
                    continue;
                }
                Err(TransitionError::Protocol(message)) => {
                    return Err(ControlError::Protocol(message));
                }
                Err(e @ TransitionError::Ignored { .. }) => {
                    tracing::debug!(session_id = %self.session_id, "{e}");
                    continue;
                }
            };

            if result.new_state != self.state {
                tracing::info!(
                    session_id = %self.session_id,
                    from = %self.state,
                    to = %result.new_state,
                    "Session state changed"
                );
            }
            self.state = result.new_state;

            for effect in result.effects {
                match self.execute(effect).await {
                    Ok(Some(follow_up)) => pending.push_back(follow_up),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!(session_id = %self.session_id, error = %e, "Session setup failed");
                        pending.push_back(SessionEvent::NegotiationFailed {
                            message: e.to_string(),
                        });
                        outcome = Err(e);
                    }
                }
            }
        }

        outcome
    }

    /// Run one effect; may yield a follow-up event. Only `Connect` fails.
    async fn execute(&mut self, effect: Effect) -> Result<Option<SessionEvent>, ControlError> {
        match effect {
            Effect::Connect => {
                self.connect().await?;
                Ok(Some(SessionEvent::Negotiated))
            }
            Effect::Send(event) => {
                self.send(&event);
                Ok(None)
            }
            Effect::Transcript(text) => {
                tracing::debug!(session_id = %self.session_id, "Transcription received");
                match &self.transcription_handler {
                    Some(handler) => handler(&text),
                    None => tracing::warn!(session_id = %self.session_id, "No transcription handler registered"),
                }
                Ok(None)
            }
            Effect::InvokeFunction {
                call_id,
                name,
                arguments,
            } => {
                let output = self
                    .registry
                    .dispatch(&name, &arguments, self.config.unknown_tool_policy)
                    .await;
                if let Some(output) = output {
                    tracing::debug!(session_id = %self.session_id, function = %name, call_id = %call_id, "Sending function result");
                    self.send(&ClientEvent::function_output(call_id, output));
                }
                Ok(None)
            }
            Effect::ReleaseResources => {
                self.release_resources().await;
                Ok(None)
            }
        }
    }

    async fn connect(&mut self) -> Result<(), ControlError> {
        let token = self.tokens.fetch_token().await?;

        let transport = self.transports.create()?;
        let resources = self.resources.insert(SessionResources {
            transport,
            tracks: Vec::new(),
            channel: None,
        });

        resources.tracks = resources.transport.capture_audio().await?;
        let (channel, inbound) = resources
            .transport
            .create_data_channel(&self.config.data_channel_label)
            .await?;
        resources.channel = Some(channel);
        self.inbound = Some(inbound);

        let offer = resources.transport.create_offer().await?;
        tracing::info!(session_id = %self.session_id, "Sending offer to realtime endpoint");
        let answer = self.signaling.negotiate(&token, &offer).await?;
        resources.transport.apply_answer(&answer).await?;

        tracing::info!(session_id = %self.session_id, "Realtime session established");
        Ok(())
    }

    /// Fire-and-forget; failures are logged, never raised
    fn send(&self, event: &ClientEvent) {
        let Some(channel) = self.resources.as_ref().and_then(|r| r.channel.as_ref()) else {
            tracing::warn!(session_id = %self.session_id, "Data channel not initialized, dropping event");
            return;
        };
        let result = event.to_json().and_then(|text| channel.send(&text));
        if let Err(e) = result {
            tracing::warn!(session_id = %self.session_id, error = %e, "Failed to send event");
        }
    }

    /// Each release is guarded; missing or already-closed resources are skipped
    async fn release_resources(&mut self) {
        self.inbound = None;
        let Some(mut resources) = self.resources.take() else {
            return;
        };

        for track in &mut resources.tracks {
            if let Err(e) = track.stop() {
                tracing::warn!(session_id = %self.session_id, error = %e, "Failed to stop audio track");
            }
        }
        if let Some(channel) = resources.channel.take() {
            if let Err(e) = channel.close() {
                tracing::warn!(session_id = %self.session_id, error = %e, "Failed to close data channel");
            }
        }
        if let Err(e) = resources.transport.close().await {
            tracing::warn!(session_id = %self.session_id, error = %e, "Failed to close transport");
        }
        tracing::info!(session_id = %self.session_id, "Session resources released");
    }
}

/// Next event from the data channel; pending forever when there is none
async fn next_channel_event(inbound: &mut Option<ChannelEvents>) -> Option<ChannelEvent> {
    match inbound {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}
