//! One tokio task per draft.
//!
//! The task owns the [`WorkflowController`] so every mutation is serialised
//! through its command channel. Collaborator calls run in spawned tasks and
//! report back on a completion channel; the command that triggered them gets
//! its reply only once the outcome has been folded in. While a call is in
//! flight the task keeps serving commands, so views stay readable and a second
//! advance or submit is refused instead of queued. Once the draft is
//! submitted the task replies with the receipt and stops.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::blueprint::FinancingBlueprint;
use super::controller::{ControllerState, Ticket, Transition, WorkflowController, WorkflowView};
use super::domain::{DraftId, FieldValue, InstrumentType, ReceiptPath};
use super::draft::{DraftIdSource, DraftStore, RandomDraftIds};
use super::error::WorkflowError;
use super::ports::{CallOutcome, Collaborators, PendingCall};
use super::valuation::ValuationConfig;

const COMMAND_BUFFER: usize = 32;

pub type ViewResult = Result<WorkflowView, WorkflowError>;

type SessionMap = Mutex<HashMap<DraftId, FinancingSession>>;

/// Shared construction inputs for every session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub blueprint: Arc<FinancingBlueprint>,
    pub valuation: ValuationConfig,
    pub collaborator_timeout: Duration,
    pub draft_ids: Arc<dyn DraftIdSource>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            blueprint: Arc::new(FinancingBlueprint::standard()),
            valuation: ValuationConfig::default(),
            collaborator_timeout: Duration::from_secs(30),
            draft_ids: Arc::new(RandomDraftIds),
        }
    }
}

enum Command {
    View(oneshot::Sender<WorkflowView>),
    UpdateFields {
        fields: Vec<(String, FieldValue)>,
        reply: oneshot::Sender<ViewResult>,
    },
    ChooseBranch {
        path: ReceiptPath,
        reply: oneshot::Sender<ViewResult>,
    },
    Advance(oneshot::Sender<ViewResult>),
    Back(oneshot::Sender<ViewResult>),
    Submit(oneshot::Sender<ViewResult>),
    Close(oneshot::Sender<()>),
}

/// Handle to a running draft session. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FinancingSession {
    draft_id: DraftId,
    commands: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::View(_) => "view",
            Command::UpdateFields { .. } => "update_fields",
            Command::ChooseBranch { .. } => "choose_branch",
            Command::Advance(_) => "advance",
            Command::Back(_) => "back",
            Command::Submit(_) => "submit",
            Command::Close(_) => "close",
        };
        f.write_str(name)
    }
}

impl FinancingSession {
    /// Open a draft and spawn the task that owns it.
    pub fn start(
        instrument: InstrumentType,
        collaborators: Collaborators,
        settings: &SessionSettings,
    ) -> Result<(Self, WorkflowView), WorkflowError> {
        Self::spawn(instrument, collaborators, settings, None)
    }

    fn spawn(
        instrument: InstrumentType,
        collaborators: Collaborators,
        settings: &SessionSettings,
        registry: Option<Weak<SessionMap>>,
    ) -> Result<(Self, WorkflowView), WorkflowError> {
        let mut controller = WorkflowController::with_store(
            DraftStore::with_ids(settings.draft_ids.clone()),
            settings.blueprint.clone(),
            settings.valuation.clone(),
        );
        let draft_id = controller.start(instrument)?.id.clone();
        let view = controller.view();

        let (commands, inbox) = mpsc::channel(COMMAND_BUFFER);
        let (completions, completed) = mpsc::unbounded_channel();
        let actor = SessionActor {
            draft_id: draft_id.clone(),
            registry,
            controller,
            collaborators,
            timeout: settings.collaborator_timeout,
            inbox,
            completions,
            completed,
            waiter: None,
        };
        tokio::spawn(actor.run());
        info!(draft_id = %draft_id, ?instrument, "financing session started");

        Ok((Self { draft_id, commands }, view))
    }

    pub fn draft_id(&self) -> &DraftId {
        &self.draft_id
    }

    pub async fn view(&self) -> Result<WorkflowView, WorkflowError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::View(reply)).await?;
        response.await.map_err(|_| WorkflowError::SessionUnavailable)
    }

    pub async fn update_fields(&self, fields: Vec<(String, FieldValue)>) -> ViewResult {
        self.request(|reply| Command::UpdateFields { fields, reply }).await
    }

    pub async fn update_field(&self, field: &str, value: impl Into<FieldValue>) -> ViewResult {
        self.update_fields(vec![(field.to_string(), value.into())]).await
    }

    pub async fn choose_receipt_path(&self, path: ReceiptPath) -> ViewResult {
        self.request(|reply| Command::ChooseBranch { path, reply }).await
    }

    /// Resolves after any collaborator call the step triggers has finished.
    pub async fn advance(&self) -> ViewResult {
        self.request(Command::Advance).await
    }

    pub async fn back(&self) -> ViewResult {
        self.request(Command::Back).await
    }

    pub async fn submit(&self) -> ViewResult {
        self.request(Command::Submit).await
    }

    /// Abandon the draft. Any waiter receives [`WorkflowError::Abandoned`].
    pub async fn close(&self) {
        let (reply, response) = oneshot::channel();
        if self.send(Command::Close(reply)).await.is_ok() {
            let _ = response.await;
        }
    }

    async fn request(
        &self,
        build: impl FnOnce(oneshot::Sender<ViewResult>) -> Command,
    ) -> ViewResult {
        let (reply, response) = oneshot::channel();
        self.send(build(reply)).await?;
        response.await.map_err(|_| WorkflowError::SessionUnavailable)?
    }

    async fn send(&self, command: Command) -> Result<(), WorkflowError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| WorkflowError::SessionUnavailable)
    }
}

struct SessionActor {
    draft_id: DraftId,
    registry: Option<Weak<SessionMap>>,
    controller: WorkflowController,
    collaborators: Collaborators,
    timeout: Duration,
    inbox: mpsc::Receiver<Command>,
    completions: mpsc::UnboundedSender<(Ticket, CallOutcome)>,
    completed: mpsc::UnboundedReceiver<(Ticket, CallOutcome)>,
    waiter: Option<oneshot::Sender<ViewResult>>,
}

impl SessionActor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.inbox.recv() => match command {
                    Some(Command::Close(reply)) => {
                        self.shutdown();
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle(command),
                    None => {
                        self.shutdown();
                        break;
                    }
                },
                Some((ticket, outcome)) = self.completed.recv() => {
                    self.resolve(ticket, outcome);
                    if self.controller.state() == ControllerState::Submitted {
                        info!(draft_id = %self.draft_id, "financing session finished");
                        break;
                    }
                }
            }
        }
    }

    fn handle(&mut self, command: Command) {
        debug!(?command, "session command");
        match command {
            Command::View(reply) => {
                let _ = reply.send(self.controller.view());
            }
            Command::UpdateFields { fields, reply } => {
                let result = self.controller.update_fields(fields);
                self.reply_now(reply, result);
            }
            Command::ChooseBranch { path, reply } => {
                let result = self.controller.choose_receipt_path(path);
                self.reply_now(reply, result);
            }
            Command::Advance(reply) => {
                let result = self.controller.advance();
                self.settle(reply, result);
            }
            Command::Back(reply) => {
                let result = self.controller.back();
                self.settle(reply, result);
            }
            Command::Submit(reply) => {
                let result = self.controller.begin_submit();
                self.settle(reply, result);
            }
            Command::Close(reply) => {
                self.shutdown();
                let _ = reply.send(());
            }
        }
        self.release_orphaned_waiter();
    }

    fn reply_now(&self, reply: oneshot::Sender<ViewResult>, result: Result<(), WorkflowError>) {
        let _ = reply.send(result.map(|()| self.controller.view()));
    }

    fn settle(&mut self, reply: oneshot::Sender<ViewResult>, result: Result<Transition, WorkflowError>) {
        match result {
            Ok(Transition::Suspended { ticket, call }) => {
                self.dispatch(ticket, call);
                self.waiter = Some(reply);
            }
            Ok(_) => {
                let _ = reply.send(Ok(self.controller.view()));
            }
            Err(error) => {
                let _ = reply.send(Err(error));
            }
        }
    }

    fn dispatch(&self, ticket: Ticket, call: PendingCall) {
        let collaborators = self.collaborators.clone();
        let completions = self.completions.clone();
        let limit = self.timeout;
        tokio::spawn(async move {
            let outcome = collaborators.dispatch(call, limit).await;
            if completions.send((ticket, outcome)).is_err() {
                debug!("session closed before collaborator answered");
            }
        });
    }

    fn resolve(&mut self, ticket: Ticket, outcome: CallOutcome) {
        match self.controller.complete(&ticket, outcome) {
            Ok(Transition::Ignored) => {
                debug!(draft_id = %ticket.draft_id, sequence = ticket.sequence, "late outcome ignored");
            }
            result => {
                let reply = result.map(|_| self.controller.view());
                if self.controller.state() == ControllerState::Submitted {
                    self.deregister();
                }
                match self.waiter.take() {
                    Some(waiter) => {
                        let _ = waiter.send(reply);
                    }
                    None => warn!(draft_id = %ticket.draft_id, "outcome arrived with nobody waiting"),
                }
            }
        }
    }

    /// A back step can cancel the call someone is waiting on.
    fn release_orphaned_waiter(&mut self) {
        if !self.controller.is_busy() {
            if let Some(waiter) = self.waiter.take() {
                let _ = waiter.send(Err(WorkflowError::Abandoned));
            }
        }
    }

    /// Drop the registry entry so the submitted draft is no longer reachable.
    fn deregister(&mut self) {
        let Some(sessions) = self.registry.take().and_then(|sessions| sessions.upgrade()) else {
            return;
        };
        sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.draft_id);
    }

    fn shutdown(&mut self) {
        if let Some(waiter) = self.waiter.take() {
            let _ = waiter.send(Err(WorkflowError::Abandoned));
        }
        if self.controller.close() {
            info!("financing session closed");
        }
    }
}

/// Live sessions keyed by draft id.
///
/// Entries leave the map when the draft is deleted or once it is submitted.
pub struct DraftRegistry {
    sessions: Arc<SessionMap>,
    collaborators: Collaborators,
    settings: SessionSettings,
}

impl DraftRegistry {
    pub fn new(collaborators: Collaborators, settings: SessionSettings) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            collaborators,
            settings,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn open(&self, instrument: InstrumentType) -> Result<WorkflowView, WorkflowError> {
        let (session, view) = FinancingSession::spawn(
            instrument,
            self.collaborators.clone(),
            &self.settings,
            Some(Arc::downgrade(&self.sessions)),
        )?;
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.draft_id().clone(), session);
        Ok(view)
    }

    pub fn session(&self, draft_id: &DraftId) -> Option<FinancingSession> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(draft_id)
            .cloned()
    }

    /// Close and forget a session. Returns `false` when the id is unknown.
    pub async fn close(&self, draft_id: &DraftId) -> bool {
        let session = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(draft_id);

        match session {
            Some(session) => {
                session.close().await;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
