use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use shared::{
    domain::TaskId,
    protocol::{Artifact, ServerEvent},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};

pub mod backend;
pub mod clip;
pub mod config;
pub mod duplicate_gate;
pub mod error;
mod poller;
pub mod reconciler;
pub mod registry;
pub mod submission;
pub mod transport;

pub use backend::{HttpTaskBackend, TaskBackend};
pub use clip::{ClipOutput, ClipRange};
pub use config::{ClientSettings, DuplicateCheckPolicy};
pub use duplicate_gate::{
    AlwaysProceed, Confirmation, DuplicateConfirmer, GateDecision, SubmissionOutcome,
};
pub use error::{ClientError, Result, ValidationError};
pub use registry::{RegistrySnapshot, TaskPatch, TaskRegistry};
pub use submission::SubmissionBatch;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub enum ClientEvent {
    RegistryChanged(RegistrySnapshot),
    Server(ServerEvent),
    StreamConnected,
    StreamDisconnected,
    Error(String),
}

#[async_trait]
pub trait ClientHandle: Send + Sync {
    async fn start_session(&self) -> Result<()>;
    async fn submit(&self, batch: SubmissionBatch) -> Result<Vec<TaskId>>;
    async fn submit_checked(
        &self,
        batch: SubmissionBatch,
        confirmer: &dyn DuplicateConfirmer,
    ) -> Result<SubmissionOutcome>;
    async fn refresh_status(&self) -> Result<()>;
    async fn snapshot(&self) -> RegistrySnapshot;
    async fn list_genres(&self) -> Result<Vec<String>>;
    async fn list_artifacts(&self) -> Result<Vec<Artifact>>;
    async fn fetch_artifact_bytes(&self, path: &str) -> Result<Vec<u8>>;
    async fn cut_clip(&self, artifact: &Artifact, start: f64, end: f64) -> Result<ClipOutput>;
    fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent>;
}

/// Owns the task registry and funnels every mutation through one lock, so
/// submission results, stream events and poll results never interleave.
pub struct DownloadClient {
    backend: Arc<dyn TaskBackend>,
    settings: ClientSettings,
    registry: Mutex<TaskRegistry>,
    session: Mutex<SessionState>,
    events: broadcast::Sender<ClientEvent>,
}

#[derive(Default)]
struct SessionState {
    stream: Option<JoinHandle<()>>,
    poller: Option<JoinHandle<()>>,
}

impl DownloadClient {
    pub fn new(settings: ClientSettings) -> Result<Arc<Self>> {
        let backend = HttpTaskBackend::from_settings(&settings)?;
        Ok(Self::with_backend(settings, Arc::new(backend)))
    }

    pub fn with_backend(settings: ClientSettings, backend: Arc<dyn TaskBackend>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            backend,
            settings,
            registry: Mutex::new(TaskRegistry::new()),
            session: Mutex::new(SessionState::default()),
            events,
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> RegistrySnapshot {
        self.registry.lock().await.snapshot()
    }

    /// Runs `f` against the registry and publishes a snapshot if it changed.
    /// The notification is sent while the lock is held so subscribers see
    /// revisions in order.
    pub(crate) async fn mutate<R>(&self, f: impl FnOnce(&mut TaskRegistry) -> R) -> R {
        let mut registry = self.registry.lock().await;
        let before = registry.revision();
        let result = f(&mut registry);
        if registry.revision() != before {
            let _ = self
                .events
                .send(ClientEvent::RegistryChanged(registry.snapshot()));
        }
        result
    }

    /// Single reconciliation entry point for live events.
    pub async fn ingest_event(self: &Arc<Self>, event: ServerEvent) {
        let reaction = self
            .mutate(|registry| reconciler::apply_event(registry, &event))
            .await;
        let _ = self.events.send(ClientEvent::Server(event));
        if reaction.refresh {
            self.schedule_refresh(std::time::Duration::ZERO);
        }
    }

    /// Initial refresh, live stream and periodic poller. A failed initial
    /// refresh is retried by the poller. A failed stream connect is reported
    /// as `ClientEvent::Error` and the session falls back to polling.
    pub async fn start_session(self: &Arc<Self>) -> Result<()> {
        if let Err(err) = self.refresh_status().await {
            warn!(error = %err, "session: initial status refresh failed");
        }

        if let Err(err) = self.connect_events().await {
            warn!(error = %err, "session: event stream unavailable, polling only");
            let _ = self
                .events
                .send(ClientEvent::Error(format!("event stream unavailable: {err}")));
        }

        let mut session = self.session.lock().await;
        if session.poller.is_none() {
            session.poller = Some(self.spawn_status_poller());
        }
        info!(server_url = %self.settings.server_url, "session: started");
        Ok(())
    }

    /// Stops the stream reader and the poller. In-flight requests finish on
    /// their own.
    pub async fn shutdown(&self) {
        let mut session = self.session.lock().await;
        if let Some(stream) = session.stream.take() {
            stream.abort();
        }
        if let Some(poller) = session.poller.take() {
            poller.abort();
        }
    }

    pub async fn connect_events(self: &Arc<Self>) -> Result<()> {
        let ws_url = transport::events_url(&self.settings.server_url)?;

        let mut session = self.session.lock().await;
        if session
            .stream
            .as_ref()
            .is_some_and(|stream| !stream.is_finished())
        {
            return Ok(());
        }

        let (ws_stream, _) = connect_async(ws_url.as_str()).await.map_err(|err| {
            ClientError::Stream(format!("failed to connect websocket {ws_url}: {err}"))
        })?;
        let (_, mut ws_reader) = ws_stream.split();

        let client = Arc::clone(self);
        let stream = tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match transport::decode_event(&text) {
                        Ok(event) => client.ingest_event(event).await,
                        Err(err) => {
                            warn!(error = %err, "stream: invalid server event");
                            let _ = client
                                .events
                                .send(ClientEvent::Error(format!("invalid server event: {err}")));
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "stream: websocket receive failed");
                        let _ = client.events.send(ClientEvent::Error(format!(
                            "websocket receive failed: {err}"
                        )));
                        break;
                    }
                }
            }
            info!("stream: disconnected");
            let _ = client.events.send(ClientEvent::StreamDisconnected);
        });

        session.stream = Some(stream);
        info!(%ws_url, "stream: connected");
        let _ = self.events.send(ClientEvent::StreamConnected);
        Ok(())
    }

    pub async fn list_genres(&self) -> Result<Vec<String>> {
        self.backend.list_genres().await
    }

    pub async fn list_artifacts(&self) -> Result<Vec<Artifact>> {
        self.backend.list_artifacts().await
    }

    pub async fn fetch_artifact_bytes(&self, path: &str) -> Result<Vec<u8>> {
        self.backend.fetch_artifact_bytes(path).await
    }
}

#[async_trait]
impl ClientHandle for Arc<DownloadClient> {
    async fn start_session(&self) -> Result<()> {
        DownloadClient::start_session(self).await
    }

    async fn submit(&self, batch: SubmissionBatch) -> Result<Vec<TaskId>> {
        DownloadClient::submit(self, batch).await
    }

    async fn submit_checked(
        &self,
        batch: SubmissionBatch,
        confirmer: &dyn DuplicateConfirmer,
    ) -> Result<SubmissionOutcome> {
        DownloadClient::submit_checked(self, batch, confirmer).await
    }

    async fn refresh_status(&self) -> Result<()> {
        DownloadClient::refresh_status(self).await
    }

    async fn snapshot(&self) -> RegistrySnapshot {
        DownloadClient::snapshot(self).await
    }

    async fn list_genres(&self) -> Result<Vec<String>> {
        DownloadClient::list_genres(self).await
    }

    async fn list_artifacts(&self) -> Result<Vec<Artifact>> {
        DownloadClient::list_artifacts(self).await
    }

    async fn fetch_artifact_bytes(&self, path: &str) -> Result<Vec<u8>> {
        DownloadClient::fetch_artifact_bytes(self, path).await
    }

    async fn cut_clip(&self, artifact: &Artifact, start: f64, end: f64) -> Result<ClipOutput> {
        DownloadClient::cut_clip(self, artifact, start, end).await
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
