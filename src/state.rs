use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::checker::{FreshnessChecker, ADDING_MESSAGE, ANALYZING_MESSAGE};
use crate::core::embeddings::EmbeddingProvider;
use crate::error::{AppError, Result};

/// Configuration for the application
#[derive(Clone, Debug)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_addr: SocketAddr,
    /// Maximum request body size in bytes
    pub max_upload_size: usize,
    /// Allowed file extensions for uploads
    pub allowed_extensions: Vec<String>,
    /// Maximum number of open sessions
    pub max_sessions: usize,
    /// Sessions untouched for this long are closed
    pub session_idle_timeout: Duration,
    /// Embedding model configuration
    pub model: ModelConfig,
}

/// Embedding model configuration
#[derive(Clone, Debug)]
pub struct ModelConfig {
    /// Serialized ResNet-18 weights
    pub weights_path: PathBuf,
    /// Side length of the square network input
    pub input_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            max_upload_size: 20 * 1024 * 1024, // 20MB
            allowed_extensions: vec!["jpg", "jpeg", "png", "webp", "gif"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_sessions: 1024,
            session_idle_timeout: Duration::from_secs(30 * 60),
            model: ModelConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            weights_path: PathBuf::from("models/resnet18.ot"),
            input_size: 224,
        }
    }
}

impl Config {
    /// Build a configuration from `FRESHCHECK_*` environment variables,
    /// falling back to the defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = read_var("FRESHCHECK_BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .map_err(|e| AppError::Config(format!("FRESHCHECK_BIND_ADDR '{}': {}", addr, e)))?;
        }
        if let Some(size) = read_var("FRESHCHECK_MAX_UPLOAD_SIZE") {
            config.max_upload_size = size.parse().map_err(|e| {
                AppError::Config(format!("FRESHCHECK_MAX_UPLOAD_SIZE '{}': {}", size, e))
            })?;
        }
        if let Some(list) = read_var("FRESHCHECK_ALLOWED_EXTENSIONS") {
            let extensions: Vec<String> = list
                .split(',')
                .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect();
            if extensions.is_empty() {
                return Err(AppError::Config(
                    "FRESHCHECK_ALLOWED_EXTENSIONS lists no extensions".to_string(),
                ));
            }
            config.allowed_extensions = extensions;
        }
        if let Some(max) = read_var("FRESHCHECK_MAX_SESSIONS") {
            config.max_sessions = parse_positive("FRESHCHECK_MAX_SESSIONS", &max)?;
        }
        if let Some(secs) = read_var("FRESHCHECK_SESSION_IDLE_SECS") {
            config.session_idle_timeout =
                Duration::from_secs(parse_positive("FRESHCHECK_SESSION_IDLE_SECS", &secs)?);
        }
        if let Some(path) = read_var("FRESHCHECK_MODEL_WEIGHTS") {
            config.model.weights_path = PathBuf::from(path);
        }
        if let Some(size) = read_var("FRESHCHECK_MODEL_INPUT_SIZE") {
            config.model.input_size = parse_positive("FRESHCHECK_MODEL_INPUT_SIZE", &size)?;
        }

        Ok(config)
    }
}

fn read_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_positive<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr + Default + PartialOrd,
{
    match value.trim().parse::<T>() {
        Ok(n) if n > T::default() => Ok(n),
        _ => Err(AppError::Config(format!(
            "{} '{}' is not a positive integer",
            name, value
        ))),
    }
}

/// Public model status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    /// Initialization still running.
    Loading,
    /// Ready for inference.
    Ready,
    /// Initialization failed; not retried.
    Failed,
}

/// Lifecycle of the shared embedding model.
#[derive(Debug, Clone)]
pub enum ModelState {
    /// Initialization still running.
    Loading,
    /// Loaded provider shared by every session.
    Ready(Arc<dyn EmbeddingProvider>),
    /// Initialization failed with the given message.
    Failed(String),
}

impl ModelState {
    /// Settle the state from the result of [`load_model`](crate::core::embeddings::load_model).
    ///
    /// A failure is logged here, once.
    pub fn from_load(result: Result<Arc<dyn EmbeddingProvider>>) -> Self {
        match result {
            Ok(provider) => Self::Ready(provider),
            Err(e) => {
                log::error!("Failed loading embedding model: {}", e);
                Self::Failed(e.to_string())
            }
        }
    }

    /// Public status.
    pub fn status(&self) -> ModelStatus {
        match self {
            Self::Loading => ModelStatus::Loading,
            Self::Ready(_) => ModelStatus::Ready,
            Self::Failed(_) => ModelStatus::Failed,
        }
    }

    /// The provider, or the reason no operation can run yet.
    pub fn provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        match self {
            Self::Loading => Err(AppError::ModelNotReady),
            Self::Ready(provider) => Ok(Arc::clone(provider)),
            Self::Failed(reason) => Err(AppError::ModelUnavailable(reason.clone())),
        }
    }
}

/// What a session is doing while its checker is locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// No operation running.
    Idle,
    /// A reference batch is being decoded and embedded.
    AddingReferences,
    /// A test image is being scored.
    Checking,
}

impl Activity {
    /// Status message shown while the activity runs.
    pub fn message(self) -> &'static str {
        match self {
            Self::Idle => "Working...",
            Self::AddingReferences => ADDING_MESSAGE,
            Self::Checking => ANALYZING_MESSAGE,
        }
    }
}

fn lock_unpoisoned<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One open checker session.
///
/// The checker lock is held for a whole operation; the activity and the
/// last-use time stay readable while it is.
#[derive(Debug)]
pub struct Session {
    checker: Arc<Mutex<FreshnessChecker>>,
    activity: StdMutex<Activity>,
    last_used: StdMutex<Instant>,
}

impl Session {
    fn new() -> Self {
        Self {
            checker: Arc::new(Mutex::new(FreshnessChecker::new())),
            activity: StdMutex::new(Activity::Idle),
            last_used: StdMutex::new(Instant::now()),
        }
    }

    /// The session's checker.
    pub fn checker(&self) -> &Arc<Mutex<FreshnessChecker>> {
        &self.checker
    }

    /// Operation currently running, if any.
    pub fn activity(&self) -> Activity {
        *lock_unpoisoned(&self.activity)
    }

    /// Mark an operation as running until the guard drops.
    pub fn begin(&self, activity: Activity) -> ActivityGuard<'_> {
        *lock_unpoisoned(&self.activity) = activity;
        self.touch();
        ActivityGuard { session: self }
    }

    fn touch(&self) {
        *lock_unpoisoned(&self.last_used) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        lock_unpoisoned(&self.last_used).elapsed()
    }

    fn is_busy(&self) -> bool {
        self.checker.try_lock().is_err()
    }
}

/// Resets a session to [`Activity::Idle`] when dropped.
#[derive(Debug)]
pub struct ActivityGuard<'a> {
    session: &'a Session,
}

impl Drop for ActivityGuard<'_> {
    fn drop(&mut self) {
        *lock_unpoisoned(&self.session.activity) = Activity::Idle;
        self.session.touch();
    }
}

/// Application state that can be shared across handlers
#[derive(Debug)]
pub struct AppState {
    /// Application configuration
    pub config: Config,
    model: RwLock<ModelState>,
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
}

impl AppState {
    /// Create state whose model is still loading
    pub fn new(config: Config) -> Arc<Self> {
        Self::with_model(config, ModelState::Loading)
    }

    /// Create state around an already-resolved model
    pub fn with_model(config: Config, model: ModelState) -> Arc<Self> {
        Arc::new(Self {
            config,
            model: RwLock::new(model),
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Replace the model state once loading has finished.
    pub async fn set_model(&self, model: ModelState) {
        *self.model.write().await = model;
    }

    /// Current model status.
    pub async fn model_status(&self) -> ModelStatus {
        self.model.read().await.status()
    }

    /// The loaded provider, or `ModelNotReady`/`ModelUnavailable`.
    pub async fn provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        self.model.read().await.provider()
    }

    /// Open a new checker session.
    ///
    /// At the session limit, idle sessions are expired first; if none can
    /// be, the request fails with `SessionLimit`.
    pub async fn create_session(&self) -> Result<(Uuid, Arc<Session>)> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.config.max_sessions {
            self.expire_idle(&mut sessions);
        }
        if sessions.len() >= self.config.max_sessions {
            log::warn!(
                "Refusing new session: {} sessions open",
                self.config.max_sessions
            );
            return Err(AppError::SessionLimit(self.config.max_sessions));
        }

        let id = Uuid::new_v4();
        let session = Arc::new(Session::new());
        sessions.insert(id, Arc::clone(&session));
        log::debug!("Opened session {}", id);
        Ok((id, session))
    }

    /// Look up a session and mark it as used.
    pub async fn session(&self, id: Uuid) -> Result<Arc<Session>> {
        let session = self
            .sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("session {}", id)))?;
        session.touch();
        Ok(session)
    }

    /// Close every session idle for longer than the configured timeout.
    ///
    /// Sessions with an operation in flight are kept. Returns how many were
    /// closed.
    pub async fn expire_idle_sessions(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        self.expire_idle(&mut sessions)
    }

    fn expire_idle(&self, sessions: &mut HashMap<Uuid, Arc<Session>>) -> usize {
        let timeout = self.config.session_idle_timeout;
        let before = sessions.len();
        sessions.retain(|id, session| {
            let expired = session.idle_for() >= timeout && !session.is_busy();
            if expired {
                log::info!("Expired idle session {}", id);
            }
            !expired
        });
        before - sessions.len()
    }

    /// Drop a session and every reference it holds.
    pub async fn remove_session(&self, id: Uuid) -> Result<()> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .map(|_| log::debug!("Closed session {}", id))
            .ok_or_else(|| AppError::NotFound(format!("session {}", id)))
    }

    /// Number of open sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
