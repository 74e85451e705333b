//! OnboardingService: one `WorkflowEngine` per partner, created on first use.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::config::OnboardingConfig;
use crate::error::WorkflowError;
use crate::store::{Database, SessionStore};

use super::approvals::PendingApproval;
use super::engine::{ResetOptions, WorkflowEngine};
use super::notify::{DocumentSink, NotificationPort};

pub struct OnboardingService {
    store: Arc<SessionStore>,
    notifier: Arc<dyn NotificationPort>,
    documents: Option<Arc<dyn DocumentSink>>,
    config: OnboardingConfig,
    engines: RwLock<HashMap<String, Arc<WorkflowEngine>>>,
}

impl OnboardingService {
    pub fn new(
        db: Arc<dyn Database>,
        notifier: Arc<dyn NotificationPort>,
        config: OnboardingConfig,
    ) -> Self {
        Self {
            store: Arc::new(SessionStore::new(db, &config)),
            notifier,
            documents: None,
            config,
            engines: RwLock::new(HashMap::new()),
        }
    }

    /// Attach file storage handed to every engine created afterwards.
    pub fn with_document_sink(mut self, sink: Arc<dyn DocumentSink>) -> Self {
        self.documents = Some(sink);
        self
    }

    /// The partner's engine, creating it if this is the first request.
    pub async fn engine_for(&self, partner_id: &str) -> Arc<WorkflowEngine> {
        if let Some(engine) = self.engines.read().await.get(partner_id) {
            return Arc::clone(engine);
        }

        let mut engines = self.engines.write().await;
        let engine = engines.entry(partner_id.to_string()).or_insert_with(|| {
            debug!(partner_id, "Creating workflow engine");
            Arc::new(self.build_engine(partner_id))
        });
        Arc::clone(engine)
    }

    /// The partner's engine, only when a session exists in memory or in the store.
    ///
    /// Lookups for unknown partners leave the engine map untouched.
    pub async fn existing_engine(&self, partner_id: &str) -> Result<Arc<WorkflowEngine>, WorkflowError> {
        if let Some(engine) = self.engines.read().await.get(partner_id) {
            return Ok(Arc::clone(engine));
        }
        if self.store.load(partner_id).await?.is_none() {
            return Err(WorkflowError::SessionNotFound(partner_id.to_string()));
        }
        Ok(self.engine_for(partner_id).await)
    }

    /// Reset a partner's session. A full reset also drops the engine.
    pub async fn reset(&self, partner_id: &str, options: ResetOptions) -> Result<(), WorkflowError> {
        let cached = self.engines.read().await.get(partner_id).cloned();
        let engine = cached.unwrap_or_else(|| Arc::new(self.build_engine(partner_id)));

        let evict = options.clear_persistence && options.clear_in_memory;
        engine.reset(options).await?;
        if evict && self.engines.write().await.remove(partner_id).is_some() {
            debug!(partner_id, "Dropped workflow engine");
        }
        Ok(())
    }

    /// Partners with an engine in this process.
    pub async fn partners(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.engines.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn build_engine(&self, partner_id: &str) -> WorkflowEngine {
        let engine = WorkflowEngine::new(
            partner_id,
            Arc::clone(&self.store),
            Arc::clone(&self.notifier),
            self.config.clone(),
        );
        match &self.documents {
            Some(sink) => engine.with_document_sink(Arc::clone(sink)),
            None => engine,
        }
    }

    /// Waiting sign-offs across every loaded partner, ordered by partner.
    pub async fn pending_approvals(&self) -> Vec<PendingApproval> {
        let engines: Vec<Arc<WorkflowEngine>> = {
            let map = self.engines.read().await;
            let mut engines: Vec<_> = map.values().cloned().collect();
            engines.sort_by(|a, b| a.partner_id().cmp(b.partner_id()));
            engines
        };

        let mut pending = Vec::new();
        for engine in engines {
            pending.extend(engine.pending_approvals().await);
        }
        pending
    }
}
