//! Web trigger surface for the queue engine.
//!
//! Every route that moves work requires the pre-shared `X-Secret-Key`
//! credential. Triggers are how external schedulers (and operators) start
//! fan-out and drain cycles; the actual work happens behind per-family
//! item endpoints configured in settings.

mod handlers;
mod routes;

pub use routes::create_router;

use std::sync::Arc;

use crate::config::Settings;
use crate::engine::{Dispatcher, IdempotencyGuard, NoDedup, Producer, WorkSource};
use crate::repository::{
    AsyncSqlitePool, DieselProgressRepository, DieselQueueRepository, DieselResultRepository,
    DieselWorkRepository, NotificationTargetSource, TrackerSource,
};
use crate::tasks::{HttpTaskHandler, TaskFamily};

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub queue_repo: Arc<DieselQueueRepository>,
    pub result_repo: Arc<DieselResultRepository>,
    pub progress_repo: Arc<DieselProgressRepository>,
    pub work_repo: Arc<DieselWorkRepository>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let pool = AsyncSqlitePool::new(&settings.database_url);
        Self {
            settings: Arc::new(settings),
            queue_repo: Arc::new(DieselQueueRepository::new(pool.clone())),
            result_repo: Arc::new(DieselResultRepository::new(pool.clone())),
            progress_repo: Arc::new(DieselProgressRepository::new(pool.clone())),
            work_repo: Arc::new(DieselWorkRepository::new(pool)),
            http: HttpTaskHandler::default_client(),
        }
    }

    /// Fan-out producer for a family: trackers for rank families, phone
    /// targets for notifications.
    pub fn producer_for(&self, family: TaskFamily) -> Producer {
        let source: Arc<dyn WorkSource> = if family.enumerates_trackers() {
            Arc::new(TrackerSource::new((*self.work_repo).clone()))
        } else {
            Arc::new(NotificationTargetSource::new((*self.work_repo).clone()))
        };
        Producer::new(self.queue_repo.clone(), source, family.queue_name())
    }

    /// Dispatcher for a family, wired to its configured item endpoint.
    pub fn dispatcher_for(&self, family: TaskFamily) -> anyhow::Result<Dispatcher> {
        let endpoint = self
            .settings
            .handler_endpoint(family)
            .ok_or_else(|| anyhow::anyhow!("no handler endpoint configured for '{family}'"))?;

        let handler = Arc::new(HttpTaskHandler::new(
            self.http.clone(),
            endpoint,
            &self.settings.secret_key,
        ));

        let guard: Arc<dyn IdempotencyGuard> = if family.has_dedup_key() {
            Arc::new(self.result_repo.guard(family.queue_name()))
        } else {
            Arc::new(NoDedup)
        };

        let mut dispatcher = Dispatcher::new(
            self.queue_repo.clone(),
            guard,
            handler,
            family.queue_name(),
            self.settings.queue.dispatch_config(),
        );
        if family.tracks_progress() {
            dispatcher = dispatcher.with_progress(self.progress_repo.clone());
        }
        Ok(dispatcher)
    }
}

/// Run the web server until shutdown.
pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    let bind_addr = settings.bind_addr.clone();
    let state = AppState::new(settings);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on {bind_addr}");
    axum::serve(listener, router).await?;
    Ok(())
}
