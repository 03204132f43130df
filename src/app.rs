use crate::cache::{CacheSettings, PaginationParams};
use crate::cli::{Command, ResourceName};
use crate::config::Config;
use crate::persist::StateStore;
use crate::resources::{
    ChatMessage, Company, Employee, PasswordResetRequest, Report, Tour, Traveler,
};
use crate::store::{FetchOptions, Resource, ResourceStore};
use crate::transport::{HttpTransport, Transport};
use anyhow::Context;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Every resource store behind one transport.
pub struct Dashboard {
    pub tours: ResourceStore<Tour>,
    pub employees: ResourceStore<Employee>,
    pub travelers: ResourceStore<Traveler>,
    pub companies: ResourceStore<Company>,
    pub messages: ResourceStore<ChatMessage>,
    pub password_resets: ResourceStore<PasswordResetRequest>,
    pub reports: ResourceStore<Report>,
    state: Option<StateStore>,
}

impl Dashboard {
    pub fn new(
        transport: Arc<dyn Transport>,
        settings: CacheSettings,
        state: Option<StateStore>,
    ) -> Self {
        Self {
            tours: ResourceStore::new(transport.clone(), settings.clone()),
            employees: ResourceStore::new(transport.clone(), settings.clone()),
            travelers: ResourceStore::new(transport.clone(), settings.clone()),
            companies: ResourceStore::new(transport.clone(), settings.clone()),
            messages: ResourceStore::new(transport.clone(), settings.clone()),
            password_resets: ResourceStore::new(transport.clone(), settings.clone()),
            reports: ResourceStore::new(transport, settings),
            state,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let transport = HttpTransport::new(
            &config.api_base_url,
            config.api_token.clone(),
            config.request_timeout,
        )
        .context("Failed to create API transport")?;
        let state = config.state_dir.clone().map(StateStore::new);
        Ok(Self::new(Arc::new(transport), config.cache_settings(), state))
    }

    /// Restore persisted state for every store. Failures are logged and skipped.
    pub async fn rehydrate(&self) {
        let Some(state) = &self.state else {
            return;
        };
        rehydrate_one(&self.tours, state).await;
        rehydrate_one(&self.employees, state).await;
        rehydrate_one(&self.travelers, state).await;
        rehydrate_one(&self.companies, state).await;
        rehydrate_one(&self.messages, state).await;
        rehydrate_one(&self.password_resets, state).await;
        rehydrate_one(&self.reports, state).await;
    }

    pub async fn persist(&self) -> anyhow::Result<()> {
        let Some(state) = &self.state else {
            return Ok(());
        };
        self.tours.persist(state).await?;
        self.employees.persist(state).await?;
        self.travelers.persist(state).await?;
        self.companies.persist(state).await?;
        self.messages.persist(state).await?;
        self.password_resets.persist(state).await?;
        self.reports.persist(state).await?;
        info!(dir = %state.dir().display(), "UI state persisted");
        Ok(())
    }

    /// Run one CLI command and return its JSON output.
    pub async fn run(&self, command: Command) -> anyhow::Result<Value> {
        match command {
            Command::List { resource, query } => {
                let params = query.to_params();
                match resource {
                    ResourceName::Tours => list_json(&self.tours, params).await,
                    ResourceName::Employees => list_json(&self.employees, params).await,
                    ResourceName::Travelers => list_json(&self.travelers, params).await,
                    ResourceName::Companies => list_json(&self.companies, params).await,
                    ResourceName::Messages => list_json(&self.messages, params).await,
                    ResourceName::PasswordResets => list_json(&self.password_resets, params).await,
                    ResourceName::Reports => list_json(&self.reports, params).await,
                }
            }
            Command::Get { resource, id } => match resource {
                ResourceName::Tours => detail_json(&self.tours, &id).await,
                ResourceName::Employees => detail_json(&self.employees, &id).await,
                ResourceName::Travelers => detail_json(&self.travelers, &id).await,
                ResourceName::Companies => detail_json(&self.companies, &id).await,
                ResourceName::Messages => detail_json(&self.messages, &id).await,
                ResourceName::PasswordResets => detail_json(&self.password_resets, &id).await,
                ResourceName::Reports => detail_json(&self.reports, &id).await,
            },
        }
    }
}

async fn rehydrate_one<R: Resource>(store: &ResourceStore<R>, state: &StateStore) {
    if let Err(e) = store.rehydrate(state).await {
        warn!(resource = R::NAME, error = %e, "Failed to restore persisted state (non-fatal)");
    }
}

async fn list_json<R: Resource>(
    store: &ResourceStore<R>,
    params: PaginationParams,
) -> anyhow::Result<Value> {
    let page = store
        .fetch_list(params, FetchOptions::default())
        .await
        .with_context(|| format!("Failed to list {}s", R::NAME))?;
    serde_json::to_value(&page).context("Failed to encode page")
}

async fn detail_json<R: Resource>(store: &ResourceStore<R>, id: &str) -> anyhow::Result<Value> {
    let item = store
        .fetch_detail(id, FetchOptions::default())
        .await
        .with_context(|| format!("Failed to load {} {id}", R::NAME))?;
    serde_json::to_value(&item).context("Failed to encode entity")
}
