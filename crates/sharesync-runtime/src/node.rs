//! The sharesync node: explicit wiring of storage and the share service.
//!
//! [`ShareNode`] is the runtime entry point. It builds the storage backend
//! named by the configuration and a [`ShareService`] on top of it. Nothing is
//! global; two nodes with different configurations can live side by side.

use std::sync::Arc;

use tracing::info;

use sharesync_core::config::{ShareConfig, StorageConfig};
use sharesync_core::storage::StorageBackend;
use sharesync_core::Result;
use sharesync_storage::{LocalBackend, MemoryBackend, S3Backend};

use crate::identifier::EventIdGenerator;
use crate::share::ShareService;

/// A running sharesync instance.
pub struct ShareNode {
    /// Node configuration.
    pub config: ShareConfig,

    /// The storage backend shares are persisted in.
    pub storage: Arc<dyn StorageBackend>,

    /// The share service bound to `storage`.
    pub shares: ShareService,
}

impl ShareNode {
    /// Start a node with the given configuration.
    ///
    /// Connects the configured storage backend (creating the base directory
    /// for local storage) and constructs the share service.
    pub async fn start(config: ShareConfig) -> Result<Self> {
        Self::start_with(config, None).await
    }

    /// Start a node with a specific event id generator.
    pub async fn start_with_ids(
        config: ShareConfig,
        ids: Arc<dyn EventIdGenerator>,
    ) -> Result<Self> {
        Self::start_with(config, Some(ids)).await
    }

    async fn start_with(
        config: ShareConfig,
        ids: Option<Arc<dyn EventIdGenerator>>,
    ) -> Result<Self> {
        let storage = connect(&config).await?;

        let mut builder = ShareService::builder(Arc::clone(&storage))
            .request_timeout(config.request_timeout)
            .non_production(config.non_production);
        if let Some(ids) = ids {
            builder = builder.id_generator(ids);
        }
        let shares = builder.build();

        let endpoint = config.storage.endpoint().unwrap_or_else(|| "-".to_string());
        info!(
            adapter = adapter_name(&config.storage),
            endpoint = %endpoint,
            request_timeout_ms = config.request_timeout.as_millis() as u64,
            non_production = config.non_production,
            "sharesync node started"
        );

        Ok(Self {
            config,
            storage,
            shares,
        })
    }

    /// Shut the node down.
    ///
    /// Storage calls are request-scoped, so there is nothing to drain.
    pub async fn shutdown(&self) {
        info!(
            adapter = adapter_name(&self.config.storage),
            "sharesync node shutting down"
        );
    }
}

async fn connect(config: &ShareConfig) -> Result<Arc<dyn StorageBackend>> {
    let storage: Arc<dyn StorageBackend> = match &config.storage {
        StorageConfig::S3 { .. } | StorageConfig::R2 { .. } => {
            Arc::new(S3Backend::from_config(&config.storage, config.request_timeout)?)
        }
        StorageConfig::Local { path } => Arc::new(LocalBackend::new(path.clone()).await?),
        StorageConfig::Memory => Arc::new(MemoryBackend::new()),
    };
    Ok(storage)
}

fn adapter_name(storage: &StorageConfig) -> &'static str {
    match storage {
        StorageConfig::S3 { .. } => "s3",
        StorageConfig::R2 { .. } => "r2",
        StorageConfig::Local { .. } => "local",
        StorageConfig::Memory => "memory",
    }
}
