use std::sync::Arc;

use anyhow::{Context, Result};
use haze_core::{load_model, DeviceMap, ModelSpec, PipelineCell, PipelineLike};
use hf_hub::api::tokio::ApiBuilder;

use crate::config::ServiceConfig;

/// Shared application state: the immutable configuration and the lazily
/// constructed pipeline singleton.
pub struct AppState {
    pub config: ServiceConfig,
    pipeline: PipelineCell,
}

impl AppState {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            pipeline: PipelineCell::new(),
        }
    }

    /// Builds a state around an already-constructed pipeline. Lets tests
    /// inject instrumented stubs.
    pub fn with_pipeline(config: ServiceConfig, pipeline: Arc<dyn PipelineLike>) -> Self {
        Self {
            config,
            pipeline: PipelineCell::preloaded(pipeline),
        }
    }

    /// Returns the shared pipeline, constructing it on first use.
    pub async fn pipeline(&self) -> Result<&Arc<dyn PipelineLike>> {
        self.pipeline
            .ensure_ready(|| load_pipeline(&self.config))
            .await
    }
}

async fn load_pipeline(config: &ServiceConfig) -> Result<Arc<dyn PipelineLike>> {
    let api = ApiBuilder::new()
        .with_token(config.hf_token.clone())
        .build()
        .context("failed to set up the hub api")?;
    let device_map = if config.cpu {
        DeviceMap::ForceCpu
    } else {
        DeviceMap::default()
    };

    let mut spec = ModelSpec::new(config.model_id.clone());
    if let Some(revision) = &config.model_revision {
        spec = spec.with_revision(revision.clone());
    }

    load_model(spec, api, device_map, config.pipeline_options()).await
}
