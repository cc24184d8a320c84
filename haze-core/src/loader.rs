use std::future::Future;

use anyhow::Result;
use hf_hub::api::tokio::Api;

use crate::{DeviceMap, PipelineLike, PipelineOptions, SdVariant};

/// Identifies the model weights to load.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub model_id: String,
    /// Optional revision to pin the repository to.
    pub revision: Option<String>,
}

impl ModelSpec {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            revision: None,
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }
}

pub trait Loader {
    type Model: PipelineLike;

    fn load(
        variant: SdVariant,
        spec: ModelSpec,
        api: Api,
        device_map: DeviceMap,
        options: PipelineOptions,
    ) -> impl Future<Output = Result<Self::Model>>
    where
        Self: Sized;
}
