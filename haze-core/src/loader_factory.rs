use anyhow::{anyhow, Result};
use hf_hub::api::tokio::Api;
use tracing::info;

use crate::sd::SdVariant;
use crate::{DeviceMap, Loader, ModelSpec, PipelineLike, PipelineOptions, SdLoader};

use std::sync::Arc;

/// Load a pipeline based on the model id, detecting the appropriate variant.
pub async fn load_model(
    spec: ModelSpec,
    api: Api,
    device_map: DeviceMap,
    options: PipelineOptions,
) -> Result<Arc<dyn PipelineLike>> {
    let variant = SdVariant::from_name(&spec.model_id)
        .ok_or_else(|| anyhow!("unsupported model: {}", spec.model_id))?;

    info!(
        model = %spec.model_id,
        revision = spec.revision.as_deref().unwrap_or("main"),
        ?variant,
        "loading pipeline"
    );

    let model = SdLoader::load(variant, spec, api, device_map, options).await?;
    Ok(Arc::new(model))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_detection_from_model_id() {
        assert_eq!(
            SdVariant::from_name("stabilityai/stable-diffusion-2-1"),
            Some(SdVariant::V2_1)
        );
        assert_eq!(
            SdVariant::from_name("stable-diffusion-v1-5/stable-diffusion-v1-5"),
            Some(SdVariant::V1_5)
        );
        assert_eq!(
            SdVariant::from_name("runwayml/stable-diffusion-v1.5"),
            Some(SdVariant::V1_5)
        );
        assert_eq!(SdVariant::from_name("black-forest-labs/FLUX.1-schnell"), None);
    }
}
