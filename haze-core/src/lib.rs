pub mod device_map;
pub mod error;
pub mod lifecycle;
pub mod loader;
mod loader_factory;
mod util;

mod sd;

pub use device_map::*;
pub use error::GenerationError;
pub use lifecycle::PipelineCell;
pub use loader::*;
pub use loader_factory::*;
pub use sd::{SdLoader, SdVariant, StableDiffusionModel};
pub(crate) use util::*;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default classifier-free guidance scale.
pub const DEFAULT_GUIDANCE_SCALE: f64 = 7.0;
/// Default number of denoising steps.
pub const DEFAULT_STEPS: usize = 25;
/// Default output edge length in pixels.
pub const DEFAULT_EDGE: usize = 512;
/// Smallest accepted output edge length in pixels.
pub const MIN_EDGE: usize = 256;
/// Largest accepted guidance scale.
pub const MAX_GUIDANCE_SCALE: f64 = 20.0;
/// Largest accepted number of denoising steps.
pub const MAX_STEPS: usize = 100;

/// A fully resolved generation request. All defaulting and bounds checking
/// happens at the API boundary; a value of this type is always valid.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub guidance_scale: f64,
    pub steps: usize,
    /// `None` means non-deterministic sampling.
    pub seed: Option<u64>,
    pub width: usize,
    pub height: usize,
}

/// Optional behaviors a concrete pipeline variant supports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineCapabilities {
    pub safety_checker: bool,
    pub vae_tiling: bool,
    pub attention_slicing: bool,
}

/// Behaviors requested through service configuration. Resolved against a
/// pipeline's [`PipelineCapabilities`] before loading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub safety_checker: bool,
    pub vae_tiling: bool,
    pub attention_slicing: bool,
}

impl PipelineOptions {
    /// Drops every requested behavior the pipeline does not support,
    /// logging a warning for each.
    pub fn resolve(self, capabilities: PipelineCapabilities) -> Self {
        let mut effective = self;
        if self.safety_checker && !capabilities.safety_checker {
            warn!("safety checker is not available for this model variant, ignoring");
            effective.safety_checker = false;
        }
        if self.vae_tiling && !capabilities.vae_tiling {
            warn!("tiled VAE decoding is not available for this model variant, ignoring");
            effective.vae_tiling = false;
        }
        if self.attention_slicing && !capabilities.attention_slicing {
            warn!("attention slicing is not available for this model variant, ignoring");
            effective.attention_slicing = false;
        }
        effective
    }
}

pub trait PipelineLike: Send + Sync {
    /// The optional behaviors this pipeline supports.
    fn capabilities(&self) -> PipelineCapabilities;

    /// Runs the full denoising schedule for `request` and returns the
    /// generated image. Blocks until done; one call per generation attempt.
    fn run(&self, request: &GenerationRequest) -> Result<DynamicImage, GenerationError>;
}
