use clap::Parser;
use haze_core::PipelineOptions;

/// Process-wide configuration, resolved once at startup. Every knob can be
/// set by flag or by environment variable.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Haze image generation server")]
pub struct ServiceConfig {
    /// Use CPU instead of GPU
    #[arg(long, env = "FORCE_CPU")]
    pub cpu: bool,

    /// Model weights to serve
    #[arg(long, env = "MODEL_ID", default_value = "stabilityai/stable-diffusion-2-1")]
    pub model_id: String,

    /// Revision to pin the model repository to
    #[arg(long, env = "MODEL_REVISION")]
    pub model_revision: Option<String>,

    /// Hugging Face Hub token for gated repositories
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    pub hf_token: Option<String>,

    /// Keep the safety checker when the model variant ships one
    #[arg(long, env = "ENABLE_SAFETY_CHECKER", default_value_t = false, action = clap::ArgAction::Set)]
    pub safety_checker: bool,

    /// Enable memory-saving tiled VAE decoding when supported
    #[arg(long, env = "ENABLE_TILING", default_value_t = true, action = clap::ArgAction::Set)]
    pub tiling: bool,

    /// Enable attention slicing to reduce peak memory when supported
    #[arg(long, env = "ENABLE_ATTENTION_SLICING", default_value_t = true, action = clap::ArgAction::Set)]
    pub attention_slicing: bool,

    /// Largest accepted output edge length in pixels
    #[arg(long, env = "MAX_EDGE", default_value_t = 1024)]
    pub max_edge: usize,

    /// Host address to bind the server to
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind the server to
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,
}

impl ServiceConfig {
    /// The pipeline behaviors requested by this configuration.
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            safety_checker: self.safety_checker,
            vae_tiling: self.tiling,
            attention_slicing: self.attention_slicing,
        }
    }
}
