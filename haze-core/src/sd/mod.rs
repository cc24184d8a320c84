use anyhow::{Context, Result};
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::Module;
use candle_transformers::models::stable_diffusion::{
    self, clip::ClipTextTransformer, unet_2d::UNet2DConditionModel, vae::AutoEncoderKL,
    StableDiffusionConfig,
};
use hf_hub::api::tokio::Api;
use hf_hub::{Repo, RepoType};
use image::DynamicImage;
use tokenizers::Tokenizer;
use tracing::debug;

use crate::{
    select_best_device, tensor_to_image, DeviceMap, GenerationError, GenerationRequest, Loader,
    ModelSpec, PipelineCapabilities, PipelineLike, PipelineOptions,
};

/// Latents are an 8x downscale of the output image.
const LATENT_SCALE: usize = 8;
/// UNet input channels.
const UNET_IN_CHANNELS: usize = 4;
/// Scaling factor applied to latents before VAE decoding.
const VAE_SCALE: f64 = 0.18215;
/// Attention slice size used when slicing is enabled.
const ATTENTION_SLICE_SIZE: usize = 128;

const TOKENIZER_REPO: &str = "openai/clip-vit-base-patch32";
const TOKENIZER_FILE: &str = "tokenizer.json";
const CLIP_WEIGHTS: &str = "text_encoder/model.fp16.safetensors";
const VAE_WEIGHTS: &str = "vae/diffusion_pytorch_model.fp16.safetensors";
const UNET_WEIGHTS: &str = "unet/diffusion_pytorch_model.fp16.safetensors";

/// Supported Stable Diffusion variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdVariant {
    V1_5,
    V2_1,
}

impl SdVariant {
    /// Detect model variant from model name
    pub fn from_name(model_name: &str) -> Option<Self> {
        let name_upper = model_name.to_uppercase();

        if !name_upper.contains("STABLE-DIFFUSION") {
            return None;
        }
        if name_upper.contains("1-5") || name_upper.contains("1.5") {
            Some(SdVariant::V1_5)
        } else {
            // Default to 2.1 if no specific variant is found
            Some(SdVariant::V2_1)
        }
    }

    /// The optional behaviors this variant supports. Neither candle variant
    /// ships a safety-checker module or a tiled VAE decoder.
    pub fn capabilities(&self) -> PipelineCapabilities {
        match self {
            SdVariant::V1_5 | SdVariant::V2_1 => PipelineCapabilities {
                safety_checker: false,
                vae_tiling: false,
                attention_slicing: true,
            },
        }
    }

    fn build_config(&self, sliced_attention_size: Option<usize>) -> StableDiffusionConfig {
        match self {
            SdVariant::V1_5 => StableDiffusionConfig::v1_5(sliced_attention_size, None, None),
            SdVariant::V2_1 => StableDiffusionConfig::v2_1(sliced_attention_size, None, None),
        }
    }
}

pub struct StableDiffusionModel {
    device: Device,
    dtype: DType,
    config: StableDiffusionConfig,
    tokenizer: Tokenizer,
    text_model: ClipTextTransformer,
    vae: AutoEncoderKL,
    unet: UNet2DConditionModel,
    capabilities: PipelineCapabilities,
}

impl StableDiffusionModel {
    /// Tokenizes `prompt`, pads it to the CLIP context length and returns the
    /// text embedding.
    fn encode_prompt(&self, prompt: &str) -> Result<Tensor, GenerationError> {
        let max_len = self.config.clip.max_position_embeddings;
        let pad_token = self.config.clip.pad_with.as_deref().unwrap_or("<|endoftext|>");
        let pad_id = *self.tokenizer.get_vocab(true).get(pad_token).ok_or_else(|| {
            GenerationError::Tokenizer(format!("pad token {pad_token:?} missing from vocabulary"))
        })?;

        let mut tokens = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|err| GenerationError::Tokenizer(err.to_string()))?
            .get_ids()
            .to_vec();
        if tokens.len() > max_len {
            return Err(GenerationError::msg(format!(
                "prompt is too long ({} tokens, the maximum is {max_len})",
                tokens.len()
            )));
        }
        tokens.resize(max_len, pad_id);

        let tokens = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
        Ok(self.text_model.forward(&tokens)?)
    }
}

impl PipelineLike for StableDiffusionModel {
    fn capabilities(&self) -> PipelineCapabilities {
        self.capabilities
    }

    fn run(&self, request: &GenerationRequest) -> Result<DynamicImage, GenerationError> {
        // The latent grid is an 8x downscale, other sizes do not round-trip
        // through the VAE.
        if request.width % LATENT_SCALE != 0 || request.height % LATENT_SCALE != 0 {
            return Err(GenerationError::msg(format!(
                "width and height must be multiples of {LATENT_SCALE}, got {}x{}",
                request.width, request.height
            )));
        }

        // Optionally seed the device RNG for reproducibility.
        if let Some(seed) = request.seed {
            self.device.set_seed(seed)?;
        }

        let mut scheduler = self.config.build_scheduler(request.steps)?;
        let use_guidance = request.guidance_scale > 1.0;

        // --- Compute text embeddings, doubled up for classifier-free guidance ---
        let cond = self.encode_prompt(&request.prompt)?;
        let text_embeddings = if use_guidance {
            let uncond = self.encode_prompt(request.negative_prompt.as_deref().unwrap_or(""))?;
            Tensor::cat(&[uncond, cond], 0)?
        } else {
            cond
        };
        let text_embeddings = text_embeddings.to_dtype(self.dtype)?;

        // --- Sample the initial noise latents ---
        let latent_height = request.height / LATENT_SCALE;
        let latent_width = request.width / LATENT_SCALE;
        let latents = Tensor::randn(
            0f32,
            1f32,
            (1, UNET_IN_CHANNELS, latent_height, latent_width),
            &self.device,
        )?
        .to_dtype(self.dtype)?;
        let mut latents = (latents * scheduler.init_noise_sigma())?;

        // --- Run the denoising schedule ---
        let timesteps = scheduler.timesteps().to_vec();
        for (index, &timestep) in timesteps.iter().enumerate() {
            let latent_input = if use_guidance {
                Tensor::cat(&[&latents, &latents], 0)?
            } else {
                latents.clone()
            };
            let latent_input = scheduler.scale_model_input(latent_input, timestep)?;
            let noise_pred = self
                .unet
                .forward(&latent_input, timestep as f64, &text_embeddings)?;
            let noise_pred = if use_guidance {
                let chunks = noise_pred.chunk(2, 0)?;
                let (uncond, cond) = (&chunks[0], &chunks[1]);
                (uncond + ((cond - uncond)? * request.guidance_scale)?)?
            } else {
                noise_pred
            };
            latents = scheduler.step(&noise_pred, timestep, &latents)?;
            debug!(step = index + 1, total = timesteps.len(), timestep, "denoise step");
        }

        // --- Decode the latents and postprocess: scale, clamp, convert type ---
        let image = self.vae.decode(&(&latents / VAE_SCALE)?)?;
        let image = ((image / 2.)? + 0.5)?.to_device(&Device::Cpu)?;
        let image = (image.clamp(0f32, 1.)? * 255.)?.to_dtype(DType::U8)?;

        Ok(tensor_to_image(&image.i(0)?)?)
    }
}

pub struct SdLoader;

impl Loader for SdLoader {
    type Model = StableDiffusionModel;

    async fn load(
        variant: SdVariant,
        spec: ModelSpec,
        api: Api,
        device_map: DeviceMap,
        options: PipelineOptions,
    ) -> Result<Self::Model> {
        // Configure device. Weights and activations run at reduced precision
        // on accelerators.
        let device = select_best_device(device_map).context("failed to set up device")?;
        let dtype = if device.is_cuda() || device.is_metal() {
            DType::F16
        } else {
            DType::F32
        };

        let capabilities = variant.capabilities();
        let options = options.resolve(capabilities);
        let sliced_attention_size = options.attention_slicing.then_some(ATTENTION_SLICE_SIZE);
        let config = variant.build_config(sliced_attention_size);

        let repo = match &spec.revision {
            Some(revision) => api.repo(Repo::with_revision(
                spec.model_id.clone(),
                RepoType::Model,
                revision.clone(),
            )),
            None => api.repo(Repo::model(spec.model_id.clone())),
        };

        // --- Load Tokenizer ---
        let tokenizer_file = api
            .model(TOKENIZER_REPO.to_string())
            .get(TOKENIZER_FILE)
            .await
            .context("failed to get tokenizer")?;
        let tokenizer = Tokenizer::from_file(tokenizer_file)
            .map_err(anyhow::Error::msg)
            .context("failed to load tokenizer")?;

        // --- Load CLIP text encoder ---
        let clip_file = repo
            .get(CLIP_WEIGHTS)
            .await
            .context("failed to get text encoder weights")?;
        let text_model =
            stable_diffusion::build_clip_transformer(&config.clip, clip_file, &device, dtype)
                .context("failed to load text encoder")?;

        // --- Load Autoencoder ---
        let vae_file = repo
            .get(VAE_WEIGHTS)
            .await
            .context("failed to get autoencoder weights")?;
        let vae = config
            .build_vae(vae_file, &device, dtype)
            .context("failed to load autoencoder")?;

        // --- Load UNet ---
        let unet_file = repo
            .get(UNET_WEIGHTS)
            .await
            .context("failed to get unet weights")?;
        let unet = config
            .build_unet(unet_file, &device, UNET_IN_CHANNELS, false, dtype)
            .context("failed to load unet")?;

        Ok(StableDiffusionModel {
            device,
            dtype,
            config,
            tokenizer,
            text_model,
            vae,
            unet,
            capabilities,
        })
    }
}
