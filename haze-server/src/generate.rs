use std::io::Cursor;
use std::time::Instant;

use anyhow::{Context, Result};
use base64::{prelude::BASE64_STANDARD, Engine};
use haze_core::GenerationRequest;
use image::DynamicImage;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::schema::GenerateResponse;
use crate::state::AppState;

/// Converts an image into a base64-encoded PNG.
fn image_to_base64_png(img: &DynamicImage) -> Result<String> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .context("failed to encode png")?;
    Ok(BASE64_STANDARD.encode(&bytes))
}

/// Runs one generation attempt against the shared pipeline: exactly one
/// pipeline call, timed in whole milliseconds. Pipeline failures surface as
/// inference errors carrying the original diagnostic; the pipeline instance
/// itself survives them.
pub async fn run_generation(
    state: &AppState,
    request: GenerationRequest,
) -> Result<GenerateResponse, ApiError> {
    let pipeline = state.pipeline().await.map_err(|err| {
        warn!("pipeline construction failed: {err:#}");
        ApiError::inference(format!("{err:#}"))
    })?;

    info!(
        width = request.width,
        height = request.height,
        steps = request.steps,
        seed = ?request.seed,
        "generating image"
    );

    let started = Instant::now();
    let image = pipeline.run(&request).map_err(|err| {
        warn!("generation failed: {err}");
        ApiError::inference(err.to_string())
    })?;
    let took_ms = started.elapsed().as_millis() as u64;

    let image_base64 = image_to_base64_png(&image)?;
    info!(took_ms, "image generated");

    Ok(GenerateResponse {
        image_base64,
        seed: request.seed,
        took_ms,
    })
}
