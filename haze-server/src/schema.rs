//! Request and response types for both API surfaces.
//!
//! The native and OpenAI-compatible schemas are validated independently but
//! converge on one canonical [`GenerationRequest`]; default values live in
//! `haze-core` and are referenced from both, so the two surfaces cannot
//! drift.

use haze_core::{
    GenerationRequest, DEFAULT_EDGE, DEFAULT_GUIDANCE_SCALE, DEFAULT_STEPS, MAX_GUIDANCE_SCALE,
    MAX_STEPS, MIN_EDGE,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

fn default_guidance_scale() -> f64 {
    DEFAULT_GUIDANCE_SCALE
}

fn default_steps() -> usize {
    DEFAULT_STEPS
}

fn default_edge() -> usize {
    DEFAULT_EDGE
}

fn default_size() -> String {
    format!("{DEFAULT_EDGE}x{DEFAULT_EDGE}")
}

fn default_n() -> u32 {
    1
}

fn default_response_format() -> String {
    "b64_json".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
}

/// The native generation schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f64,
    #[serde(default = "default_steps")]
    pub num_inference_steps: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_edge")]
    pub width: usize,
    #[serde(default = "default_edge")]
    pub height: usize,
}

impl GenerateRequest {
    /// Enforces every bound and produces the canonical request. Out-of-range
    /// values are rejected here, before any pipeline work.
    pub fn normalize(self, max_edge: usize) -> Result<GenerationRequest, ApiError> {
        if self.prompt.is_empty() {
            return Err(ApiError::validation("prompt must not be empty"));
        }
        if !(0.0..=MAX_GUIDANCE_SCALE).contains(&self.guidance_scale) {
            return Err(ApiError::validation(format!(
                "guidance_scale must be between 0 and {MAX_GUIDANCE_SCALE}"
            )));
        }
        if !(1..=MAX_STEPS).contains(&self.num_inference_steps) {
            return Err(ApiError::validation(format!(
                "num_inference_steps must be between 1 and {MAX_STEPS}"
            )));
        }
        for (name, value) in [("width", self.width), ("height", self.height)] {
            if value < MIN_EDGE || value > max_edge {
                return Err(ApiError::validation(format!(
                    "{name} must be between {MIN_EDGE} and {max_edge}"
                )));
            }
        }
        Ok(GenerationRequest {
            prompt: self.prompt,
            negative_prompt: self.negative_prompt,
            guidance_scale: self.guidance_scale,
            steps: self.num_inference_steps,
            seed: self.seed,
            width: self.width,
            height: self.height,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub image_base64: String,
    pub seed: Option<u64>,
    pub took_ms: u64,
}

/// The OpenAI-images-compatible schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiImageRequest {
    pub prompt: String,
    /// WxH format, e.g. 768x512.
    #[serde(default = "default_size")]
    pub size: String,
    /// Only one image per request is supported.
    #[serde(default = "default_n")]
    pub n: u32,
    /// Only b64_json is supported.
    #[serde(default = "default_response_format")]
    pub response_format: String,
    /// Accepted for compatibility; has no effect.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub guidance_scale: Option<f64>,
    #[serde(default)]
    pub num_inference_steps: Option<usize>,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl OpenAiImageRequest {
    /// Checks the compatibility-only fields and adapts the payload into the
    /// native schema, substituting the shared defaults for absent overrides.
    pub fn into_native(self, max_edge: usize) -> Result<GenerateRequest, ApiError> {
        if !self.response_format.eq_ignore_ascii_case("b64_json") {
            return Err(ApiError::bad_request(
                "only response_format=b64_json is supported",
            ));
        }
        if self.n != 1 {
            return Err(ApiError::bad_request(
                "only one image per request is supported",
            ));
        }
        let (width, height) = parse_size(&self.size, max_edge)?;
        Ok(GenerateRequest {
            prompt: self.prompt,
            negative_prompt: self.negative_prompt,
            guidance_scale: self.guidance_scale.unwrap_or(DEFAULT_GUIDANCE_SCALE),
            num_inference_steps: self.num_inference_steps.unwrap_or(DEFAULT_STEPS),
            seed: self.seed,
            width,
            height,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiImageData {
    pub b64_json: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiImageResponse {
    /// Creation timestamp in epoch seconds.
    pub created: u64,
    pub data: Vec<OpenAiImageData>,
}

/// Parses a `"<width>x<height>"` size string, case-insensitively, and checks
/// both dimensions against the configured bound.
pub fn parse_size(size: &str, max_edge: usize) -> Result<(usize, usize), ApiError> {
    let size = size.to_ascii_lowercase();
    let (width, height) = size
        .split_once('x')
        .and_then(|(w, h)| Some((w.parse::<usize>().ok()?, h.parse::<usize>().ok()?)))
        .ok_or_else(|| ApiError::bad_request("size must look like 512x512"))?;

    if width < MIN_EDGE || height < MIN_EDGE || width > max_edge || height > max_edge {
        return Err(ApiError::bad_request(format!(
            "size must stay within {MIN_EDGE}-{max_edge}px per dimension"
        )));
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::*;

    const MAX_EDGE: usize = 1024;

    #[test]
    fn parse_size_accepts_wxh() {
        assert_eq!(parse_size("512x512", MAX_EDGE).unwrap(), (512, 512));
        assert_eq!(parse_size("768X512", MAX_EDGE).unwrap(), (768, 512));
    }

    #[test]
    fn parse_size_rejects_malformed_strings() {
        for size in ["abcx512", "512", "512x", "x512", "512x512x512", "5.0x512"] {
            let err = parse_size(size, MAX_EDGE).unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_REQUEST, "{size}");
            assert!(err.message.contains("512x512"), "{size}: {}", err.message);
        }
    }

    #[test]
    fn parse_size_rejects_out_of_bound_dimensions() {
        for size in ["4096x512", "512x4096", "128x512"] {
            let err = parse_size(size, MAX_EDGE).unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_REQUEST, "{size}");
            assert!(err.message.contains("256-1024"), "{size}: {}", err.message);
        }
    }

    #[test]
    fn native_schema_fills_in_defaults() {
        let req: GenerateRequest = serde_json::from_value(json!({"prompt": "a cat"})).unwrap();
        let canonical = req.normalize(MAX_EDGE).unwrap();
        assert_eq!(canonical.guidance_scale, DEFAULT_GUIDANCE_SCALE);
        assert_eq!(canonical.steps, DEFAULT_STEPS);
        assert_eq!(canonical.width, DEFAULT_EDGE);
        assert_eq!(canonical.height, DEFAULT_EDGE);
        assert_eq!(canonical.seed, None);
        assert_eq!(canonical.negative_prompt, None);
    }

    #[test]
    fn normalize_rejects_out_of_bound_fields() {
        let base = json!({"prompt": "a cat"});
        let cases = [
            (json!({"prompt": ""}), "prompt"),
            (json!({"prompt": "a cat", "guidance_scale": 25.0}), "guidance_scale"),
            (json!({"prompt": "a cat", "num_inference_steps": 0}), "num_inference_steps"),
            (json!({"prompt": "a cat", "num_inference_steps": 101}), "num_inference_steps"),
            (json!({"prompt": "a cat", "width": 128}), "width"),
            (json!({"prompt": "a cat", "height": 2048}), "height"),
        ];
        for (value, field) in cases {
            let req: GenerateRequest = serde_json::from_value(value).unwrap();
            let err = req.normalize(MAX_EDGE).unwrap_err();
            assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY, "{field}");
            assert!(err.message.contains(field), "{field}: {}", err.message);
        }
        let req: GenerateRequest = serde_json::from_value(base).unwrap();
        req.normalize(MAX_EDGE).unwrap();
    }

    #[test]
    fn compatible_schema_shares_the_native_defaults() {
        let compat: OpenAiImageRequest =
            serde_json::from_value(json!({"prompt": "a cat"})).unwrap();
        let native: GenerateRequest = serde_json::from_value(json!({"prompt": "a cat"})).unwrap();

        let from_compat = compat.into_native(MAX_EDGE).unwrap().normalize(MAX_EDGE).unwrap();
        let from_native = native.normalize(MAX_EDGE).unwrap();
        assert_eq!(from_compat, from_native);
    }

    #[test]
    fn compatible_schema_rejects_unsupported_parameters() {
        let multi: OpenAiImageRequest =
            serde_json::from_value(json!({"prompt": "a cat", "n": 2})).unwrap();
        let err = multi.into_native(MAX_EDGE).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("one image"));

        let url: OpenAiImageRequest =
            serde_json::from_value(json!({"prompt": "a cat", "response_format": "url"})).unwrap();
        let err = url.into_native(MAX_EDGE).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("b64_json"));
    }

    #[test]
    fn compatible_model_field_is_accepted_without_effect() {
        let compat: OpenAiImageRequest = serde_json::from_value(
            json!({"prompt": "a cat", "model": "dall-e-3", "size": "768x512"}),
        )
        .unwrap();
        let native = compat.into_native(MAX_EDGE).unwrap();
        assert_eq!((native.width, native.height), (768, 512));
    }
}
