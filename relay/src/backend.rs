use frame_dream_common::config::RelayConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Body of an Automatic1111-style `img2img` request.
#[derive(Debug, Serialize)]
pub struct Img2ImgRequest<'a> {
    pub prompt: &'a str,
    pub init_images: Vec<String>,
    pub steps: u32,
    pub cfg_scale: f64,
    pub denoising_strength: f64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Deserialize)]
pub struct Img2ImgResponse {
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend returned invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Error generating image: {0}")]
    NoImages(String),
}

/// Forwards uploads to the image-generation backend with the deployment's
/// fixed generation parameters.
pub struct Img2ImgClient {
    client: reqwest::Client,
    url: String,
    prompt: String,
    steps: u32,
    cfg_scale: f64,
    denoising_strength: f64,
    width: u32,
    height: u32,
}

impl Img2ImgClient {
    pub fn new(config: &RelayConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            url: config.backend_url.clone(),
            prompt: config.prompt.clone(),
            steps: config.steps,
            cfg_scale: config.cfg_scale,
            denoising_strength: config.denoising_strength,
            width: config.width,
            height: config.height,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Generate from one base64 init image; returns the first generated image as base64.
    pub async fn generate(&self, init_image_b64: String) -> Result<String, BackendError> {
        let body = Img2ImgRequest {
            prompt: &self.prompt,
            init_images: vec![init_image_b64],
            steps: self.steps,
            cfg_scale: self.cfg_scale,
            denoising_strength: self.denoising_strength,
            width: self.width,
            height: self.height,
        };
        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(status = %status, bytes = text.len(), "backend responded");

        let parsed: Img2ImgResponse = serde_json::from_str(&text)?;
        parsed
            .images
            .into_iter()
            .next()
            .ok_or(BackendError::NoImages(text))
    }
}
