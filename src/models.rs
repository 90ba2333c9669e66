use serde::{Deserialize, Serialize};

// Inbound request body
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub size: ImageSize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl GenerationRequest {
    // Parse and validate before anything is sent upstream
    pub fn from_slice(body: &[u8]) -> Result<Self, String> {
        let request: GenerationRequest =
            serde_json::from_slice(body).map_err(|e| format!("invalid request body: {}", e))?;

        if request.prompt.trim().is_empty() {
            return Err("prompt must not be empty".to_string());
        }
        if request.size.width == 0 || request.size.height == 0 {
            return Err(format!(
                "size must be non-zero, got {}x{}",
                request.size.width, request.size.height
            ));
        }

        Ok(request)
    }
}

// Text-to-image API request format
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TextToImageBody {
    pub steps: u32,
    pub width: u32,
    pub height: u32,
    pub seed: u64,
    pub cfg_scale: u32,
    pub samples: u32,
    pub text_prompts: Vec<TextPrompt>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TextPrompt {
    pub text: String,
    pub weight: u32,
}

impl From<&GenerationRequest> for TextToImageBody {
    // fixed generation parameters, only prompt and size come from the caller
    fn from(req: &GenerationRequest) -> Self {
        Self {
            steps: 10,
            width: req.size.width,
            height: req.size.height,
            seed: 0,
            cfg_scale: 5,
            samples: 1,
            text_prompts: vec![TextPrompt {
                text: req.prompt.clone(),
                weight: 1,
            }],
        }
    }
}

// Fallback response format, same shape as the upstream's artifacts
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ArtifactsResponse {
    pub artifacts: Vec<Artifact>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Artifact {
    pub base64: String,
}
