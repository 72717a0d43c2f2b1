use crate::config::Config;
use crate::error::{AppError, Result};
use crate::restore::{
    Candidate, CandidateContent, ImageEditor, InlineImage, ResponsePart, RestoreRequest,
    RestoreResponse,
};
use gemini_rust::{Blob, Content, Gemini, GenerationResponse, Message, Part, Role};
use tracing::{debug, warn};

const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";

/// [`ImageEditor`] backed by the Gemini image models.
pub struct GeminiEditor {
    client: Gemini,
    model_name: String,
}

impl GeminiEditor {
    pub fn new(config: &Config) -> Result<Self> {
        // Explicitly set the base URL to avoid a BadScheme error from the default
        let base_url = url::Url::parse(API_BASE_URL)
            .map_err(|e| AppError::Config(format!("Invalid base URL: {}", e)))?;

        let model_name = model_path(&config.model_name);
        let model_url = format!("{}{}", API_BASE_URL, model_name);

        let client = Gemini::with_model_and_base_url(&config.gemini_api_key, model_url, base_url)
            .map_err(|e| AppError::Config(format!("Failed to create Gemini client: {}", e)))?;

        Ok(Self { client, model_name })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl ImageEditor for GeminiEditor {
    /// Sends the image followed by the instructions in a single user turn.
    async fn edit(&self, request: RestoreRequest) -> Result<RestoreResponse> {
        let image_part = Part::InlineData {
            inline_data: Blob {
                mime_type: request.image.mime_type,
                data: request.image.data,
            },
        };

        let text_part = Part::Text {
            text: request.instructions,
            thought: None,
            thought_signature: None,
        };

        let message = Message {
            role: Role::User,
            content: Content {
                role: Some(Role::User),
                parts: Some(vec![image_part, text_part]),
            },
        };

        debug!(model = %self.model_name, "calling Gemini generateContent");
        let response = self
            .client
            .generate_content()
            .with_messages(vec![message])
            .execute()
            .await
            .map_err(|e| {
                warn!(model = %self.model_name, "Gemini request failed: {:?}", e);
                AppError::service(format!("API request failed: {:?}", e))
            })?;

        Ok(convert_response(&response))
    }
}

/// Prefixes bare model names with `models/`.
fn model_path(model_name: &str) -> String {
    if model_name.starts_with("models/") {
        model_name.to_string()
    } else {
        format!("models/{}", model_name)
    }
}

fn convert_response(response: &GenerationResponse) -> RestoreResponse {
    let candidates = response
        .candidates
        .iter()
        .map(|candidate| {
            let parts = candidate
                .content
                .parts
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(convert_part)
                .collect();
            Candidate { content: CandidateContent { parts } }
        })
        .collect();

    RestoreResponse { candidates }
}

fn convert_part(part: &Part) -> ResponsePart {
    match part {
        Part::InlineData { inline_data, .. } => ResponsePart {
            text: None,
            inline_image: Some(InlineImage {
                data: inline_data.data.clone(),
                mime_type: inline_data.mime_type.clone(),
            }),
        },
        Part::Text { text, .. } => ResponsePart {
            text: Some(text.clone()),
            inline_image: None,
        },
        _ => ResponsePart::default(),
    }
}
