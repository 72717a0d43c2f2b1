use std::env;
use crate::error::{AppError, Result};
use dotenvy::dotenv;
use tracing::debug;

/// Model used when neither the environment nor settings name one.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";

#[derive(Clone, Debug)]
pub struct Config {
    pub gemini_api_key: String,
    pub model_name: String
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if it exists, ignore if it doesn't
        let _ = dotenv();

        // A missing key is not fatal here; the service rejects the call later.
        let api_key = env::var("GEMINI_API_KEY")
            .or_else(|_| env::var("API_KEY"))
            .unwrap_or_else(|_| {
                debug!("GEMINI_API_KEY is not set");
                String::new()
            });

        let model_name = env::var("GEMINI_MODEL")
            .unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Self::builder()
            .with_api_key(api_key)
            .with_model(model_name)
            .build()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn has_api_key(&self) -> bool {
        !self.gemini_api_key.trim().is_empty()
    }
}

/// Builder for overriding individual configuration values.
#[derive(Default, Debug)]
pub struct ConfigBuilder {
    api_key: Option<String>,
    model: Option<String>,
}

impl ConfigBuilder {
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn build(self) -> Result<Config> {
        let model_name = self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        if model_name.trim().is_empty() {
            return Err(AppError::config("Model name must not be empty"));
        }

        Ok(Config {
            gemini_api_key: self.api_key.unwrap_or_default(),
            model_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_to_image_model() {
        let config = Config::builder().with_api_key("key").build().unwrap();
        assert_eq!(config.model_name, DEFAULT_MODEL);
        assert!(config.has_api_key());
    }

    #[test]
    fn builder_rejects_blank_model() {
        let err = Config::builder().with_model("  ").build().unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn missing_key_is_allowed() {
        let config = Config::builder().with_model("gemini-flash-latest").build().unwrap();
        assert!(!config.has_api_key());
        assert_eq!(config.model_name, "gemini-flash-latest");
    }
}
