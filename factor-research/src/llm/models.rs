//! Model presets and provider credentials.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEEPSEEK_API_BASE: &str = "https://ark.cn-beijing.volces.com/api/v3";

/// Provider credentials and generation defaults, read from the environment
#[derive(Clone)]
pub struct Settings {
    pub openai_api_key: String,
    pub openai_endpoint: String,
    pub deepseek_api_key: String,
    pub deepseek_endpoint: String,
    pub default_model: String,
    pub model_temperature: f32,
    pub max_tokens: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_endpoint: OPENAI_API_BASE.to_string(),
            deepseek_api_key: String::new(),
            deepseek_endpoint: DEEPSEEK_API_BASE.to_string(),
            default_model: "gpt-4".to_string(),
            model_temperature: 0.1,
            max_tokens: 4096,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("openai_endpoint", &self.openai_endpoint)
            .field("deepseek_api_key", &redact(&self.deepseek_api_key))
            .field("deepseek_endpoint", &self.deepseek_endpoint)
            .field("default_model", &self.default_model)
            .field("model_temperature", &self.model_temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup; missing or empty keys keep defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            openai_api_key: get("OPENAI_API_KEY").unwrap_or(defaults.openai_api_key),
            openai_endpoint: get("OPENAI_ENDPOINT").unwrap_or(defaults.openai_endpoint),
            deepseek_api_key: get("DEEPSEEK_API_KEY").unwrap_or(defaults.deepseek_api_key),
            deepseek_endpoint: get("DEEPSEEK_ENDPOINT").unwrap_or(defaults.deepseek_endpoint),
            default_model: get("DEFAULT_MODEL").unwrap_or(defaults.default_model),
            model_temperature: parse_or("MODEL_TEMPERATURE", get("MODEL_TEMPERATURE"), defaults.model_temperature),
            max_tokens: parse_or("MAX_TOKENS", get("MAX_TOKENS"), defaults.max_tokens),
        }
    }
}

fn parse_or<T: FromStr + Copy + fmt::Display>(key: &str, value: Option<String>, default: T) -> T {
    match value {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}, using {}", key, raw, default);
            default
        }),
        None => default,
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

/// Everything needed to call one model
#[derive(Clone, PartialEq)]
pub struct ModelConfig {
    /// Provider-qualified identifier, e.g. `deepseek/deepseek-r1-250120`
    pub identifier: String,
    pub api_key: String,
    pub api_base: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Provider honours `response_format = json_object`
    pub supports_json_object: bool,
    /// Provider honours `response_format = json_schema`
    pub supports_native_schema: bool,
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("identifier", &self.identifier)
            .field("api_key", &redact(&self.api_key))
            .field("api_base", &self.api_base)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("supports_json_object", &self.supports_json_object)
            .field("supports_native_schema", &self.supports_native_schema)
            .finish()
    }
}

impl ModelConfig {
    pub fn new(
        identifier: impl Into<String>,
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        let identifier = identifier.into();
        Self {
            supports_json_object: !identifier.contains("DeepSeek-V3"),
            supports_native_schema: false,
            identifier,
            api_key: api_key.into(),
            api_base: api_base.into(),
            max_tokens,
            temperature,
        }
    }

    pub fn with_native_schema(mut self, enabled: bool) -> Self {
        self.supports_native_schema = enabled;
        self
    }

    /// DeepSeek models get their schema instructions in Chinese
    pub fn is_deepseek(&self) -> bool {
        self.identifier.to_lowercase().starts_with("deepseek")
    }

    /// OpenAI o-series reasoning models (`o1`, `o3-mini`, ...). They take
    /// `max_completion_tokens` and reject `max_tokens` and `temperature`.
    pub fn is_reasoning_model(&self) -> bool {
        let mut chars = self.api_model_name().chars();
        matches!(chars.next(), Some('o' | 'O')) && chars.next().is_some_and(|c| c.is_ascii_digit())
    }

    /// Identifier without the `provider/` prefix, as the endpoint expects it
    pub fn api_model_name(&self) -> &str {
        self.identifier
            .split_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.identifier)
    }
}

/// Named model presets
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelConfig>,
    default_name: String,
    settings: Settings,
}

impl ModelRegistry {
    pub fn from_settings(settings: &Settings) -> Self {
        let openai = |identifier: &str, max_tokens: u32, temperature: f32| {
            ModelConfig::new(
                identifier,
                settings.openai_api_key.clone(),
                settings.openai_endpoint.clone(),
                max_tokens,
                temperature,
            )
        };
        let deepseek = |identifier: &str, max_tokens: u32, temperature: f32| {
            ModelConfig::new(
                identifier,
                settings.deepseek_api_key.clone(),
                settings.deepseek_endpoint.clone(),
                max_tokens,
                temperature,
            )
        };

        let mut models = BTreeMap::new();
        models.insert(
            "o3-mini".to_string(),
            openai("o3-mini", 4000, 1.0).with_native_schema(true),
        );
        models.insert(
            "o3-mini-essay".to_string(),
            openai("o3-mini", 32768, 1.0).with_native_schema(true),
        );
        models.insert(
            "deepseek-r1".to_string(),
            deepseek("deepseek/deepseek-r1-250120", 8192, 0.8),
        );
        models.insert(
            "deepseek-r1-essay".to_string(),
            deepseek("deepseek/deepseek-r1-250120", 16384, 0.1),
        );
        models.insert(
            "deepseek-v3-lt".to_string(),
            deepseek("deepseek/deepseek-v3-241226", 2048, 0.1),
        );

        // Configured default model, unless it names one of the presets
        models
            .entry(settings.default_model.clone())
            .or_insert_with(|| {
                openai(
                    &settings.default_model,
                    settings.max_tokens,
                    settings.model_temperature,
                )
            });

        Self {
            models,
            default_name: settings.default_model.clone(),
            settings: settings.clone(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelConfig> {
        self.models.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    /// Resolve a model name.
    ///
    /// `None` selects the configured default. Names that are not presets are
    /// treated as OpenAI-compatible identifiers with the default limits.
    pub fn lookup(&self, name: Option<&str>) -> ModelConfig {
        let name = name.unwrap_or(&self.default_name);
        if let Some(config) = self.models.get(name) {
            return config.clone();
        }

        tracing::warn!("Model '{}' is not a preset, using default limits", name);
        let (api_key, api_base) = if name.to_lowercase().starts_with("deepseek") {
            (&self.settings.deepseek_api_key, &self.settings.deepseek_endpoint)
        } else {
            (&self.settings.openai_api_key, &self.settings.openai_endpoint)
        };

        ModelConfig::new(
            name,
            api_key.clone(),
            api_base.clone(),
            self.settings.max_tokens,
            self.settings.model_temperature,
        )
    }
}
