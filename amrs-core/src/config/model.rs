use anyhow::Result;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::backend::{Backend, BackendId, RoutingMode};

/// 已知提供商的默认API地址
pub static PROVIDER_BASE_URLS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("openai", "https://api.openai.com/v1");
    m.insert("deepinfra", "https://api.deepinfra.com/v1/openai");
    m.insert("openrouter", "https://openrouter.ai/api/v1");
    m
});

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub settings: GlobalSettings,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

/// 全局设置，模型级配置未填写时继承这里的值
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GlobalSettings {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default)]
    pub routing_mode: RoutingMode,
    /// 随机源种子，设置后路由结果可复现
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            routing_mode: RoutingMode::default(),
            seed: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    pub id: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    /// 仅在 weighted_round_robin 模式下必填
    #[serde(default)]
    pub weight: Option<u32>,
    #[serde(default)]
    pub max_concurrency: Option<u32>,
}

impl ModelConfig {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            provider: None,
            base_url: None,
            temperature: None,
            max_output_tokens: None,
            weight: None,
            max_concurrency: None,
        }
    }

    pub fn provider(mut self, provider: &str) -> Self {
        self.provider = Some(provider.to_string());
        self
    }

    pub fn base_url(mut self, url: &str) -> Self {
        self.base_url = Some(url.to_string());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn max_concurrency(mut self, max_concurrency: u32) -> Self {
        self.max_concurrency = Some(max_concurrency);
        self
    }
}

// Default value functions
fn default_provider() -> String {
    "amrs".to_string()
}

fn default_temperature() -> f32 {
    0.8
}

fn default_max_output_tokens() -> u32 {
    1024
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider(mut self, provider: &str) -> Self {
        self.settings.provider = provider.to_string();
        self
    }

    pub fn base_url(mut self, url: &str) -> Self {
        self.settings.base_url = Some(url.to_string());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.settings.temperature = temperature;
        self
    }

    pub fn max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.settings.max_output_tokens = max_output_tokens;
        self
    }

    pub fn routing_mode(mut self, mode: RoutingMode) -> Self {
        self.settings.routing_mode = mode;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.settings.seed = Some(seed);
        self
    }

    pub fn add_model(mut self, model: ModelConfig) -> Self {
        self.models.push(model);
        self
    }

    /// 填充默认值并验证，返回可直接用于构造路由器的配置
    pub fn resolve(mut self) -> Result<Self> {
        self.apply_defaults();
        self.validate()?;
        Ok(self)
    }

    fn apply_defaults(&mut self) {
        for model in &mut self.models {
            let provider = model
                .provider
                .get_or_insert_with(|| self.settings.provider.clone())
                .clone();

            if model.base_url.is_none() {
                // 全局base_url优先于内置表
                model.base_url = self.settings.base_url.clone().or_else(|| {
                    PROVIDER_BASE_URLS
                        .get(provider.to_ascii_lowercase().as_str())
                        .map(|url| url.to_string())
                });
                if let Some(url) = &model.base_url {
                    tracing::debug!("Model '{}' inherits base_url {}", model.id, url);
                }
            }

            model.temperature.get_or_insert(self.settings.temperature);
            model
                .max_output_tokens
                .get_or_insert(self.settings.max_output_tokens);
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            anyhow::bail!("At least one model must be configured");
        }

        let mut seen = HashSet::new();
        for model in &self.models {
            self.validate_model_config(model)?;

            let backend_id = self.backend_id(model);
            if !seen.insert(backend_id.clone()) {
                anyhow::bail!("Duplicate backend '{}' in models list", backend_id);
            }
        }

        Ok(())
    }

    /// 验证单个Model配置的有效性
    fn validate_model_config(&self, model: &ModelConfig) -> Result<()> {
        if model.id.is_empty() {
            anyhow::bail!("Model has empty id");
        }

        if model.id.chars().any(char::is_whitespace) {
            anyhow::bail!(
                "Model '{}' has invalid id format (cannot contain whitespace)",
                model.id
            );
        }

        let provider = self.provider_of(model);
        if provider.is_empty() || provider.contains('/') {
            anyhow::bail!("Model '{}' has invalid provider '{}'", model.id, provider);
        }

        let base_url = match model.base_url.as_deref().or(self.settings.base_url.as_deref()) {
            Some(url) => url,
            None => anyhow::bail!("Model '{}' base_url is not provided", model.id),
        };

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            anyhow::bail!(
                "Model '{}' has invalid base_url format: '{}'. Must start with http:// or https://",
                model.id,
                base_url
            );
        }

        if let Some(temperature) = model.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                anyhow::bail!(
                    "Model '{}' temperature must be between 0.0 and 1.0, got {}",
                    model.id,
                    temperature
                );
            }
        }

        if model.max_output_tokens == Some(0) {
            anyhow::bail!("Model '{}' max_output_tokens must be positive", model.id);
        }

        if model.max_concurrency == Some(0) {
            anyhow::bail!("Model '{}' max_concurrency must be positive", model.id);
        }

        if self.settings.routing_mode == RoutingMode::WeightedRoundRobin
            && model.weight.unwrap_or(0) == 0
        {
            anyhow::bail!(
                "Model '{}' weight must be positive in weighted_round_robin routing mode",
                model.id
            );
        }

        Ok(())
    }

    /// 按配置顺序生成候选后端列表
    pub fn backends(&self) -> Vec<Backend> {
        self.models
            .iter()
            .map(|model| {
                let provider = self.provider_of(model);
                Backend {
                    id: BackendId::from_parts(provider, &model.id),
                    provider: provider.to_string(),
                    model: model.id.clone(),
                    weight: model.weight.unwrap_or(1),
                    max_concurrency: model.max_concurrency,
                }
            })
            .collect()
    }

    /// 根据后端标识查找模型配置
    pub fn get_model(&self, backend_id: &BackendId) -> Option<&ModelConfig> {
        self.models
            .iter()
            .find(|m| &self.backend_id(m) == backend_id)
    }

    fn provider_of<'a>(&'a self, model: &'a ModelConfig) -> &'a str {
        model
            .provider
            .as_deref()
            .unwrap_or(self.settings.provider.as_str())
    }

    fn backend_id(&self, model: &ModelConfig) -> BackendId {
        BackendId::from_parts(self.provider_of(model), &model.id)
    }
}
