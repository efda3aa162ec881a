//! Provider router: selects the correct LLM provider for a request.
//!
//! Providers are built once from configuration. A request may name a
//! provider and carry its own API key; the key override produces a
//! short-lived copy of the configured adapter and is never stored.

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;
use notegraph_core::error::ProviderError;
use notegraph_core::provider::Provider;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A registered provider, typed where an API-key override is possible.
#[derive(Clone)]
enum Routed {
    OpenAi(Arc<OpenAiCompatProvider>),
    Anthropic(Arc<AnthropicProvider>),
    Opaque(Arc<dyn Provider>),
}

impl Routed {
    fn shared(&self) -> Arc<dyn Provider> {
        match self {
            Routed::OpenAi(p) => p.clone(),
            Routed::Anthropic(p) => p.clone(),
            Routed::Opaque(p) => p.clone(),
        }
    }

    fn with_api_key(&self, api_key: &str) -> Arc<dyn Provider> {
        match self {
            Routed::OpenAi(p) => Arc::new(p.with_api_key(api_key)),
            Routed::Anthropic(p) => Arc::new(p.with_api_key(api_key)),
            Routed::Opaque(p) => p.clone(),
        }
    }
}

/// Routes LLM requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Routed>,
    default_models: HashMap<String, String>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_models: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register any provider. Per-request API keys are ignored for it.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), Routed::Opaque(provider));
    }

    fn register_openai(&mut self, name: impl Into<String>, provider: OpenAiCompatProvider) {
        self.providers
            .insert(name.into(), Routed::OpenAi(Arc::new(provider)));
    }

    fn register_anthropic(&mut self, name: impl Into<String>, provider: AnthropicProvider) {
        self.providers
            .insert(name.into(), Routed::Anthropic(Arc::new(provider)));
    }

    /// Set the model used when a request names this provider but no model.
    pub fn set_default_model(&mut self, provider: impl Into<String>, model: impl Into<String>) {
        self.default_models.insert(provider.into(), model.into());
    }

    pub fn default_model_for(&self, provider: &str) -> Option<&str> {
        self.default_models.get(provider).map(|s| s.as_str())
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).map(Routed::shared)
    }

    /// Resolve the provider for one request.
    ///
    /// `name` falls back to the default provider; a non-empty `api_key`
    /// replaces the configured key for this request only.
    pub fn resolve(
        &self,
        name: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        let name = name.filter(|n| !n.is_empty()).unwrap_or(self.default_provider.as_str());
        let routed = self
            .providers
            .get(name)
            .ok_or_else(|| ProviderError::NotConfigured(format!("unknown provider '{name}'")))?;

        match api_key.filter(|k| !k.is_empty()) {
            Some(key) => {
                debug!(provider = name, "Using per-request API key");
                Ok(routed.with_api_key(key))
            }
            None => Ok(routed.shared()),
        }
    }

    /// List all registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Build providers from configuration.
pub fn build_from_config(config: &notegraph_config::AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider);

    for (name, provider_config) in &config.providers {
        let api_key = provider_config
            .api_key
            .clone()
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();
        register_named(&mut router, name, &api_key, provider_config.api_url.as_deref());
        if let Some(model) = &provider_config.default_model {
            router.set_default_model(name.clone(), model.clone());
        }
    }

    // Ensure the default provider exists (even if not explicitly configured)
    if router.get(&config.default_provider).is_none() {
        let api_key = config.api_key.clone().unwrap_or_default();
        register_named(&mut router, &config.default_provider, &api_key, None);
    }
    if router.default_model_for(&config.default_provider).is_none() {
        router.set_default_model(config.default_provider.clone(), config.default_model.clone());
    }

    router
}

fn register_named(router: &mut ProviderRouter, name: &str, api_key: &str, api_url: Option<&str>) {
    if name == "anthropic" {
        let mut p = AnthropicProvider::new(api_key);
        if let Some(url) = api_url {
            p = p.with_base_url(url);
        }
        router.register_anthropic(name, p);
    } else {
        let base_url = api_url
            .map(String::from)
            .unwrap_or_else(|| default_base_url(name));
        router.register_openai(name, OpenAiCompatProvider::new(name, base_url, api_key));
    }
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => "http://localhost:8080/v1".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notegraph_config::{AppConfig, ProviderConfig};

    #[test]
    fn router_register_and_lookup() {
        let mut router = ProviderRouter::new("openrouter");
        router.register("openrouter", Arc::new(OpenAiCompatProvider::openrouter("sk-test")));

        assert!(router.get("openrouter").is_some());
        assert!(router.get("nonexistent").is_none());
        assert!(router.resolve(None, None).is_ok());
    }

    #[test]
    fn unknown_provider_is_not_configured() {
        let router = ProviderRouter::new("openrouter");
        let err = router.resolve(Some("mystery"), None).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openrouter").contains("openrouter.ai"));
        assert!(default_base_url("openai").contains("api.openai.com"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
    }

    #[test]
    fn build_from_default_config() {
        let config = AppConfig::default();
        let router = build_from_config(&config);
        assert_eq!(router.list(), vec!["openrouter"]);
        assert_eq!(router.default_model_for("openrouter"), Some(config.default_model.as_str()));
        assert_eq!(router.resolve(Some(""), Some("sk-per-request")).unwrap().name(), "openrouter");
    }

    #[test]
    fn configured_providers_are_routed_by_name() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "anthropic".into(),
            ProviderConfig {
                api_key: Some("sk-ant".into()),
                api_url: None,
                default_model: Some("claude-sonnet-4".into()),
            },
        );
        let router = build_from_config(&config);
        assert_eq!(router.list(), vec!["anthropic", "openrouter"]);
        let provider = router.resolve(Some("anthropic"), None).unwrap();
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(router.default_model_for("anthropic"), Some("claude-sonnet-4"));
    }
}
