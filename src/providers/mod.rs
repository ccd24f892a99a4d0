use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, ProviderKind};
use crate::types::{GenerateRequest, GenerateResponse};

pub mod anthropic;
pub mod mock;

#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn generate(&self, req: GenerateRequest) -> anyhow::Result<GenerateResponse>;
}

#[async_trait]
impl<P: ModelProvider + ?Sized> ModelProvider for Box<P> {
    async fn generate(&self, req: GenerateRequest) -> anyhow::Result<GenerateResponse> {
        (**self).generate(req).await
    }
}

#[async_trait]
impl<P: ModelProvider + ?Sized> ModelProvider for Arc<P> {
    async fn generate(&self, req: GenerateRequest) -> anyhow::Result<GenerateResponse> {
        (**self).generate(req).await
    }
}

pub fn build_provider(cfg: &Config) -> Box<dyn ModelProvider> {
    match cfg.llm.provider {
        ProviderKind::Anthropic => Box::new(anthropic::AnthropicProvider::new(
            cfg.llm.api_key.clone(),
            cfg.llm.base_url.clone(),
        )),
        ProviderKind::Mock => Box::new(mock::MockProvider::new()),
    }
}
