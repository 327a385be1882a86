use async_trait::async_trait;

use crate::{error::Result, models::*};

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    fn name(&self) -> &'static str;

    fn default_model(&self) -> &'static str;
}
