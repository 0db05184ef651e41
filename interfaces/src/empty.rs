use anyhow::Result;
use async_trait::async_trait;

use crate::defs::LanguageModel;
use crate::defs::LlmTask;

/// A language model that never answers. Every caller takes its fallback path.
pub struct EmptyLanguageModel;

#[async_trait]
impl LanguageModel for EmptyLanguageModel {
    fn model_name(&self) -> String {
        "empty".to_owned()
    }

    async fn generate(&self, _task: LlmTask, _prompt: &str) -> Result<Option<String>> {
        Ok(None)
    }
}
