//! OpenAI-compatible chat completions judge.
//!
//! Works with the OpenAI API and with local servers exposing the same
//! `/v1/chat/completions` shape (llama.cpp, vLLM, Ollama).

use async_trait::async_trait;

use super::error::{JudgeError, JudgeResult};
use super::http::{build_client, send_json};
use super::image::{EncodedImage, encode_image};
use super::prompt::{SYSTEM_PROMPT, build_user_prompt};
use super::response::parse_judgment;
use super::{Judge, JudgeRequest, VisualJudgment};
use crate::config::JudgeSettings;

pub struct OpenAiJudge {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    request_timeout: u64,
}

impl OpenAiJudge {
    pub fn new(settings: &JudgeSettings) -> JudgeResult<Self> {
        Ok(Self {
            client: build_client(settings)?,
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            max_tokens: settings.max_tokens,
            request_timeout: settings.request_timeout,
        })
    }

    fn build_body(&self, request: &JudgeRequest, images: &[EncodedImage; 3]) -> serde_json::Value {
        let [before, after, ground_truth] = images;
        serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": build_user_prompt(&request.context) },
                        { "type": "text", "text": "Before interaction:" },
                        { "type": "image_url", "image_url": { "url": before.data_url() } },
                        { "type": "text", "text": "After interaction:" },
                        { "type": "image_url", "image_url": { "url": after.data_url() } },
                        { "type": "text", "text": "Ground truth:" },
                        { "type": "image_url", "image_url": { "url": ground_truth.data_url() } }
                    ]
                }
            ],
            "max_tokens": self.max_tokens,
            "temperature": 0
        })
    }
}

#[async_trait]
impl Judge for OpenAiJudge {
    fn name(&self) -> &str {
        "openai"
    }

    async fn judge(&self, request: &JudgeRequest) -> JudgeResult<VisualJudgment> {
        let images = [
            encode_image(&request.before).await?,
            encode_image(&request.after).await?,
            encode_image(&request.ground_truth).await?,
        ];
        let body = self.build_body(request, &images);

        let mut http = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = send_json(http, self.request_timeout).await?;

        let message = &response["choices"][0]["message"];
        // Thinking models may put everything in reasoning_content
        let content = message["content"]
            .as_str()
            .filter(|c| !c.trim().is_empty())
            .or_else(|| message["reasoning_content"].as_str())
            .ok_or_else(|| {
                JudgeError::MalformedResponse("response has no message content".to_string())
            })?;

        let (score, rationale) = parse_judgment(content)?;
        Ok(VisualJudgment {
            score,
            rationale,
            raw_response: content.to_string(),
        })
    }
}
