//! Anthropic messages API judge.

use async_trait::async_trait;

use super::error::{JudgeError, JudgeResult};
use super::http::{build_client, send_json};
use super::image::{EncodedImage, encode_image};
use super::prompt::{SYSTEM_PROMPT, build_user_prompt};
use super::response::parse_judgment;
use super::{Judge, JudgeRequest, VisualJudgment};
use crate::config::JudgeSettings;

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicJudge {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    request_timeout: u64,
}

impl AnthropicJudge {
    pub fn new(settings: &JudgeSettings) -> JudgeResult<Self> {
        let api_key = settings.api_key.clone().ok_or_else(|| {
            JudgeError::Authentication("no API key configured for anthropic".to_string())
        })?;

        Ok(Self {
            client: build_client(settings)?,
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            api_key,
            max_tokens: settings.max_tokens,
            request_timeout: settings.request_timeout,
        })
    }

    fn build_body(&self, request: &JudgeRequest, images: &[EncodedImage; 3]) -> serde_json::Value {
        let image_block = |image: &EncodedImage| {
            serde_json::json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": image.media_type,
                    "data": image.base64
                }
            })
        };
        let [before, after, ground_truth] = images;

        serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": 0,
            "system": SYSTEM_PROMPT,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": build_user_prompt(&request.context) },
                    { "type": "text", "text": "Before interaction:" },
                    image_block(before),
                    { "type": "text", "text": "After interaction:" },
                    image_block(after),
                    { "type": "text", "text": "Ground truth:" },
                    image_block(ground_truth)
                ]
            }]
        })
    }
}

#[async_trait]
impl Judge for AnthropicJudge {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn judge(&self, request: &JudgeRequest) -> JudgeResult<VisualJudgment> {
        let images = [
            encode_image(&request.before).await?,
            encode_image(&request.after).await?,
            encode_image(&request.ground_truth).await?,
        ];
        let body = self.build_body(request, &images);

        let http = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body);

        let response = send_json(http, self.request_timeout).await?;

        let text = response["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|b| b["type"] == "text")
                    .filter_map(|b| b["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                JudgeError::MalformedResponse("response has no text content".to_string())
            })?;

        let (score, rationale) = parse_judgment(&text)?;
        Ok(VisualJudgment {
            score,
            rationale,
            raw_response: text,
        })
    }
}
