//! 생성 모델 모듈 - Gemini generateContent / streamGenerateContent
//!
//! 키워드 추출과 최종 답변 생성이 같은 [`GenerativeModel`] 트레이트를 씁니다.
//! 스트리밍 응답은 SSE(`alt=sse`)로 받아 텍스트 조각 스트림으로 바꿉니다.
//! 스트림을 drop하면 소비만 멈추고 서버에는 취소 신호를 보내지 않습니다.
//!
//! ref: https://ai.google.dev/api/generate-content

use std::pin::Pin;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest_eventsource::{Error as EventSourceError, Event, EventSource};
use serde::{Deserialize, Serialize};

use crate::embedding::GeminiError;

/// 텍스트 조각 스트림 (도착 순서대로 이어 붙이면 전체 답변)
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

// ============================================================================
// Completion Options
// ============================================================================

/// 생성 요청 옵션
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    /// 요청 타임아웃
    pub timeout: Duration,
    /// 샘플링 온도
    pub temperature: Option<f32>,
    /// 최대 출력 토큰
    pub max_output_tokens: Option<u32>,
}

impl CompletionOptions {
    /// 타임아웃만 지정
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            temperature: None,
            max_output_tokens: None,
        }
    }
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self::with_timeout(Duration::from_secs(crate::config::DEFAULT_REQUEST_TIMEOUT_SECS))
    }
}

// ============================================================================
// GenerativeModel Trait
// ============================================================================

/// 텍스트 생성 모델 트레이트
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// 전체 응답 생성
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String>;

    /// 스트리밍 응답 생성 (기본 구현: 전체 응답을 한 조각으로)
    async fn complete_stream(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<TextStream> {
        let text = self.complete(prompt, options).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(text) })))
    }

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Gemini
// ============================================================================

/// Gemini 생성 모델 클라이언트
#[derive(Debug, Clone)]
pub struct GeminiGenerative {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiGenerative {
    /// 새 클라이언트 생성
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `model` - 모델 이름 (예: `gemini-2.5-flash`)
    pub fn new(api_key: String, model: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            model: model.into(),
            client,
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}:{}", GEMINI_API_BASE, self.model, method)
    }

    fn build_request(prompt: &str, options: &CompletionOptions) -> GenerateRequest {
        let generation_config = if options.temperature.is_some() || options.max_output_tokens.is_some()
        {
            Some(GenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_output_tokens,
            })
        } else {
            None
        };

        GenerateRequest {
            contents: vec![RequestContent {
                role: "user".to_string(),
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config,
        }
    }

    fn post(&self, url: &str, prompt: &str, options: &CompletionOptions) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(options.timeout)
            .json(&Self::build_request(prompt, options))
    }

    async fn send(
        &self,
        url: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<reqwest::Response> {
        let response = self
            .post(url, prompt, options)
            .send()
            .await
            .context("Failed to send generateContent request")?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if let Ok(error) = serde_json::from_str::<GeminiError>(&body) {
            anyhow::bail!(
                "Gemini API error ({}): {}",
                error.error.status,
                error.error.message
            );
        }
        anyhow::bail!("Gemini API error ({}): {}", status, body)
    }
}

#[async_trait]
impl GenerativeModel for GeminiGenerative {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let url = self.endpoint("generateContent");
        let response = self.send(&url, prompt, options).await?;

        let body = response
            .text()
            .await
            .context("Failed to read generateContent body")?;
        let parsed: GenerateResponse =
            serde_json::from_str(&body).context("Failed to parse generateContent response")?;

        let text = parsed.text();
        if text.is_empty() {
            if let Some(reason) = parsed.block_reason() {
                anyhow::bail!("Gemini blocked the prompt: {}", reason);
            }
            tracing::warn!("Empty completion from {}", self.model);
        }

        Ok(text)
    }

    async fn complete_stream(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<TextStream> {
        let url = format!("{}?alt=sse", self.endpoint("streamGenerateContent"));
        let events = EventSource::new(self.post(&url, prompt, options))
            .context("Failed to open streamGenerateContent event source")?;

        Ok(text_fragments(events.map(|event| {
            event.map(|event| match event {
                Event::Open => None,
                Event::Message(message) => Some(message.data),
            })
        })))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// SSE Events
// ============================================================================

/// SSE 이벤트 스트림을 텍스트 조각 스트림으로 변환
///
/// 항목은 `data:` 페이로드(`Some`) 또는 연결 열림(`None`)입니다.
/// `StreamEnded`에서 끝나고, 그 밖의 에러는 한 번 내보낸 뒤 끝납니다.
fn text_fragments<S>(payloads: S) -> TextStream
where
    S: Stream<Item = std::result::Result<Option<String>, EventSourceError>> + Send + 'static,
{
    let payloads: Pin<Box<S>> = Box::pin(payloads);

    Box::pin(futures::stream::unfold(Some(payloads), |state| async move {
        let mut payloads = state?;
        loop {
            match payloads.next().await? {
                Ok(None) => continue,
                Ok(Some(data)) => match payload_text(&data) {
                    Ok(None) => continue,
                    Ok(Some(text)) => return Some((Ok(text), Some(payloads))),
                    Err(e) => return Some((Err(e), None)),
                },
                Err(EventSourceError::StreamEnded) => return None,
                Err(e) => return Some((Err(anyhow::anyhow!("Stream error: {}", e)), None)),
            }
        }
    }))
}

/// `data:` 페이로드 하나의 텍스트 (빈 조각은 `None`)
fn payload_text(data: &str) -> Result<Option<String>> {
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }

    let event: GenerateResponse =
        serde_json::from_str(data).context("Failed to parse stream event")?;
    let text = event.text();

    Ok(if text.is_empty() { None } else { Some(text) })
}

/// 스트림을 끝까지 소비해 전체 텍스트로 합치기
pub async fn collect_text(mut stream: TextStream) -> Result<String> {
    let mut full = String::new();
    while let Some(fragment) = stream.next().await {
        full.push_str(&fragment?);
    }
    Ok(full)
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    role: String,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback", default)]
    prompt_feedback: Option<PromptFeedback>,
}

impl GenerateResponse {
    /// 첫 후보의 텍스트 파트를 이어 붙인 결과
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Debug, Deserialize)]
struct TextPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason", default)]
    block_reason: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(text: &str) -> String {
        format!(
            "{{\"candidates\":[{{\"content\":{{\"parts\":[{{\"text\":{}}}]}}}}]}}",
            serde_json::to_string(text).unwrap()
        )
    }

    type Item = std::result::Result<Option<String>, EventSourceError>;

    #[test]
    fn test_payload_text() {
        assert_eq!(payload_text(&payload("안녕하세요")).unwrap(), Some("안녕하세요".to_string()));
        assert_eq!(payload_text(&payload("")).unwrap(), None);
        assert_eq!(payload_text("[DONE]").unwrap(), None);
        assert_eq!(payload_text("  ").unwrap(), None);
    }

    #[test]
    fn test_payload_bad_json_is_error() {
        assert!(payload_text("{not json}").is_err());
    }

    #[tokio::test]
    async fn test_fragments_in_order_until_stream_ended() {
        let items: Vec<Item> = vec![
            Ok(None),
            Ok(Some(payload("첫째, "))),
            Ok(Some(payload("둘째, "))),
            Ok(Some(payload(""))),
            Ok(Some(payload("셋째"))),
            Err(EventSourceError::StreamEnded),
            Ok(Some(payload("닫힌 뒤"))),
        ];
        let text = collect_text(text_fragments(futures::stream::iter(items)))
            .await
            .unwrap();
        assert_eq!(text, "첫째, 둘째, 셋째");
    }

    #[tokio::test]
    async fn test_fragments_stop_after_bad_event() {
        let items: Vec<Item> = vec![
            Ok(Some(payload("부분"))),
            Ok(Some("{not json}".to_string())),
            Ok(Some(payload("버려짐"))),
        ];
        let mut stream = text_fragments(futures::stream::iter(items));

        assert_eq!(stream.next().await.unwrap().unwrap(), "부분");
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_fragments_end_without_stream_ended() {
        let items: Vec<Item> = vec![Ok(Some(payload("끝")))];
        let text = collect_text(text_fragments(futures::stream::iter(items)))
            .await
            .unwrap();
        assert_eq!(text, "끝");
    }

    #[test]
    fn test_request_generation_config_omitted_by_default() {
        let options = CompletionOptions::with_timeout(Duration::from_secs(5));
        let request = GeminiGenerative::build_request("질문", &options);
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("generationConfig").is_none());
        assert_eq!(json["contents"][0]["parts"][0]["text"], "질문");
    }

    #[test]
    fn test_response_text_joins_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"가"},{"text":"나"}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.text(), "가나");
    }

    #[test]
    fn test_response_block_reason() {
        let body = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.text(), "");
        assert_eq!(parsed.block_reason(), Some("SAFETY"));
    }
}
