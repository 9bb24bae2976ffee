//! Gemini API client
//!
//! Streams replies from `streamGenerateContent` over SSE and maps each
//! chunk to [`ModelEvent`]s. Uses a long-lived reqwest::Client for
//! connection pooling. The API key travels in the `x-goog-api-key` header
//! and never in the URL, so transport errors cannot echo it into logs.

use crate::error::OrchestrationError;
use crate::llm::{LanguageModel, ModelEvent, ModelRequest, ModelStream};
use crate::models::{Message, ToolOutcome};
use crate::tools::ToolDefinition;
use crate::Result;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    /// Point at a different endpoint (gateways, local fakes)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn stream_url(&self) -> String {
        format!("{}/{}:streamGenerateContent?alt=sse", self.base_url, self.model)
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn stream(&self, request: ModelRequest) -> Result<ModelStream> {
        if self.api_key.is_empty() {
            return Err(OrchestrationError::LlmError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let body = translate_request(&request);

        info!(model = %self.model, messages = request.messages.len(), "Calling Gemini API");

        let response = self
            .client
            .post(self.stream_url())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                error!("Gemini API request failed: {}", e);
                OrchestrationError::LlmError(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(OrchestrationError::LlmError(format!(
                "Gemini API error {}: {}",
                status, error_text
            )));
        }

        let events = response
            .bytes_stream()
            .eventsource()
            .map(|event| match event {
                Ok(event) => parse_chunk(&event.data),
                Err(e) => Err(OrchestrationError::LlmError(format!(
                    "Gemini stream error: {}",
                    e
                ))),
            })
            .flat_map(|parsed| {
                let items: Vec<Result<ModelEvent>> = match parsed {
                    Ok(events) => events.into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                };
                stream::iter(items)
            })
            .chain(stream::once(async { Ok(ModelEvent::Done) }));

        Ok(events.boxed())
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Build the wire request from the turn's history and capabilities
fn translate_request(request: &ModelRequest) -> GeminiRequest {
    let contents = request.messages.iter().map(translate_message).collect();

    let tools = if request.tools.is_empty() {
        None
    } else {
        Some(vec![GeminiTool {
            function_declarations: request.tools.iter().map(translate_tool).collect(),
        }])
    };

    GeminiRequest {
        contents,
        system_instruction: Some(Content {
            role: None,
            parts: vec![Part::Text {
                text: request.system.clone(),
            }],
        }),
        tools,
        generation_config: GenerationConfig {
            temperature: 0.3,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 1024,
        },
    }
}

fn translate_message(message: &Message) -> Content {
    let (role, parts) = match message {
        Message::User { content } => ("user", vec![Part::Text { text: content.clone() }]),
        Message::AssistantText { content } => ("model", vec![Part::Text { text: content.clone() }]),
        Message::AssistantToolCall { calls } => (
            "model",
            calls
                .iter()
                .map(|call| Part::FunctionCall {
                    function_call: FunctionCall {
                        name: call.capability_name.clone(),
                        args: call.arguments.clone(),
                    },
                })
                .collect(),
        ),
        Message::ToolResult { results } => (
            "user",
            results
                .iter()
                .map(|result| {
                    let response = match &result.outcome {
                        ToolOutcome::Success { summary, data } => {
                            json!({ "result": summary, "data": data })
                        }
                        ToolOutcome::Failure { kind } => json!({ "error": kind.to_string() }),
                    };
                    Part::FunctionResponse {
                        function_response: FunctionResponse {
                            name: result.capability_name.clone(),
                            response,
                        },
                    }
                })
                .collect(),
        ),
    };

    Content {
        role: Some(role.to_string()),
        parts,
    }
}

/// Gemini rejects an OBJECT schema with no properties, so argument-less
/// capabilities are declared without `parameters`.
fn translate_tool(tool: &ToolDefinition) -> FunctionDeclaration {
    let has_properties = tool.parameters["properties"]
        .as_object()
        .is_some_and(|properties| !properties.is_empty());

    FunctionDeclaration {
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters: has_properties.then(|| tool.parameters.clone()),
    }
}

/// Map one SSE `data:` payload to model events
fn parse_chunk(data: &str) -> Result<Vec<ModelEvent>> {
    if data.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chunk: GeminiChunk = serde_json::from_str(data).map_err(|e| {
        error!("Failed to parse Gemini chunk: {}", e);
        OrchestrationError::LlmError(format!("Gemini parse error: {}", e))
    })?;

    if let Some(err) = chunk.error {
        return Err(OrchestrationError::LlmError(format!(
            "Gemini stream error: {}",
            err.message
        )));
    }

    let mut events = Vec::new();
    let Some(candidate) = chunk.candidates.into_iter().next() else {
        return Ok(events);
    };

    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        match part {
            Part::Text { text } if !text.is_empty() => events.push(ModelEvent::TextDelta(text)),
            Part::FunctionCall { function_call } => events.push(ModelEvent::ToolCall {
                name: function_call.name,
                arguments: if function_call.args.is_null() {
                    json!({})
                } else {
                    function_call.args
                },
            }),
            _ => {}
        }
    }

    if let Some(reason) = candidate.finish_reason {
        debug!(finish_reason = %reason, "Gemini candidate finished");
    }

    Ok(events)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponse,
    },
    Other(Value),
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CallRecord, FailureKind, ResultRecord};

    #[test]
    fn test_request_serialization() {
        let call = CallRecord::new("lookup-price", json!({"symbol": "TSLA"}));
        let result = ResultRecord {
            call_id: call.call_id,
            capability_name: "lookup-price".to_string(),
            outcome: ToolOutcome::Failure {
                kind: FailureKind::Unavailable,
            },
        };
        let request = ModelRequest {
            system: "reply in lower case".to_string(),
            messages: vec![
                Message::user("price of TSLA"),
                Message::tool_call(call),
                Message::tool_result(result),
                Message::assistant_text("sorry"),
            ],
            tools: vec![
                ToolDefinition {
                    name: "lookup-price".to_string(),
                    description: "price".to_string(),
                    parameters: json!({
                        "type": "object",
                        "properties": {"symbol": {"type": "string"}},
                        "required": ["symbol"]
                    }),
                },
                ToolDefinition {
                    name: "list-trade-history".to_string(),
                    description: "trades".to_string(),
                    parameters: json!({"type": "object", "properties": {}}),
                },
            ],
        };

        let value = serde_json::to_value(translate_request(&request)).unwrap();

        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "reply in lower case");
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["contents"][1]["parts"][0]["functionCall"]["args"]["symbol"], "TSLA");
        assert_eq!(value["contents"][2]["role"], "user");
        assert_eq!(value["contents"][2]["parts"][0]["functionResponse"]["response"]["error"], "unavailable");
        assert_eq!(value["contents"][3]["role"], "model");

        let declarations = &value["tools"][0]["functionDeclarations"];
        assert_eq!(declarations[0]["name"], "lookup-price");
        assert_eq!(declarations[0]["parameters"]["properties"]["symbol"]["type"], "string");
        assert_eq!(declarations[1]["name"], "list-trade-history");
        assert!(declarations[1].get("parameters").is_none());
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 1024);
    }

    #[test]
    fn test_parse_text_chunk() {
        let data = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"hello "}]}}]}"#;
        assert_eq!(
            parse_chunk(data).unwrap(),
            vec![ModelEvent::TextDelta("hello ".to_string())]
        );
    }

    #[test]
    fn test_parse_function_call_chunk() {
        let data = r#"{"candidates":[{"content":{"parts":[{"functionCall":{"name":"list-trade-history"}}]},"finishReason":"STOP"}]}"#;
        assert_eq!(
            parse_chunk(data).unwrap(),
            vec![ModelEvent::ToolCall {
                name: "list-trade-history".to_string(),
                arguments: json!({}),
            }]
        );
    }

    #[test]
    fn test_parse_error_and_garbage() {
        let err = parse_chunk(r#"{"error":{"code":429,"message":"quota"}}"#).unwrap_err();
        assert!(matches!(err, OrchestrationError::LlmError(m) if m.contains("quota")));
        assert!(parse_chunk("not json").is_err());
        assert!(parse_chunk("").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = GeminiClient::new(String::new(), "gemini-2.0-flash".to_string()).unwrap();
        let request = ModelRequest {
            system: String::new(),
            messages: vec![Message::user("what is RSI?")],
            tools: vec![],
        };

        let err = client.stream(request).await.err().unwrap();
        assert!(err.to_string().to_lowercase().contains("api_key"));
    }

    fn hello() -> ModelRequest {
        ModelRequest {
            system: String::new(),
            messages: vec![Message::user("hello")],
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn test_api_key_sent_as_header_not_in_url() {
        use axum::http::{HeaderMap, StatusCode, Uri};

        async fn echo(uri: Uri, headers: HeaderMap) -> (StatusCode, String) {
            let status = match headers.get(API_KEY_HEADER) {
                Some(key) if key.as_bytes() == b"SECRET-KEY-123" => StatusCode::IM_A_TEAPOT,
                _ => StatusCode::UNAUTHORIZED,
            };
            (status, format!("query={}", uri.query().unwrap_or("")))
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, axum::Router::new().fallback(echo)).await.unwrap();
        });

        let client = GeminiClient::new("SECRET-KEY-123".to_string(), "m".to_string())
            .unwrap()
            .with_base_url(&format!("http://{}", addr));
        let err = client.stream(hello()).await.err().unwrap().to_string();
        server.abort();

        assert!(err.contains("418"), "{}", err);
        assert!(err.contains("query=alt=sse"), "{}", err);
        assert!(!err.contains("SECRET-KEY-123"), "{}", err);
    }

    #[tokio::test]
    async fn test_transport_error_does_not_leak_api_key() {
        let client = GeminiClient::new("SECRET-KEY-123".to_string(), "m".to_string())
            .unwrap()
            .with_base_url("http://127.0.0.1:1");

        let err = client.stream(hello()).await.err().unwrap();

        assert!(matches!(err, OrchestrationError::LlmError(_)));
        assert!(!err.to_string().contains("SECRET-KEY-123"), "{}", err);
    }
}
