use std::io::BufReader;

use reqwest::blocking::{Body, Request};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use serde::Serialize;

use super::sse::Fragments;
use super::transport::Transport;
use super::{ChatCompletion, ChatMessage, CompletionParams, FragmentStream, Role};
use crate::config::Settings;
use crate::error::TransportError;

pub const OPENAI_CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const ORGANIZATION_HEADER: &str = "openai-organization";

pub struct OpenAIClient<T> {
    transport: T,
    url: Url,
    model: String,
    api_key: String,
    org_id: String,
    service_id: String,
}

impl<T: Transport> OpenAIClient<T> {
    pub fn new(transport: T, settings: &Settings) -> Result<Self, TransportError> {
        let url = Url::parse(OPENAI_CHAT_COMPLETIONS_URL)
            .map_err(|e| TransportError::Build(e.to_string()))?;
        let model = if settings.model_id.is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            settings.model_id.clone()
        };
        Ok(Self {
            transport,
            url,
            model,
            api_key: settings.api_key.clone(),
            org_id: settings.org_id.clone(),
            service_id: settings.service_id.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(
        &self,
        history: &[ChatMessage],
        system_prompt: &str,
        params: &CompletionParams,
    ) -> Result<Request, TransportError> {
        let mut headers = HeaderMap::new();
        // self-hosted endpoints often run without a key
        if !self.api_key.is_empty() {
            headers.insert(
                AUTHORIZATION,
                secret_header(&format!("Bearer {}", self.api_key))?,
            );
        }
        if !self.org_id.is_empty() {
            headers.insert(
                HeaderName::from_static(ORGANIZATION_HEADER),
                header_value(&self.org_id)?,
            );
        }
        let body = ChatRequest::new(Some(&self.model), history, system_prompt, params);
        chat_request(self.url.clone(), headers, &body)
    }
}

impl<T: Transport> ChatCompletion for OpenAIClient<T> {
    fn stream_chat(
        &self,
        history: &[ChatMessage],
        system_prompt: &str,
        params: &CompletionParams,
    ) -> Result<FragmentStream<'_>, TransportError> {
        tracing::debug!(
            service_id = %self.service_id,
            model = %self.model,
            messages = history.len(),
            "streaming chat completion"
        );
        let request = self.build_request(history, system_prompt, params)?;
        let body = self.transport.send(request)?;
        Ok(Box::new(Fragments::new(BufReader::new(body))))
    }
}

#[derive(Serialize)]
pub(super) struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    #[serde(flatten)]
    params: &'a CompletionParams,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

impl<'a> ChatRequest<'a> {
    pub(super) fn new(
        model: Option<&'a str>,
        history: &'a [ChatMessage],
        system_prompt: &'a str,
        params: &'a CompletionParams,
    ) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if !system_prompt.is_empty() {
            messages.push(WireMessage {
                role: Role::System,
                content: system_prompt,
            });
        }
        messages.extend(history.iter().map(|m| WireMessage {
            role: m.role,
            content: &m.content,
        }));
        Self {
            model,
            messages,
            stream: true,
            params,
        }
    }
}

/// Assembles a streaming chat-completion POST.
pub(super) fn chat_request(
    url: Url,
    mut headers: HeaderMap,
    body: &ChatRequest<'_>,
) -> Result<Request, TransportError> {
    let payload = serde_json::to_vec(body).map_err(|e| TransportError::Build(e.to_string()))?;
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

    let mut request = Request::new(Method::POST, url);
    *request.headers_mut() = headers;
    *request.body_mut() = Some(Body::from(payload));
    Ok(request)
}

pub(super) fn header_value(value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value).map_err(|e| TransportError::Build(format!("invalid header value: {e}")))
}

pub(super) fn secret_header(value: &str) -> Result<HeaderValue, TransportError> {
    let mut value = header_value(value)?;
    value.set_sensitive(true);
    Ok(value)
}
