use std::io::BufReader;

use reqwest::Url;
use reqwest::blocking::Request;
use reqwest::header::{HeaderMap, HeaderName};

use super::openai::{ChatRequest, chat_request, secret_header};
use super::sse::Fragments;
use super::transport::Transport;
use super::{ChatCompletion, ChatMessage, CompletionParams, FragmentStream};
use crate::config::Settings;
use crate::error::TransportError;

const API_KEY_HEADER: &str = "api-key";

/// Chat completions against an Azure OpenAI deployment.
pub struct AzureOpenAIClient<T> {
    transport: T,
    url: Url,
    api_key: String,
    service_id: String,
    model_id: String,
}

impl<T: Transport> AzureOpenAIClient<T> {
    pub fn new(transport: T, settings: &Settings) -> Result<Self, TransportError> {
        if settings.endpoint.is_empty() || settings.deployment_id.is_empty() {
            return Err(TransportError::Build(
                "Azure OpenAI requires both endpoint and deploymentId".to_string(),
            ));
        }
        let endpoint = settings.endpoint.trim_end_matches('/');
        let mut url = Url::parse(&format!(
            "{endpoint}/openai/deployments/{}/chat/completions",
            settings.deployment_id
        ))
        .map_err(|e| TransportError::Build(format!("invalid endpoint {endpoint}: {e}")))?;
        url.query_pairs_mut()
            .append_pair("api-version", &settings.api_version);
        Ok(Self {
            transport,
            url,
            api_key: settings.api_key.clone(),
            service_id: settings.service_id.clone(),
            model_id: settings.model_id.clone(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl<T: Transport> ChatCompletion for AzureOpenAIClient<T> {
    fn stream_chat(
        &self,
        history: &[ChatMessage],
        system_prompt: &str,
        params: &CompletionParams,
    ) -> Result<FragmentStream<'_>, TransportError> {
        tracing::debug!(
            service_id = %self.service_id,
            model = %self.model_id,
            messages = history.len(),
            "streaming azure chat completion"
        );
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(API_KEY_HEADER),
            secret_header(&self.api_key)?,
        );
        // the deployment in the URL selects the model
        let body = ChatRequest::new(None, history, system_prompt, params);
        let request: Request = chat_request(self.url.clone(), headers, &body)?;
        let body = self.transport.send(request)?;
        Ok(Box::new(Fragments::new(BufReader::new(body))))
    }
}
