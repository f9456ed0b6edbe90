use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};

use super::azure::AzureOpenAIClient;
use super::openai::OpenAIClient;
use super::transport::{EndpointRewriter, HttpTransport, Intercepted, Transport};
use super::{ChatCompletion, ChatMessage, CompletionParams, FragmentStream};
use crate::config::Settings;
use crate::error::{TransportError, UnsupportedServiceTypeError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceType {
    OpenAI,
    AzureOpenAI,
    /// OpenAI protocol served from a self-hosted scheme/host/port.
    CustomEndpoint,
}

impl FromStr for ServiceType {
    type Err = UnsupportedServiceTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OPENAI" => Ok(ServiceType::OpenAI),
            "AZUREOPENAI" => Ok(ServiceType::AzureOpenAI),
            "CUSTOMENDPOINT" => Ok(ServiceType::CustomEndpoint),
            _ => Err(UnsupportedServiceTypeError(s.to_string())),
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceType::OpenAI => "OpenAI",
            ServiceType::AzureOpenAI => "AzureOpenAI",
            ServiceType::CustomEndpoint => "CustomEndpoint",
        };
        f.write_str(name)
    }
}

pub enum CompletionClient {
    OpenAI(OpenAIClient<HttpTransport>),
    AzureOpenAI(AzureOpenAIClient<HttpTransport>),
    CustomEndpoint(OpenAIClient<Intercepted<EndpointRewriter, HttpTransport>>),
}

impl CompletionClient {
    /// Picks and constructs the client for `settings.service_type`. Runs once at startup.
    pub fn build(settings: &Settings) -> Result<Self> {
        let service_type: ServiceType = settings.service_type.parse()?;
        let client = match service_type {
            ServiceType::OpenAI => {
                let client = OpenAIClient::new(http_transport()?, settings)?;
                tracing::info!(model = client.model(), "using OpenAI");
                CompletionClient::OpenAI(client)
            }
            ServiceType::AzureOpenAI => {
                let client = AzureOpenAIClient::new(http_transport()?, settings)
                    .context("invalid Azure OpenAI settings")?;
                tracing::info!(url = %client.url(), "using Azure OpenAI");
                CompletionClient::AzureOpenAI(client)
            }
            ServiceType::CustomEndpoint => {
                CompletionClient::CustomEndpoint(custom_endpoint_client(settings, http_transport()?)?)
            }
        };
        Ok(client)
    }

    pub fn service_type(&self) -> ServiceType {
        match self {
            CompletionClient::OpenAI(_) => ServiceType::OpenAI,
            CompletionClient::AzureOpenAI(_) => ServiceType::AzureOpenAI,
            CompletionClient::CustomEndpoint(_) => ServiceType::CustomEndpoint,
        }
    }
}

/// OpenAI client whose chat completions are redirected to `scheme://host:port`.
fn custom_endpoint_client<T: Transport>(
    settings: &Settings,
    inner: T,
) -> Result<OpenAIClient<Intercepted<EndpointRewriter, T>>> {
    let rewriter = EndpointRewriter::new(&settings.scheme, &settings.host, settings.port)
        .context("invalid custom endpoint settings")?;
    tracing::info!(endpoint = %rewriter.target(), "using custom OpenAI-compatible endpoint");
    Ok(OpenAIClient::new(Intercepted::new(rewriter, inner), settings)?)
}

fn http_transport() -> Result<HttpTransport> {
    HttpTransport::new().context("failed to create HTTP client")
}

impl ChatCompletion for CompletionClient {
    fn stream_chat(
        &self,
        history: &[ChatMessage],
        system_prompt: &str,
        params: &CompletionParams,
    ) -> Result<FragmentStream<'_>, TransportError> {
        match self {
            CompletionClient::OpenAI(client) => client.stream_chat(history, system_prompt, params),
            CompletionClient::AzureOpenAI(client) => {
                client.stream_chat(history, system_prompt, params)
            }
            CompletionClient::CustomEndpoint(client) => {
                client.stream_chat(history, system_prompt, params)
            }
        }
    }
}
