use std::io::Read;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::{Client, Request};

use crate::error::TransportError;

/// Path of the OpenAI chat-completions operation.
pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

pub type ResponseBody = Box<dyn Read + Send>;

/// Sends a request and hands back the body of a successful response.
pub trait Transport {
    fn send(&self, request: Request) -> Result<ResponseBody, TransportError>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        // streamed completions routinely outlive reqwest's 30s default
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(None::<Duration>)
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: Request) -> Result<ResponseBody, TransportError> {
        tracing::debug!(method = %request.method(), url = %request.url(), "sending request");
        let response = self.client.execute(request)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::warn!(%status, "provider rejected request");
            return Err(TransportError::Status { status, body });
        }
        Ok(Box::new(response))
    }
}

/// Transforms an outgoing request before it is sent.
pub trait RequestInterceptor {
    fn intercept(&self, request: Request) -> Request;
}

pub struct PassThrough;

impl RequestInterceptor for PassThrough {
    fn intercept(&self, request: Request) -> Request {
        request
    }
}

/// Sends chat-completion requests to another scheme/host/port, keeping path and query.
#[derive(Debug)]
pub struct EndpointRewriter {
    target: Url,
}

impl EndpointRewriter {
    pub fn new(scheme: &str, host: &str, port: u16) -> Result<Self, TransportError> {
        let invalid = |reason: &str| {
            TransportError::Build(format!(
                "invalid custom endpoint {scheme}://{host}:{port}: {reason}"
            ))
        };
        let mut target =
            Url::parse(&format!("{scheme}://{host}/")).map_err(|e| invalid(&e.to_string()))?;
        // host must be a bare host name, so nothing may spill into other URL parts
        let bare_host = target
            .host_str()
            .is_some_and(|parsed| parsed.eq_ignore_ascii_case(host));
        if target.cannot_be_a_base()
            || !bare_host
            || target.port().is_some()
            || target.path() != "/"
            || target.query().is_some()
            || target.fragment().is_some()
            || !target.username().is_empty()
            || target.password().is_some()
        {
            return Err(invalid("host must be a bare host name"));
        }
        target
            .set_port(Some(port))
            .map_err(|()| invalid("scheme does not take a port"))?;
        Ok(Self { target })
    }

    pub fn target(&self) -> &Url {
        &self.target
    }
}

impl RequestInterceptor for EndpointRewriter {
    fn intercept(&self, mut request: Request) -> Request {
        if request.url().path() != CHAT_COMPLETIONS_PATH {
            return request;
        }
        let mut url = self.target.clone();
        url.set_path(request.url().path());
        url.set_query(request.url().query());
        tracing::debug!(from = %request.url(), to = %url, "redirecting chat completion");
        *request.url_mut() = url;
        request
    }
}

/// A transport that passes every request through an interceptor first.
pub struct Intercepted<I, T> {
    interceptor: I,
    inner: T,
}

impl<I, T> Intercepted<I, T> {
    pub fn new(interceptor: I, inner: T) -> Self {
        Self { interceptor, inner }
    }
}

impl<I: RequestInterceptor, T: Transport> Transport for Intercepted<I, T> {
    fn send(&self, request: Request) -> Result<ResponseBody, TransportError> {
        self.inner.send(self.interceptor.intercept(request))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::io::Cursor;

    use reqwest::Method;
    use reqwest::blocking::Body;
    use reqwest::header::{AUTHORIZATION, HeaderValue};

    use super::*;

    fn request(url: &str) -> Request {
        let mut request = Request::new(Method::POST, Url::parse(url).unwrap());
        request
            .headers_mut()
            .insert(AUTHORIZATION, HeaderValue::from_static("Bearer sk-test"));
        *request.body_mut() = Some(Body::from(b"{\"stream\":true}".to_vec()));
        request
    }

    fn body_bytes(request: &Request) -> Vec<u8> {
        request
            .body()
            .and_then(Body::as_bytes)
            .map(<[u8]>::to_vec)
            .unwrap_or_default()
    }

    #[derive(Default)]
    struct RecordingTransport {
        urls: RefCell<Vec<String>>,
    }

    impl Transport for RecordingTransport {
        fn send(&self, request: Request) -> Result<ResponseBody, TransportError> {
            self.urls.borrow_mut().push(request.url().to_string());
            Ok(Box::new(Cursor::new(Vec::new())))
        }
    }

    #[test]
    fn test_rewrites_chat_completions() {
        let rewriter = EndpointRewriter::new("http", "localhost", 3000).unwrap();
        let original = request("https://api.openai.com/v1/chat/completions?trace=1");

        let rewritten = rewriter.intercept(original);
        assert_eq!(
            rewritten.url().as_str(),
            "http://localhost:3000/v1/chat/completions?trace=1"
        );
        assert_eq!(rewritten.method(), &Method::POST);
        assert_eq!(rewritten.headers()[AUTHORIZATION], "Bearer sk-test");
        assert_eq!(body_bytes(&rewritten), b"{\"stream\":true}");
    }

    #[test]
    fn test_rewrites_to_https_target() {
        let rewriter = EndpointRewriter::new("https", "llm.internal", 8443).unwrap();
        let rewritten = rewriter.intercept(request("http://api.openai.com/v1/chat/completions"));
        assert_eq!(
            rewritten.url().as_str(),
            "https://llm.internal:8443/v1/chat/completions"
        );
    }

    #[test]
    fn test_other_paths_untouched() {
        let rewriter = EndpointRewriter::new("http", "localhost", 3000).unwrap();
        for url in [
            "https://api.openai.com/v1/models",
            "https://api.openai.com/v1/chat/completions/",
            "https://api.openai.com/V1/chat/completions",
            "https://api.openai.com/v1/embeddings?x=y",
        ] {
            let original = request(url);
            let expected_url = original.url().clone();
            let expected_headers = original.headers().clone();
            let expected_body = body_bytes(&original);

            let passed = rewriter.intercept(original);
            assert_eq!(passed.url(), &expected_url);
            assert_eq!(passed.headers(), &expected_headers);
            assert_eq!(body_bytes(&passed), expected_body);
        }
    }

    #[test]
    fn test_invalid_target() {
        assert!(EndpointRewriter::new("http", "bad host", 3000).is_err());
        assert!(EndpointRewriter::new("", "localhost", 3000).is_err());
    }

    #[test]
    fn test_host_with_url_syntax_rejected() {
        for host in ["localhost/api", "localhost?x", "localhost#top", "user@localhost", "localhost:8080"] {
            assert!(
                matches!(EndpointRewriter::new("http", host, 3000), Err(TransportError::Build(_))),
                "{host} was accepted"
            );
        }
    }

    #[test]
    fn test_target_keeps_configured_port() {
        let rewriter = EndpointRewriter::new("http", "LocalHost", 3000).unwrap();
        assert_eq!(rewriter.target().port_or_known_default(), Some(3000));

        let rewritten = rewriter.intercept(request("https://api.openai.com/v1/chat/completions"));
        assert_eq!(rewritten.url().port_or_known_default(), Some(3000));
        assert_eq!(rewritten.url().host_str(), Some("localhost"));
    }

    #[test]
    fn test_intercepted_transport_sends_rewritten_request() {
        let rewriter = EndpointRewriter::new("http", "127.0.0.1", 11434).unwrap();
        let transport = Intercepted::new(rewriter, RecordingTransport::default());

        transport
            .send(request("https://api.openai.com/v1/chat/completions"))
            .unwrap();
        transport
            .send(request("https://api.openai.com/v1/models"))
            .unwrap();

        assert_eq!(
            *transport.inner.urls.borrow(),
            vec![
                "http://127.0.0.1:11434/v1/chat/completions".to_string(),
                "https://api.openai.com/v1/models".to_string(),
            ]
        );
    }

    #[test]
    fn test_pass_through() {
        let transport = Intercepted::new(PassThrough, RecordingTransport::default());
        transport
            .send(request("https://api.openai.com/v1/chat/completions"))
            .unwrap();
        assert_eq!(
            *transport.inner.urls.borrow(),
            vec!["https://api.openai.com/v1/chat/completions".to_string()]
        );
    }
}
