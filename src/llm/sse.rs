//! Decoding of chat-completion server-sent events.
//!
//! Each event carries one JSON chunk on a `data:` line; the stream ends with
//! `data: [DONE]` or when the body is exhausted.

use std::io::{BufRead, Lines};

use serde::Deserialize;

use super::{Role, StreamFragment};
use crate::error::TransportError;

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    role: Option<Role>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
}

pub struct Fragments<R> {
    lines: Lines<R>,
    done: bool,
}

impl<R: BufRead> Fragments<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            done: false,
        }
    }

    fn fail(&mut self, err: TransportError) -> Option<Result<StreamFragment, TransportError>> {
        self.done = true;
        Some(Err(err))
    }
}

impl<R: BufRead> Iterator for Fragments<R> {
    type Item = Result<StreamFragment, TransportError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return self.fail(e.into()),
            };

            // event:, id:, retry:, comments and blank separators carry nothing we need
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                self.done = true;
                return None;
            }

            let chunk = match serde_json::from_str::<StreamChunk>(data) {
                Ok(chunk) => chunk,
                Err(source) => {
                    return self.fail(TransportError::MalformedFragment {
                        line: data.to_string(),
                        source,
                    });
                }
            };
            if let Some(error) = chunk.error {
                return self.fail(TransportError::Provider(error.message));
            }

            // Azure prefixes the stream with content-filter chunks that have no choices
            let Some(choice) = chunk.choices.into_iter().next() else {
                continue;
            };
            return Some(Ok(StreamFragment {
                role: choice.delta.role,
                model_id: chunk.model,
                content: choice.delta.content.unwrap_or_default(),
                finish_reason: choice.finish_reason,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(body: &str) -> Vec<Result<StreamFragment, TransportError>> {
        Fragments::new(body.as_bytes()).collect()
    }

    #[test]
    fn test_decodes_content_in_order() {
        let body = concat!(
            "data: {\"model\":\"gpt-4o\",\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
            "data: {\"model\":\"gpt-4o\",\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"model\":\"gpt-4o\",\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );

        let fragments: Vec<StreamFragment> = decode(body).into_iter().map(Result::unwrap).collect();
        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[0].role, Some(Role::Assistant));
        assert_eq!(fragments[0].model_id.as_deref(), Some("gpt-4o"));
        assert_eq!(fragments[0].content, "");
        assert_eq!(fragments[1].content, "Hel");
        assert_eq!(fragments[2].content, "lo");
        assert_eq!(fragments[2].finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_stops_at_done() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\ndata: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n";
        let fragments = decode(body);
        assert_eq!(fragments.len(), 1);
    }

    #[test]
    fn test_ends_without_done_marker() {
        let body = "data:{\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n";
        let fragments = decode(body);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].as_ref().unwrap().content, "x");
    }

    #[test]
    fn test_skips_comments_and_empty_choices() {
        let body = concat!(
            ": keep-alive\n",
            "event: message\n",
            "data: {\"choices\":[],\"prompt_filter_results\":[]}\n",
            "\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
            "data: [DONE]\n",
        );
        let fragments = decode(body);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].as_ref().unwrap().content, "ok");
    }

    #[test]
    fn test_malformed_chunk_ends_stream() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\ndata: {not json\ndata: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n";
        let fragments = decode(body);
        assert_eq!(fragments.len(), 2);
        assert!(fragments[0].is_ok());
        assert!(matches!(
            fragments[1],
            Err(TransportError::MalformedFragment { ref line, .. }) if line == "{not json"
        ));
    }

    #[test]
    fn test_provider_error_event() {
        let body = "data: {\"error\":{\"message\":\"rate limited\"}}\n";
        let fragments = decode(body);
        assert_eq!(fragments.len(), 1);
        assert!(matches!(&fragments[0], Err(TransportError::Provider(msg)) if msg == "rate limited"));
    }
}
