use std::io::{self, BufRead, Write};

use thiserror::Error;

use crate::error::TransportError;
use crate::llm::{
    ChatCompletion, ChatMessage, CompletionParams, MessageMetadata, Role, StreamFragment,
};

pub const USER_LABEL: &str = "User > ";
pub const ASSISTANT_LABEL: &str = "Assistant > ";

#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to write response: {0}")]
    Output(#[from] io::Error),
}

/// Read-stream-append loop over one conversation.
pub struct Session<C> {
    client: C,
    system_prompt: String,
    params: CompletionParams,
    history: Vec<ChatMessage>,
}

impl<C: ChatCompletion> Session<C> {
    pub fn new(client: C, system_prompt: impl Into<String>) -> Self {
        Self {
            client,
            system_prompt: system_prompt.into(),
            params: CompletionParams::default(),
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Alternates between reading a line and streaming the reply until input ends.
    pub fn run<R: BufRead, W: Write>(&mut self, mut input: R, output: &mut W) -> io::Result<()> {
        let mut line = String::new();
        loop {
            output.write_all(USER_LABEL.as_bytes())?;
            output.flush()?;

            line.clear();
            if input.read_line(&mut line)? == 0 {
                output.write_all(b"\n")?;
                output.flush()?;
                tracing::debug!(turns = self.history.len() / 2, "input closed");
                return Ok(());
            }

            match self.turn(strip_line_ending(&line), output) {
                Ok(()) => {}
                Err(TurnError::Transport(err)) => {
                    tracing::error!(error = %err, "chat completion failed");
                    writeln!(output)?;
                    writeln!(output, "[error] streaming failed: {err}")?;
                    output.flush()?;
                }
                Err(TurnError::Output(err)) => return Err(err),
            }
        }
    }

    /// Runs one user turn. A failed turn leaves the history as it was.
    pub fn turn<W: Write>(&mut self, input: &str, output: &mut W) -> Result<(), TurnError> {
        self.history.push(ChatMessage::user(input));
        match self.stream_reply(output) {
            Ok(reply) => {
                self.history.push(reply);
                Ok(())
            }
            Err(err) => {
                self.history.pop();
                Err(err)
            }
        }
    }

    fn stream_reply<W: Write>(&self, output: &mut W) -> Result<ChatMessage, TurnError> {
        let fragments = self
            .client
            .stream_chat(&self.history, &self.system_prompt, &self.params)?;

        let mut pending: Option<PendingMessage> = None;
        for fragment in fragments {
            let fragment = fragment?;
            if pending.is_none() {
                output.write_all(ASSISTANT_LABEL.as_bytes())?;
                pending = Some(PendingMessage::start(&fragment));
            }
            if !fragment.content.is_empty() {
                output.write_all(fragment.content.as_bytes())?;
                output.flush()?;
            }
            if let Some(message) = pending.as_mut() {
                message.push(fragment);
            }
        }
        if pending.is_none() {
            output.write_all(ASSISTANT_LABEL.as_bytes())?;
        }
        output.write_all(b"\n")?;
        output.flush()?;

        Ok(pending
            .map(PendingMessage::finish)
            .unwrap_or_else(|| ChatMessage::assistant("")))
    }
}

/// Assistant message being assembled from fragments.
struct PendingMessage {
    role: Role,
    model_id: Option<String>,
    finish_reason: Option<String>,
    content: String,
}

impl PendingMessage {
    fn start(first: &StreamFragment) -> Self {
        Self {
            role: first.role.unwrap_or(Role::Assistant),
            model_id: first.model_id.clone(),
            finish_reason: None,
            content: String::new(),
        }
    }

    fn push(&mut self, fragment: StreamFragment) {
        self.content.push_str(&fragment.content);
        if fragment.finish_reason.is_some() {
            self.finish_reason = fragment.finish_reason;
        }
    }

    fn finish(self) -> ChatMessage {
        let metadata = (self.model_id.is_some() || self.finish_reason.is_some()).then(|| {
            MessageMetadata {
                model_id: self.model_id,
                finish_reason: self.finish_reason,
            }
        });
        ChatMessage {
            role: self.role,
            content: self.content,
            metadata,
        }
    }
}

fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}
