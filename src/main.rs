use std::io;

use anyhow::{Context, Result};
use chatloop::chat::Session;
use chatloop::config::SettingsResolver;
use chatloop::llm::service::CompletionClient;
use chatloop::logging;

fn main() -> Result<()> {
    let log = logging::init();

    let settings = match SettingsResolver::from_env().load() {
        Ok(settings) => settings,
        Err(err) => {
            let hint = err.hint();
            return Err(err).context(format!("failed to load settings. {hint}"));
        }
    };
    log.apply(settings.log_level);
    tracing::debug!(?settings, "settings loaded");

    let client =
        CompletionClient::build(&settings).context("failed to construct completion service")?;
    tracing::info!(service = %client.service_type(), "completion service ready");

    let mut session = Session::new(client, settings.system_prompt.clone());
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    session
        .run(stdin.lock(), &mut stdout)
        .context("chat session ended with an I/O error")?;
    tracing::debug!(messages = session.history().len(), "session closed");
    Ok(())
}
