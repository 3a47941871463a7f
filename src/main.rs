//! Ditto binary entry point

use std::{
    io::{self, Write},
    sync::Arc,
};

use color_eyre::{eyre::eyre, Result};
use ditto_client::{
    cli::{Cli, Commands, ConfigAction, SessionAction},
    config::Config,
    messages::{ChatRequest, ContentBlock},
    services::{
        chat::ChatClient,
        responses::save_response,
        sessions::{ListSessionsQuery, SessionsClient, UpdateSessionRequest},
        streaming::{StreamHandlers, StreamSession},
        ApiContext,
    },
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

/// Writes the answer to stdout and side-channel events to stderr
///
/// A failed write to stdout (e.g. a closed pipe) cancels the stream.
struct TerminalHandlers<W> {
    out: W,
    session: StreamSession,
}

impl<W: Write + Send> StreamHandlers for TerminalHandlers<W> {
    fn on_content(&mut self, text: &str) {
        let out = &mut self.out;
        if let Err(error) = out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
            tracing::warn!(%error, "stdout closed, cancelling stream");
            self.session.cancel();
        }
    }

    fn on_progress(&mut self, message: &str) {
        if !message.is_empty() {
            eprintln!("… {message}");
        }
    }

    fn on_error(&mut self, message: &str) {
        eprintln!("\nerror: {message}");
    }

    fn on_tool_calls(&mut self, calls: &[Value]) {
        for call in calls {
            let name = call.get("name").and_then(Value::as_str).unwrap_or("tool");
            eprintln!("[calling {name}]");
        }
    }

    fn on_tool_results(&mut self, results: &[Value]) {
        eprintln!("[{} tool result(s)]", results.len());
    }

    fn on_session_created(&mut self, session_id: &str) {
        eprintln!("[session {session_id}]");
    }

    fn on_image_completed(&mut self, url: &str) {
        eprintln!("[image] {url}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install error handler
    color_eyre::install()?;
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();

    let filter = if cli.verbose {
        EnvFilter::new("ditto_client=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let stored = Config::load_stored(&Config::settings_path())?;
    let config = stored
        .clone()
        .with_env(|key| std::env::var(key).ok())
        .with_overrides(cli.overrides());

    match cli.command {
        Commands::Chat {
            text,
            images,
            session,
            deep_search,
        } => {
            let mut input = vec![ContentBlock::text(text)];
            input.extend(images.into_iter().map(ContentBlock::image));

            let mut request = ChatRequest::new(config.settings.device_id.clone(), input)
                .with_deep_search(deep_search || config.settings.deep_search_memories);
            if let Some(session) = session {
                request = request.with_session(session);
            }

            run_chat(&config, &request).await?;
        }
        Commands::Sessions { action } => {
            let sessions = SessionsClient::new(ApiContext::from_config(&config)?);
            match action {
                SessionAction::List {
                    status,
                    page,
                    page_size,
                } => {
                    let listed = sessions
                        .list_sessions(&ListSessionsQuery {
                            status,
                            page,
                            page_size,
                        })
                        .await?;
                    for session in &listed.items {
                        println!("{}  {:<10} {}", session.id, session.status, session.title);
                    }
                    println!(
                        "page {}/{} ({} sessions)",
                        listed.pagination.page,
                        listed.pagination.total_pages,
                        listed.pagination.total_count
                    );
                }
                SessionAction::Get { id } => {
                    let session = sessions.get_session(&id).await?;
                    println!("{}", serde_json::to_string_pretty(&session)?);
                }
                SessionAction::Rename { id, title } => {
                    let update = UpdateSessionRequest {
                        title: Some(title),
                        ..UpdateSessionRequest::default()
                    };
                    let session = sessions.update_session(&id, &update).await?;
                    println!("renamed {} to {:?}", session.id, session.title);
                }
                SessionAction::Delete { id } => {
                    sessions.delete_session(&id).await?;
                    println!("deleted {id}");
                }
            }
        }
        Commands::Conversations { limit, cursor } => {
            let sessions = SessionsClient::new(ApiContext::from_config(&config)?);
            let page = sessions.conversations(Some(limit), cursor.as_deref()).await?;
            for memory in &page.conversations {
                let prompt: String = memory
                    .input
                    .iter()
                    .filter_map(|c| c.text.as_deref())
                    .collect();
                println!("[{}] {}", memory.timestamp.format("%Y-%m-%d %H:%M"), prompt);
                println!("    {}", memory.output_text());
            }
            if let Some(next) = page.next_cursor {
                println!("next cursor: {next}");
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => println!("{:#?}", config.settings),
            ConfigAction::SetToken { token, user_id } => {
                let mut stored = stored;
                stored.settings.token = Some(token);
                stored.settings.user_id = Some(user_id);
                stored.save()?;
                println!("saved to {}", stored.path.display());
            }
            ConfigAction::SetBaseUrl { url } => {
                let mut stored = stored;
                stored.settings.base_url = url;
                stored.save()?;
                println!("saved to {}", stored.path.display());
            }
        },
    }

    Ok(())
}

/// Stream one turn to the terminal; Ctrl-C keeps the partial answer
async fn run_chat(config: &Config, request: &ChatRequest) -> Result<()> {
    let api = ApiContext::from_config(config)?;
    let client = Arc::new(ChatClient::new(api.clone()));
    let session = StreamSession::new();

    let interrupt = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() && client.cancel_active_stream() {
                eprintln!("\n[cancelled]");
            }
        })
    };

    let mut handlers = TerminalHandlers {
        out: io::stdout(),
        session: session.clone(),
    };
    let result = client.stream_chat(request, &mut handlers, &session).await;
    interrupt.abort();
    if let Err(error) = writeln!(io::stdout()) {
        tracing::debug!(%error, "stdout closed");
    }

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) if e.is_client_side() => return Err(eyre!("nothing was sent: {e}")),
        Err(e) => return Err(e.into()),
    };
    if let Some(pair_id) = outcome.pair_id_to_save() {
        save_response(&api, pair_id, &outcome.text).await?;
        tracing::info!(%pair_id, partial = outcome.is_partial(), "answer saved");
    }
    if let Some(message) = outcome.error {
        return Err(eyre!("server reported an error: {message}"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_content_is_written() {
        let session = StreamSession::new();
        let mut handlers = TerminalHandlers {
            out: Vec::new(),
            session: session.clone(),
        };
        handlers.on_content("Hello");
        handlers.on_content(" world");
        assert_eq!(handlers.out, b"Hello world");
        assert!(!session.is_cancelled());
    }

    #[test]
    fn test_closed_stdout_cancels_stream() {
        let session = StreamSession::new();
        let mut handlers = TerminalHandlers {
            out: ClosedPipe,
            session: session.clone(),
        };
        handlers.on_content("Hello");
        assert!(session.is_cancelled());
    }
}
