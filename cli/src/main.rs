mod render;

use std::time::Duration;

use carelink::config::{
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY_MS, ENDPOINT_ENV, MAX_RECONNECT_ATTEMPTS_ENV,
    RECONNECT_DELAY_MS_ENV, ws_url_from_base,
};
use carelink::{Connection, ConnectionConfig};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::LocalSet;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] carelink::ConfigError),
    #[error("failed to read stdin: {0}")]
    Stdin(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "carelink-cli", about = "Terminal chat client for the care dashboard")]
struct Cli {
    /// Chat endpoint; `http(s)://` is rewritten to `ws(s)://`.
    #[arg(long, env = ENDPOINT_ENV)]
    url: String,

    #[arg(long, env = MAX_RECONNECT_ATTEMPTS_ENV, default_value_t = DEFAULT_MAX_RECONNECT_ATTEMPTS)]
    max_reconnect_attempts: u32,

    #[arg(long, env = RECONNECT_DELAY_MS_ENV, default_value_t = DEFAULT_RECONNECT_DELAY_MS)]
    reconnect_delay_ms: u64,
}

/// One line typed by the user.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Quit,
    Reconnect,
    Status,
    Message(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    match line.trim() {
        "" => Input::Empty,
        "/quit" => Input::Quit,
        "/reconnect" => Input::Reconnect,
        "/status" => Input::Status,
        text => Input::Message(text),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConnectionConfig::new(ws_url_from_base(&cli.url)?)
        .with_max_reconnect_attempts(cli.max_reconnect_attempts)
        .with_reconnect_delay(Duration::from_millis(cli.reconnect_delay_ms));

    LocalSet::new().run_until(run_chat(config)).await
}

async fn run_chat(config: ConnectionConfig) -> Result<(), CliError> {
    let conn = Connection::new(config);
    conn.on_step(|step| println!("{}", render::step_line(&step)));
    conn.on_message(|update| match render::update_lines(&update) {
        Ok(lines) => lines.iter().for_each(|line| println!("{line}")),
        Err(e) => tracing::warn!(error = %e, "chat update without usable history"),
    });
    conn.on_error(|error| eprintln!("! {error}"));

    tracing::info!(endpoint = conn.endpoint(), "connecting");
    conn.connect();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_input(&line) {
            Input::Empty => {}
            Input::Quit => break,
            Input::Reconnect => conn.connect(),
            Input::Status => println!("{}", render::status_line(&conn)),
            Input::Message(text) => conn.send_message(text),
        }
    }

    conn.disconnect();
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
