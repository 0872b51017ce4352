use super::*;
use clap::CommandFactory;

#[test]
fn cli_definition_is_valid() {
    Cli::command().debug_assert();
}

#[test]
fn cli_parses_flags() {
    let cli = Cli::try_parse_from([
        "carelink-cli",
        "--url",
        "https://care.example/ws",
        "--max-reconnect-attempts",
        "2",
        "--reconnect-delay-ms",
        "50",
    ])
    .expect("flags should parse");
    assert_eq!(cli.url, "https://care.example/ws");
    assert_eq!(cli.max_reconnect_attempts, 2);
    assert_eq!(cli.reconnect_delay_ms, 50);
}

#[test]
fn parse_input_recognizes_commands() {
    assert_eq!(parse_input("   "), Input::Empty);
    assert_eq!(parse_input("/quit"), Input::Quit);
    assert_eq!(parse_input(" /reconnect "), Input::Reconnect);
    assert_eq!(parse_input("/status"), Input::Status);
}

#[test]
fn parse_input_trims_messages() {
    assert_eq!(parse_input("  what should I eat?  "), Input::Message("what should I eat?"));
    assert_eq!(parse_input("/unknown"), Input::Message("/unknown"));
}
