pub mod line;

pub use line::{LineReader, LineWriter, MAX_LINE_LENGTH};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 12345;
pub const QUIT_COMMAND: &str = "/quit";

/// Returns true if the line asks the server to end the session.
///
/// The whole line must match, ignoring ASCII case, so `/QUIT` counts but
/// `/quit now` is ordinary chat text.
pub fn is_quit_command(line: &str) -> bool {
    line.eq_ignore_ascii_case(QUIT_COMMAND)
}

pub fn format_broadcast(identity: &str, text: &str) -> String {
    format!("{}: {}", identity, text)
}

pub fn welcome_message(identity: &str) -> String {
    format!(
        "Welcome {}! You can start typing messages. Type {} to exit.",
        identity, QUIT_COMMAND
    )
}
