//! Command parsing for the interactive shell.
//!
//! This module parses command strings into structured [`Command`] values.

/// Parsed command from user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Connect to the assigned server.
    Connect,

    /// Tear the tunnel down.
    Disconnect,

    /// Connect or disconnect depending on the current status.
    Toggle,

    /// Print the current status.
    Status,

    /// Poll the bridge, then print the status.
    Refresh,

    /// Clear the displayed error.
    Dismiss,

    /// Log in.
    Login {
        /// Account name.
        username: String,
        /// Account password.
        password: String,
    },

    /// Log out and forget the stored session.
    Logout,

    /// Show the command list.
    Help,

    /// Leave the shell.
    Quit,

    /// Blank line.
    Empty,

    /// Unknown or invalid command.
    Unknown {
        /// The original input.
        input: String,
    },

    /// Command with missing or invalid arguments.
    InvalidArgs {
        /// Command name.
        command: String,
        /// Error message.
        error: String,
    },
}

/// One-line summaries printed by `/help`.
pub const HELP: &str = "\
/connect             connect to the assigned server
/disconnect          disconnect
/toggle              connect or disconnect
/status              show the connection status
/refresh             ask the tunnel layer, then show the status
/dismiss             clear the last error
/login <user> <pw>   log in
/logout              log out
/quit                leave";

/// Parse a user input string into a command.
///
/// Commands start with `/`.
pub fn parse(input: &str) -> Command {
    let input = input.trim();

    if input.is_empty() {
        return Command::Empty;
    }

    let Some(cmd_str) = input.strip_prefix('/') else {
        return Command::Unknown { input: input.to_string() };
    };

    let parts: Vec<&str> = cmd_str.split_whitespace().collect();
    let command = parts.first().copied().unwrap_or("");

    match command {
        "connect" | "c" => Command::Connect,
        "disconnect" | "d" => Command::Disconnect,
        "toggle" | "t" => Command::Toggle,
        "status" | "s" => Command::Status,
        "refresh" => Command::Refresh,
        "dismiss" => Command::Dismiss,

        "login" => match (parts.get(1), parts.get(2)) {
            (Some(username), Some(password)) if parts.len() == 3 => Command::Login {
                username: (*username).to_string(),
                password: (*password).to_string(),
            },
            _ => Command::InvalidArgs {
                command: "login".into(),
                error: "Usage: /login <username> <password>".into(),
            },
        },

        "logout" => Command::Logout,
        "help" | "?" => Command::Help,
        "quit" | "q" => Command::Quit,

        _ => Command::Unknown { input: input.to_string() },
    }
}
