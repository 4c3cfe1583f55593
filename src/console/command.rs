//! Operator Commands

use std::fmt;
use std::str::FromStr;

/// A recognized console command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Print each registered peer's address
    List,
    /// Print each peer with the seconds left before it times out
    DetailedList,
    Help,
    Clear,
    /// Terminate the process immediately
    Exit,
}

impl Command {
    pub const ALL: [Command; 5] = [
        Command::List,
        Command::DetailedList,
        Command::Help,
        Command::Clear,
        Command::Exit,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Command::List => "list",
            Command::DetailedList => "dlist",
            Command::Help => "help",
            Command::Clear => "clear",
            Command::Exit => "exit",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Command::List => "list connected clients",
            Command::DetailedList => "list connected clients with seconds until timeout",
            Command::Help => "show this help",
            Command::Clear => "clear the screen",
            Command::Exit => "terminate the server",
        }
    }

    /// Parse one input line. Unknown input yields `None`.
    pub fn parse(line: &str) -> Option<Self> {
        line.parse().ok()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCommand(pub String);

impl fmt::Display for UnknownCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown command: {}", self.0)
    }
}

impl std::error::Error for UnknownCommand {}

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        Command::ALL
            .into_iter()
            .find(|command| command.name() == input)
            .ok_or_else(|| UnknownCommand(input.to_string()))
    }
}
