//! Splits incoming chat lines into a command and its argument.

/// A parsed command line: `!<command> <argument>`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    pub command: String,
    pub argument: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The message doesn't start with the command character. Not a failure:
    /// the message goes to the matchers instead.
    #[error("not a command")]
    NotACommand,
}

impl Command {
    /// The argument split on single spaces, as handed to plugin commands.
    pub fn args(&self) -> Vec<String> {
        if self.argument.is_empty() {
            return Vec::new();
        }
        self.argument.split(' ').map(str::to_string).collect()
    }
}

/// Parse `message` as a command introduced by `command_char`.
///
/// The text between the prefix and the first space is the command (possibly
/// empty); everything after that space is the argument.
pub fn parse(command_char: &str, message: &str) -> Result<Command, ParseError> {
    let rest = message
        .strip_prefix(command_char)
        .ok_or(ParseError::NotACommand)?;
    let (command, argument) = split_by_space(rest);
    Ok(Command {
        command: command.to_string(),
        argument: argument.to_string(),
    })
}

/// Split on the first space. The second half is empty if there is none.
pub fn split_by_space(input: &str) -> (&str, &str) {
    input.split_once(' ').unwrap_or((input, ""))
}
