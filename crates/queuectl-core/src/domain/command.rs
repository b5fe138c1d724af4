//! Command grammar.
//!
//! The grammar is closed: only `echo <words...>` and `sleep <seconds>` are
//! executable. Anything else is an invalid command and counts as a failed
//! attempt for the record that carries it.

use std::str::FromStr;

use thiserror::Error;

/// A parsed, executable command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Remaining tokens joined by a single space.
    Echo(String),

    /// Suspend the executing worker for the given number of seconds.
    Sleep(u64),
}

/// Why a command text was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command `{0}`")]
    UnknownOpcode(String),

    #[error("sleep takes exactly one argument, got {0}")]
    SleepArity(usize),

    #[error("sleep duration `{0}` is not a non-negative integer")]
    SleepDuration(String),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut tokens = text.split_whitespace();
        let opcode = tokens.next().ok_or(CommandError::Empty)?;
        let args: Vec<&str> = tokens.collect();

        match opcode {
            "echo" => Ok(Command::Echo(args.join(" "))),
            "sleep" => {
                let [seconds] = args.as_slice() else {
                    return Err(CommandError::SleepArity(args.len()));
                };
                seconds
                    .parse::<u64>()
                    .map(Command::Sleep)
                    .map_err(|_| CommandError::SleepDuration((*seconds).to_string()))
            }
            other => Err(CommandError::UnknownOpcode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::simple("echo hi", "hi")]
    #[case::collapses_whitespace("  echo   hello \t world  ", "hello world")]
    #[case::no_arguments("echo", "")]
    fn parses_echo(#[case] text: &str, #[case] expected: &str) {
        assert_eq!(text.parse::<Command>(), Ok(Command::Echo(expected.to_string())));
    }

    #[test]
    fn parses_sleep() {
        assert_eq!("sleep 0".parse::<Command>(), Ok(Command::Sleep(0)));
        assert_eq!("sleep 2".parse::<Command>(), Ok(Command::Sleep(2)));
    }

    #[rstest]
    #[case::empty("", CommandError::Empty)]
    #[case::blank("   \t ", CommandError::Empty)]
    #[case::unknown("bogus", CommandError::UnknownOpcode("bogus".into()))]
    #[case::shell("ls -la", CommandError::UnknownOpcode("ls".into()))]
    #[case::sleep_missing("sleep", CommandError::SleepArity(0))]
    #[case::sleep_extra("sleep 1 2", CommandError::SleepArity(2))]
    #[case::sleep_negative("sleep -1", CommandError::SleepDuration("-1".into()))]
    #[case::sleep_word("sleep soon", CommandError::SleepDuration("soon".into()))]
    fn rejects_invalid_commands(#[case] text: &str, #[case] expected: CommandError) {
        assert_eq!(text.parse::<Command>(), Err(expected));
    }
}
