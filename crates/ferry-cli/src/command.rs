//! Console command lines, shared by the console and the responder.

use thiserror::Error;

/// Longest accepted command line, terminator excluded.
pub const MAX_COMMAND_LEN: usize = 256;

/// File name used when a transfer command names no file.
pub const DEFAULT_FILE_NAME: &str = "dummyFile";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    /// List the remote directory.
    Dir,
    /// List the local directory, then the remote one.
    Ldir,
    /// Pull `remote` from the peer into `local`.
    Atoh { remote: String, local: String },
    /// Push `local` to the peer as `remote`.
    Htoa { local: String, remote: String },
    Quit,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("command is {0} bytes, limit is {MAX_COMMAND_LEN}")]
    TooLong(usize),
}

impl Command {
    /// Parse one line. The verb is case-insensitive; arguments keep their
    /// case. Extra arguments are ignored.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.len() > MAX_COMMAND_LEN {
            return Err(CommandError::TooLong(line.len()));
        }
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or(CommandError::Empty)?;
        let args: Vec<&str> = words.collect();

        let cmd = match verb.to_ascii_uppercase().as_str() {
            "HELP" => Command::Help,
            "DIR" => Command::Dir,
            "LDIR" => Command::Ldir,
            "ATOH" => {
                let (remote, local) = file_pair(&args);
                Command::Atoh { remote, local }
            }
            "HTOA" => {
                let (local, remote) = file_pair(&args);
                Command::Htoa { local, remote }
            }
            "QUIT" => Command::Quit,
            _ => Command::Unknown(verb.to_owned()),
        };
        Ok(cmd)
    }
}

/// No argument: both sides use the default name. One: same name on both
/// sides. Two: (source, destination).
fn file_pair(args: &[&str]) -> (String, String) {
    match args {
        [] => (DEFAULT_FILE_NAME.to_owned(), DEFAULT_FILE_NAME.to_owned()),
        [one] => (one.to_string(), one.to_string()),
        [first, second, ..] => (first.to_string(), second.to_string()),
    }
}

pub const HELP_TEXT: &str = "\
commands:
  HELP                  this text
  DIR                   list the remote directory
  LDIR                  list the local directory, then the remote one
  ATOH [remote] [local] copy a remote file here
  HTOA [local] [remote] copy a local file to the remote side
  QUIT                  leave
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbs_are_case_insensitive() {
        assert_eq!(Command::parse("help\n").unwrap(), Command::Help);
        assert_eq!(Command::parse("Dir").unwrap(), Command::Dir);
        assert_eq!(Command::parse("  lDiR  \r\n").unwrap(), Command::Ldir);
        assert_eq!(Command::parse("QUIT").unwrap(), Command::Quit);
    }

    #[test]
    fn transfer_arguments_default() {
        assert_eq!(
            Command::parse("atoh").unwrap(),
            Command::Atoh {
                remote: "dummyFile".into(),
                local: "dummyFile".into()
            }
        );
        assert_eq!(
            Command::parse("HTOA notes.txt").unwrap(),
            Command::Htoa {
                local: "notes.txt".into(),
                remote: "notes.txt".into()
            }
        );
        assert_eq!(
            Command::parse("ATOH Data.BIN copy.bin extra").unwrap(),
            Command::Atoh {
                remote: "Data.BIN".into(),
                local: "copy.bin".into()
            }
        );
    }

    #[test]
    fn unknown_and_empty() {
        assert_eq!(
            Command::parse("frobnicate x").unwrap(),
            Command::Unknown("frobnicate".into())
        );
        assert_eq!(Command::parse("   \n"), Err(CommandError::Empty));
    }

    #[test]
    fn oversize_line_rejected() {
        let line = format!("HTOA {}", "a".repeat(MAX_COMMAND_LEN));
        assert_eq!(
            Command::parse(&line),
            Err(CommandError::TooLong(MAX_COMMAND_LEN + 5))
        );
        let fits = format!("HTOA {}", "a".repeat(MAX_COMMAND_LEN - 5));
        assert!(Command::parse(&fits).is_ok());
    }
}
