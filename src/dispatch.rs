//! Command dispatch.
//!
//! Resolves a command name against a fixed table, validates arguments,
//! runs the file operation and renders the outcome as response text.
//!
//! ## Commands
//!
//! | command | required args |
//! |---|---|
//! | `check_local_file` | `filepath`, `signature` |
//! | `quarantine_local_file` | `filepath` |
//!
//! Every outcome, including failures, becomes an ordinary response string.

use crate::envelope::{Args, Request};
use crate::fileops::{self, QuarantineError, ScanError};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Acknowledgment sent when a command produces no text of its own.
pub const STANDARD_RESPONSE: &str = "Got it!";
pub const MISSING_ARGUMENTS: &str = "Not enough arguments...";
pub const UNRECOGNIZED_COMMAND: &str = "Unrecognized command...";
pub const FILE_UNAVAILABLE: &str = "File does not exists or is empty.";
pub const QUARANTINED: &str = "File has been moved to quarantine folder.";

/// Commands reachable from the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Scan a file for a signature
    CheckLocalFile,
    /// Move a file into the quarantine directory
    QuarantineLocalFile,
}

impl CommandKind {
    /// Name to command table.
    pub const TABLE: [(&'static str, CommandKind); 2] = [
        ("check_local_file", CommandKind::CheckLocalFile),
        ("quarantine_local_file", CommandKind::QuarantineLocalFile),
    ];

    /// Look up a command by its wire name.
    pub fn lookup(name: &str) -> Option<Self> {
        Self::TABLE
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, kind)| *kind)
    }

    /// Wire name of the command.
    pub fn name(self) -> &'static str {
        match self {
            CommandKind::CheckLocalFile => "check_local_file",
            CommandKind::QuarantineLocalFile => "quarantine_local_file",
        }
    }
}

/// Result of running one request, before rendering.
#[derive(Debug)]
pub enum Outcome {
    /// Scan finished; offsets may be empty
    Matches(Vec<usize>),
    /// File moved to the given path
    Quarantined(PathBuf),
    /// A required argument was absent, null or empty
    MissingArguments,
    /// Scan target missing, unreadable or empty
    FileUnavailable(ScanError),
    /// Quarantine move failed
    MoveFailed(QuarantineError),
    /// Name not in the command table
    UnrecognizedCommand(String),
}

impl Outcome {
    /// Render the outcome as the text sent to the client.
    pub fn render(&self) -> String {
        let text = match self {
            Outcome::Matches(offsets) => format!("{:?}", offsets),
            Outcome::Quarantined(_) => QUARANTINED.to_string(),
            Outcome::MissingArguments => MISSING_ARGUMENTS.to_string(),
            Outcome::FileUnavailable(_) => FILE_UNAVAILABLE.to_string(),
            Outcome::MoveFailed(e) => {
                format!("Cant move file to quarantine. \n --- Error: {}", e)
            }
            Outcome::UnrecognizedCommand(_) => UNRECOGNIZED_COMMAND.to_string(),
        };
        or_acknowledge(text)
    }
}

/// Replace an empty response with [`STANDARD_RESPONSE`].
pub fn or_acknowledge(text: String) -> String {
    if text.is_empty() {
        STANDARD_RESPONSE.to_string()
    } else {
        text
    }
}

/// Runs requests against the local filesystem.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    quarantine_dir: PathBuf,
}

impl Dispatcher {
    /// Create a dispatcher moving quarantined files into `quarantine_dir`.
    pub fn new(quarantine_dir: impl Into<PathBuf>) -> Self {
        Self {
            quarantine_dir: quarantine_dir.into(),
        }
    }

    /// Directory receiving quarantined files
    pub fn quarantine_dir(&self) -> &Path {
        &self.quarantine_dir
    }

    /// Run a decoded request and return the response text.
    pub fn dispatch_request(&self, request: &Request) -> String {
        self.dispatch(&request.command, &request.args)
    }

    /// Run `command` with `args` and return the response text.
    pub fn dispatch(&self, command: &str, args: &Args) -> String {
        self.execute(command, args).render()
    }

    /// Run `command` with `args` and return the unrendered outcome.
    pub fn execute(&self, command: &str, args: &Args) -> Outcome {
        let Some(kind) = CommandKind::lookup(command) else {
            warn!(command, "Unrecognized command");
            return Outcome::UnrecognizedCommand(command.to_string());
        };

        info!(command = kind.name(), "Running command");

        match kind {
            CommandKind::CheckLocalFile => self.check_local_file(args),
            CommandKind::QuarantineLocalFile => self.quarantine_local_file(args),
        }
    }

    fn check_local_file(&self, args: &Args) -> Outcome {
        let (Some(filepath), Some(signature)) = (arg(args, "filepath"), arg(args, "signature"))
        else {
            warn!(command = "check_local_file", "Not enough arguments");
            return Outcome::MissingArguments;
        };

        match fileops::scan(filepath, signature) {
            Ok(offsets) => Outcome::Matches(offsets),
            Err(e) => Outcome::FileUnavailable(e),
        }
    }

    fn quarantine_local_file(&self, args: &Args) -> Outcome {
        let Some(filepath) = arg(args, "filepath") else {
            warn!(command = "quarantine_local_file", "Not enough arguments");
            return Outcome::MissingArguments;
        };

        match fileops::quarantine(filepath, &self.quarantine_dir) {
            Ok(destination) => Outcome::Quarantined(destination),
            Err(e) => Outcome::MoveFailed(e),
        }
    }
}

/// A present, non-null, non-empty argument.
fn arg<'a>(args: &'a Args, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(|value| value.as_deref())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn args(pairs: &[(&str, Option<&str>)]) -> Args {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect()
    }

    #[test]
    fn test_lookup() {
        assert_eq!(
            CommandKind::lookup("check_local_file"),
            Some(CommandKind::CheckLocalFile)
        );
        assert_eq!(
            CommandKind::lookup("quarantine_local_file"),
            Some(CommandKind::QuarantineLocalFile)
        );
        assert_eq!(CommandKind::lookup("CHECK_LOCAL_FILE"), None);
        assert_eq!(CommandKind::lookup("_read_local_file"), None);

        for (name, kind) in CommandKind::TABLE {
            assert_eq!(kind.name(), name);
        }
    }

    #[test]
    fn test_unrecognized_command() {
        let dispatcher = Dispatcher::new("unused");
        for command in ["", "stop", "__init__", "rm -rf"] {
            let response = dispatcher.dispatch(command, &args(&[("filepath", Some("x"))]));
            assert_eq!(response, UNRECOGNIZED_COMMAND);
        }
        assert_eq!(dispatcher.dispatch("stop", &Args::new()), UNRECOGNIZED_COMMAND);
    }

    #[test]
    fn test_missing_arguments() {
        let dispatcher = Dispatcher::new("unused");
        let cases = [
            ("check_local_file", args(&[])),
            ("check_local_file", args(&[("filepath", Some("a.txt"))])),
            ("check_local_file", args(&[("signature", Some("x"))])),
            (
                "check_local_file",
                args(&[("filepath", Some("a.txt")), ("signature", None)]),
            ),
            (
                "check_local_file",
                args(&[("filepath", Some("")), ("signature", Some("x"))]),
            ),
            ("quarantine_local_file", args(&[])),
            ("quarantine_local_file", args(&[("filepath", None)])),
            ("quarantine_local_file", args(&[("filepath", Some(""))])),
        ];

        for (command, args) in cases {
            assert_eq!(
                dispatcher.dispatch(command, &args),
                MISSING_ARGUMENTS,
                "{command} {args:?}"
            );
        }
    }

    #[test]
    fn test_check_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.txt");
        fs::write(&path, "sig .. sig .. sig").unwrap();
        let dispatcher = Dispatcher::new(dir.path().join("q"));

        let response = dispatcher.dispatch(
            "check_local_file",
            &args(&[("filepath", path.to_str()), ("signature", Some("sig"))]),
        );
        assert_eq!(response, "[0, 7, 14]");

        let response = dispatcher.dispatch(
            "check_local_file",
            &args(&[("filepath", path.to_str()), ("signature", Some("absent"))]),
        );
        assert_eq!(response, "[]");
    }

    #[test]
    fn test_check_local_file_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = Dispatcher::new(dir.path().join("q"));
        let missing = dir.path().join("missing.txt");

        let response = dispatcher.dispatch(
            "check_local_file",
            &args(&[("filepath", missing.to_str()), ("signature", Some("x"))]),
        );
        assert_eq!(response, FILE_UNAVAILABLE);
    }

    #[test]
    fn test_quarantine_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("file.txt");
        fs::write(&source, "payload").unwrap();
        let dispatcher = Dispatcher::new(dir.path().join("quarantine_dir"));

        let response =
            dispatcher.dispatch("quarantine_local_file", &args(&[("filepath", source.to_str())]));

        assert_eq!(response, QUARANTINED);
        assert!(!source.exists());
        assert!(dispatcher.quarantine_dir().join("file.txt").is_file());
    }

    #[test]
    fn test_quarantine_local_file_failure() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = Dispatcher::new(dir.path().join("q"));
        let missing = dir.path().join("missing.txt");

        let outcome =
            dispatcher.execute("quarantine_local_file", &args(&[("filepath", missing.to_str())]));

        assert!(matches!(outcome, Outcome::MoveFailed(_)));
        assert!(outcome
            .render()
            .starts_with("Cant move file to quarantine. \n --- Error: "));
    }

    #[test]
    fn test_extra_arguments_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.txt");
        fs::write(&path, "abc").unwrap();
        let dispatcher = Dispatcher::new(dir.path().join("q"));

        let response = dispatcher.dispatch(
            "check_local_file",
            &args(&[
                ("filepath", path.to_str()),
                ("signature", Some("b")),
                ("verbose", None),
            ]),
        );
        assert_eq!(response, "[1]");
    }

    #[test]
    fn test_or_acknowledge() {
        assert_eq!(or_acknowledge(String::new()), STANDARD_RESPONSE);
        assert_eq!(or_acknowledge("[]".to_string()), "[]");
    }
}
