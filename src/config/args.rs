//! Command-line parsing for the server binary.
//!
//! The surface is small (`--tags`, `--version`, `--help`), so arguments are
//! matched by hand.

/// What the binary should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliCommand {
    /// Serve MCP over stdio.
    Serve,
    /// Print the version and exit.
    Version,
    /// Print usage and exit.
    Help,
}

/// Parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub command: CliCommand,
    /// Activation tags; empty means every capability group.
    pub tags: Vec<String>,
}

pub const USAGE: &str = "\
Usage: sinch-mcp [--tags <tag>[,<tag>...]]

Options:
  --tags <list>   Comma-separated activation tags (e.g. conversation,voice).
                  Without tags every capability is considered.
  --version       Print version information.
  --help          Print this message.";

/// Parse arguments, excluding the program name.
///
/// Unknown arguments are ignored with a warning, matching the permissive
/// behaviour MCP clients expect from their launch command lines.
pub fn parse_args<I, S>(args: I) -> CliArgs
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut command = CliCommand::Serve;
    let mut tags = Vec::new();
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        let arg = arg.as_ref();
        match arg {
            "--tags" => match iter.next() {
                Some(list) => tags.extend(split_tags(list.as_ref())),
                None => log::warn!("--tags given without a value; ignoring"),
            },
            "--version" | "-V" => command = CliCommand::Version,
            "--help" | "-h" => command = CliCommand::Help,
            other => {
                if let Some(list) = other.strip_prefix("--tags=") {
                    tags.extend(split_tags(list));
                } else {
                    log::warn!("Ignoring unknown argument '{}'", other);
                }
            }
        }
    }

    CliArgs { command, tags }
}

fn split_tags(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_args_serves_all() {
        let args = parse_args(Vec::<String>::new());
        assert_eq!(args.command, CliCommand::Serve);
        assert!(args.tags.is_empty());
    }

    #[test]
    fn test_tags_split_and_trimmed() {
        let args = parse_args(["--tags", "voice, Conversation,,email "]);
        assert_eq!(args.tags, vec!["voice", "Conversation", "email"]);
    }

    #[test]
    fn test_tags_equals_form() {
        let args = parse_args(["--tags=verification"]);
        assert_eq!(args.tags, vec!["verification"]);
    }

    #[test]
    fn test_missing_tags_value() {
        let args = parse_args(["--tags"]);
        assert!(args.tags.is_empty());
    }

    #[test]
    fn test_version_and_help() {
        assert_eq!(parse_args(["--version"]).command, CliCommand::Version);
        assert_eq!(parse_args(["-h"]).command, CliCommand::Help);
    }
}
