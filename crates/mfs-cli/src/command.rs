//! Shell command grammar.

use std::io;
use std::path::PathBuf;
use std::str::FromStr;

use mfs_core::{parse_key, AttributeChange, ListOptions, MfsError, XorDirection};
use thiserror::Error;

/// Tokens past this count are ignored.
pub const MAX_TOKENS: usize = 11;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("Unknown command: {0}")]
    Unknown(String),

    #[error("{0}")]
    Engine(#[from] MfsError),

    /// Failure writing shell output; ends the session.
    #[error("output error: {0}")]
    Output(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreateFs(PathBuf),
    Open(PathBuf),
    SaveFs,
    Close,
    Insert(PathBuf),
    Retrieve {
        name: String,
        dest: Option<PathBuf>,
    },
    Read {
        name: String,
        start: usize,
        length: usize,
    },
    Delete(String),
    Undelete(String),
    List(ListOptions),
    Df,
    Attrib {
        change: AttributeChange,
        name: String,
    },
    Xor {
        direction: XorDirection,
        name: String,
        key: u8,
    },
    Fsck,
    Quit,
}

impl Command {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse_line(line: &str) -> Result<Option<Self>, ShellError> {
        if line.trim().is_empty() {
            return Ok(None);
        }
        line.parse().map(Some)
    }

    /// Whether the command operates on the bound image.
    pub fn needs_image(&self) -> bool {
        !matches!(
            self,
            Command::CreateFs(_) | Command::Open(_) | Command::Quit
        )
    }

    /// Whether a successful run changes image state that `savefs` would persist.
    pub fn mutates(&self) -> bool {
        matches!(
            self,
            Command::Insert(_)
                | Command::Delete(_)
                | Command::Undelete(_)
                | Command::Attrib { .. }
                | Command::Xor { .. }
        )
    }
}

impl FromStr for Command {
    type Err = ShellError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = line.split_whitespace().take(MAX_TOKENS).collect();
        let (&verb, args) = tokens
            .split_first()
            .ok_or(ShellError::Usage("<command> [args...]"))?;
        let arg = |i: usize, usage: &'static str| {
            args.get(i).copied().ok_or(ShellError::Usage(usage))
        };

        let command = match verb {
            "createfs" => Command::CreateFs(arg(0, "createfs <disk image>")?.into()),
            "open" => Command::Open(arg(0, "open <disk image>")?.into()),
            "savefs" => Command::SaveFs,
            "close" => Command::Close,
            "insert" => Command::Insert(arg(0, "insert <filename>")?.into()),
            "retrieve" => Command::Retrieve {
                name: arg(0, "retrieve <filename> [<new filename>]")?.to_string(),
                dest: args.get(1).map(PathBuf::from),
            },
            "read" => {
                const USAGE: &str = "read <filename> <starting byte> <number of bytes>";
                let name = arg(0, USAGE)?.to_string();
                let start = parse_count(arg(1, USAGE)?, "starting byte")?;
                let length = parse_count(arg(2, USAGE)?, "number of bytes")?;
                Command::Read {
                    name,
                    start,
                    length,
                }
            }
            "delete" | "del" => Command::Delete(arg(0, "delete <filename>")?.to_string()),
            "undel" | "undelete" => Command::Undelete(arg(0, "undel <filename>")?.to_string()),
            "list" => {
                let mut options = ListOptions::default();
                for flag in args {
                    match *flag {
                        "-h" => options.show_hidden = true,
                        "-a" => options.show_attributes = true,
                        _ => return Err(ShellError::Usage("list [-h] [-a]")),
                    }
                }
                Command::List(options)
            }
            "df" => Command::Df,
            "attrib" => {
                const USAGE: &str = "attrib <+h|-h|+r|-r> <filename>";
                let change = arg(0, USAGE)?.parse::<AttributeChange>()?;
                Command::Attrib {
                    change,
                    name: arg(1, USAGE)?.to_string(),
                }
            }
            "encrypt" | "decrypt" => {
                let (direction, usage) = if verb == "encrypt" {
                    (XorDirection::Encrypt, "encrypt <filename> <1-byte key>")
                } else {
                    (XorDirection::Decrypt, "decrypt <filename> <1-byte key>")
                };
                let name = arg(0, usage)?.to_string();
                let key = parse_key(arg(1, usage)?)?;
                Command::Xor {
                    direction,
                    name,
                    key,
                }
            }
            "fsck" => Command::Fsck,
            "quit" | "exit" => Command::Quit,
            other => return Err(ShellError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

fn parse_count(token: &str, what: &str) -> Result<usize, ShellError> {
    token.parse().map_err(|_| {
        MfsError::InvalidArgument(format!("{} must be a non-negative integer: {}", what, token))
            .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mfs_core::Attribute;

    #[test]
    fn test_blank_lines_are_skipped() {
        assert_eq!(Command::parse_line("").unwrap(), None);
        assert_eq!(Command::parse_line("   \t ").unwrap(), None);
    }

    #[test]
    fn test_parse_basic_commands() {
        assert_eq!(
            "createfs disk.img".parse::<Command>().unwrap(),
            Command::CreateFs("disk.img".into())
        );
        assert_eq!("savefs".parse::<Command>().unwrap(), Command::SaveFs);
        assert_eq!("  df  ".parse::<Command>().unwrap(), Command::Df);
        assert_eq!("exit".parse::<Command>().unwrap(), Command::Quit);
        assert_eq!(
            "retrieve a.txt".parse::<Command>().unwrap(),
            Command::Retrieve {
                name: "a.txt".into(),
                dest: None
            }
        );
        assert_eq!(
            "retrieve a.txt b.txt".parse::<Command>().unwrap(),
            Command::Retrieve {
                name: "a.txt".into(),
                dest: Some("b.txt".into())
            }
        );
    }

    #[test]
    fn test_missing_arguments_are_usage_errors() {
        for line in ["open", "insert", "read a 1", "attrib +h", "encrypt f", "delete"] {
            assert!(
                matches!(line.parse::<Command>(), Err(ShellError::Usage(_))),
                "{}",
                line
            );
        }
    }

    #[test]
    fn test_parse_read() {
        assert_eq!(
            "read f 10 20".parse::<Command>().unwrap(),
            Command::Read {
                name: "f".into(),
                start: 10,
                length: 20
            }
        );
        assert!(matches!(
            "read f -1 20".parse::<Command>(),
            Err(ShellError::Engine(MfsError::InvalidArgument(_)))
        ));
    }

    #[test]
    fn test_parse_list_flags() {
        assert_eq!(
            "list -a -h".parse::<Command>().unwrap(),
            Command::List(ListOptions {
                show_hidden: true,
                show_attributes: true
            })
        );
        assert!(matches!(
            "list -x".parse::<Command>(),
            Err(ShellError::Usage(_))
        ));
    }

    #[test]
    fn test_parse_attrib_and_keys() {
        assert_eq!(
            "attrib +r notes".parse::<Command>().unwrap(),
            Command::Attrib {
                change: AttributeChange {
                    attribute: Attribute::ReadOnly,
                    enable: true
                },
                name: "notes".into()
            }
        );
        assert!(matches!(
            "attrib +z notes".parse::<Command>(),
            Err(ShellError::Engine(MfsError::InvalidArgument(_)))
        ));
        assert_eq!(
            "decrypt f k".parse::<Command>().unwrap(),
            Command::Xor {
                direction: XorDirection::Decrypt,
                name: "f".into(),
                key: b'k'
            }
        );
        assert!("encrypt f kk".parse::<Command>().is_err());
    }

    #[test]
    fn test_unknown_command() {
        assert!(matches!(
            "format c:".parse::<Command>(),
            Err(ShellError::Unknown(_))
        ));
    }

    #[test]
    fn test_tokens_past_limit_are_ignored() {
        let mut line = String::from("list");
        for _ in 0..(MAX_TOKENS - 1) {
            line.push_str(" -a");
        }
        line.push_str(" -bogus");
        assert!(line.parse::<Command>().is_ok());
    }

    #[test]
    fn test_image_requirements() {
        assert!(!Command::Open("x".into()).needs_image());
        assert!(!Command::Quit.needs_image());
        assert!(Command::Df.needs_image());
        assert!(Command::Delete("x".into()).mutates());
        assert!(!Command::Df.mutates());
    }
}
