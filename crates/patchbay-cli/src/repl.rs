//! Line commands understood by `patchbay play`.
//!
//! Boxes and links are referred to by the `#n` handles printed by `add`,
//! `link` and `list`; the leading `#` is optional.

use patchbay_engine::Atom;
use thiserror::Error;

/// One parsed command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `add <text>`
    Add(String),
    /// `link <from> <outlet> <to> <inlet>`, pins counted from 1
    Link {
        from: usize,
        outlet: usize,
        to: usize,
        inlet: usize,
    },
    /// `remove <handle>` for a box or a link
    Remove(usize),
    /// `edit <handle> <text>`
    Edit(usize, String),
    /// `move <handle> <x> <y>`
    Move(usize, f64, f64),
    /// `send <handle> <inlet> <message>`, inlet counted from 1
    Send {
        target: usize,
        inlet: usize,
        message: Vec<Atom>,
    },
    /// `bang <handle>`
    Bang(usize),
    /// `loadbang`
    Loadbang,
    /// `undo`
    Undo,
    /// `redo`
    Redo,
    /// `list`
    List,
    /// `help`
    Help,
    /// `quit`
    Quit,
}

/// Why a line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// First word is not a command.
    #[error("unknown command '{0}' (try 'help')")]
    UnknownCommand(String),

    /// A required argument is absent.
    #[error("{command}: missing {argument}")]
    Missing {
        /// Command being parsed.
        command: &'static str,
        /// Name of the absent argument.
        argument: &'static str,
    },

    /// An argument is not a valid number.
    #[error("{command}: invalid {argument} '{got}'")]
    Invalid {
        /// Command being parsed.
        command: &'static str,
        /// Name of the bad argument.
        argument: &'static str,
        /// What was typed.
        got: String,
    },
}

pub const HELP: &str = "\
commands:
  add <text>                       add a box, e.g. 'add +~ 0.5'
  link <from> <outlet> <to> <inlet>  connect two boxes (pins count from 1)
  remove <handle>                  remove a box or a link
  edit <handle> <text>             retype a box
  move <handle> <x> <y>            move a box
  send <handle> <inlet> <message>  send a message to an inlet
  bang <handle>                    send a bang to the first inlet
  loadbang                         send loadbang to every box
  undo | redo                      step through your own edits
  list                             show boxes and links
  quit                             leave the session";

/// Parses one line. Blank lines and `;` comments give `None`.
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(';') {
        return Ok(None);
    }
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let mut args = rest.split_whitespace();

    let command = match word {
        "add" => {
            if rest.is_empty() {
                return Err(ParseError::Missing {
                    command: "add",
                    argument: "text",
                });
            }
            Command::Add(rest.to_string())
        }
        "link" | "connect" => Command::Link {
            from: handle("link", "source", args.next())?,
            outlet: pin("link", "outlet", args.next())?,
            to: handle("link", "destination", args.next())?,
            inlet: pin("link", "inlet", args.next())?,
        },
        "remove" | "rm" => Command::Remove(handle("remove", "handle", args.next())?),
        "edit" => {
            let target = handle("edit", "handle", args.next())?;
            let text = args.collect::<Vec<_>>().join(" ");
            if text.is_empty() {
                return Err(ParseError::Missing {
                    command: "edit",
                    argument: "text",
                });
            }
            Command::Edit(target, text)
        }
        "move" => Command::Move(
            handle("move", "handle", args.next())?,
            coordinate("move", "x", args.next())?,
            coordinate("move", "y", args.next())?,
        ),
        "send" => {
            let target = handle("send", "handle", args.next())?;
            let inlet = pin("send", "inlet", args.next())?;
            let message = Atom::parse(&args.collect::<Vec<_>>().join(" "));
            Command::Send {
                target,
                inlet,
                message: if message.is_empty() {
                    vec![Atom::bang()]
                } else {
                    message
                },
            }
        }
        "bang" => Command::Bang(handle("bang", "handle", args.next())?),
        "loadbang" => Command::Loadbang,
        "undo" => Command::Undo,
        "redo" => Command::Redo,
        "list" | "ls" => Command::List,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(ParseError::UnknownCommand(other.to_string())),
    };
    Ok(Some(command))
}

fn handle(
    command: &'static str,
    argument: &'static str,
    token: Option<&str>,
) -> Result<usize, ParseError> {
    let token = token.ok_or(ParseError::Missing { command, argument })?;
    token
        .trim_start_matches('#')
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ParseError::Invalid {
            command,
            argument,
            got: token.to_string(),
        })
}

/// Pins are typed from 1 and stored from 0.
fn pin(
    command: &'static str,
    argument: &'static str,
    token: Option<&str>,
) -> Result<usize, ParseError> {
    let token = token.ok_or(ParseError::Missing { command, argument })?;
    match token.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n - 1),
        _ => Err(ParseError::Invalid {
            command,
            argument,
            got: token.to_string(),
        }),
    }
}

fn coordinate(
    command: &'static str,
    argument: &'static str,
    token: Option<&str>,
) -> Result<f64, ParseError> {
    let token = token.ok_or(ParseError::Missing { command, argument })?;
    token
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseError::Invalid {
            command,
            argument,
            got: token.to_string(),
        })
}
