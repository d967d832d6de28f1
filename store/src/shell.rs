//! The line-oriented command shell wrapped around the engine.
//!
//! Parsing and dispatch are kept separate from terminal concerns: a line
//! parses into a [`Command`], and [`dispatch`] runs one against a store,
//! writing its output to any `io::Write` sink. The `packdb` binary wires
//! these to a readline loop; the tests wire them to byte buffers.

use std::io::Write;

use thiserror::Error;

use packdb_api::error::StoreError;
use packdb_api::kv::{KeyValueSupport, StoreSysSupport};

use super::engine::KvStore;

/// A parsed shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `has <key>`: print `yes` or `no`.
    Has(String),
    /// `get <key>`: print the value, or `<not found>`.
    Get(String),
    /// `set <key> <value>`: store the value, which is the remainder of the
    /// line after the key.
    Set(String, String),
    /// `del <key>` / `delete <key>`: delete the key.
    Delete(String),
    /// `clear`: drop everything.
    Clear,
    /// `size`: print the number of live keys.
    Size,
    /// `keys`: print every key, one per line.
    Keys,
    /// `vals` / `values`: print every value, one per line.
    Values,
    /// `l` / `list` / `entries`: print `key: value` pairs, one per line.
    Entries,
}

/// What was wrong with a line of input. The `Display` text is exactly what
/// the shell prints back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The first word is not a recognized command.
    #[error("Unknown command: {0}")]
    Unknown(String),
    /// A recognized command with the wrong shape of arguments.
    #[error("Syntax error")]
    Syntax,
}

/// Parse one line of input. Blank lines parse to `None`.
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (line, ""),
    };

    // A single-key argument: exactly one word.
    let one_key = |rest: &str| -> Result<String, ParseError> {
        let mut words = rest.split_whitespace();
        match (words.next(), words.next()) {
            (Some(key), None) => Ok(key.to_string()),
            _ => Err(ParseError::Syntax),
        }
    };
    // No arguments at all.
    let bare = |rest: &str| -> Result<(), ParseError> {
        if rest.is_empty() {
            Ok(())
        } else {
            Err(ParseError::Syntax)
        }
    };

    let cmd = match name {
        "has" => Command::Has(one_key(rest)?),
        "get" => Command::Get(one_key(rest)?),
        "set" => {
            let (key, value) = rest.split_once(char::is_whitespace).ok_or(ParseError::Syntax)?;
            let value = value.trim();
            if key.is_empty() || value.is_empty() {
                return Err(ParseError::Syntax);
            }
            Command::Set(key.to_string(), value.to_string())
        }
        "del" | "delete" => Command::Delete(one_key(rest)?),
        "clear" => {
            bare(rest)?;
            Command::Clear
        }
        "size" => {
            bare(rest)?;
            Command::Size
        }
        "keys" => {
            bare(rest)?;
            Command::Keys
        }
        "vals" | "values" => {
            bare(rest)?;
            Command::Values
        }
        "l" | "list" | "entries" => {
            bare(rest)?;
            Command::Entries
        }
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(Some(cmd))
}

/// Run one command against `store`, writing any output to `out`.
pub fn dispatch<W: Write>(store: &KvStore, cmd: &Command, out: &mut W) -> Result<(), StoreError> {
    match cmd {
        Command::Has(key) => {
            writeln!(out, "{}", if store.has(key) { "yes" } else { "no" })?;
        }
        Command::Get(key) => match store.get(key)? {
            Some(value) => writeln!(out, "{value}")?,
            None => writeln!(out, "<not found>")?,
        },
        Command::Set(key, value) => store.set(key, value.as_str())?,
        Command::Delete(key) => {
            store.delete(key)?;
        }
        Command::Clear => store.clear()?,
        Command::Size => writeln!(out, "{}", store.len())?,
        Command::Keys => {
            for key in store.keys() {
                writeln!(out, "{key}")?;
            }
        }
        Command::Values => {
            for value in store.values()? {
                writeln!(out, "{value}")?;
            }
        }
        Command::Entries => {
            store.try_for_each(|key, value| {
                writeln!(out, "{key}: {value}")?;
                Ok(())
            })?;
        }
    }
    Ok(())
}
