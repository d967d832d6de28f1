//! The `packdb` binary: an interactive shell over one database file.

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use packdb_store::shell;
use packdb_store::{KvStore, StoreOptions, StoreSysSupport};

/// An interactive shell over a packdb database file.
#[derive(Parser, Debug)]
#[command(name = "packdb")]
struct Args {
    /// Database file to open (created when missing).
    #[arg(default_value = "./test.db")]
    path: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    TermLogger::init(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    let store = KvStore::open(&args.path, StoreOptions::default())?;
    println!("{}: {} keys", args.path.display(), store.len());

    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let _ = editor.add_history_entry(&line);
                match shell::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(cmd)) => {
                        if let Err(err) = shell::dispatch(&store, &cmd, &mut io::stdout()) {
                            eprintln!("error: {err}");
                        }
                    }
                    Err(err) => println!("{err}"),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}
