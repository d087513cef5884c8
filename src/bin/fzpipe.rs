//! Shell-facing wrapper: pick one line from stdin with out-of-band previews.
//!
//! Each input line is split at the first delimiter occurrence into the
//! display label and its preview payload; lines without the delimiter get no
//! preview. The selection is printed to stdout and the selector's exit code
//! is propagated, so the wrapper composes like fzf itself:
//!
//! ```sh
//! printf 'a\tfirst preview\nb\tsecond preview\n' | fzpipe
//! ```

use anyhow::Result;
use clap::Parser;
use fzpipe::{FzfSession, SelectorCommand};
use std::io::{self, BufRead};
use std::process;

/// Interactive line picker with out-of-band preview payloads.
#[derive(Debug, Parser)]
#[command(name = "fzpipe", about = "fzf picker with out-of-band previews", version)]
struct CliConfig {
    /// Selector command to run (program plus extra arguments, shell-quoted)
    #[arg(long = "fzf-cmd", env = "FZPIPE_FZF_CMD", default_value = "fzf")]
    fzf_cmd: String,

    /// Delimiter separating the label from its preview on each input line
    #[arg(long, short = 'd', default_value = "\t")]
    delimiter: String,

    /// Print the debug log file location and exit
    #[arg(long = "log-path", default_value_t = false)]
    log_path: bool,
}

fn main() {
    let config = CliConfig::parse();
    match run(&config) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("fzpipe: {err:#}");
            process::exit(1);
        }
    }
}

fn run(config: &CliConfig) -> Result<i32> {
    if config.log_path {
        println!("{}", fzpipe::log_file_path().display());
        return Ok(0);
    }

    let mut session = FzfSession::with_command(SelectorCommand::parse(&config.fzf_cmd));
    session.start()?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let record = if config.delimiter.is_empty() {
            session.add_line(&line, None)
        } else {
            match line.split_once(&config.delimiter) {
                Some((label, preview)) => session.add_line(label, Some(preview)),
                None => session.add_line(&line, None),
            }
        };
        if record.is_err() {
            // The selector stopped reading input (likely already exiting);
            // go collect whatever it chose.
            break;
        }
    }
    session.close_input();

    let outcome = session.wait()?;
    if let Some(selection) = outcome.selection {
        println!("{selection}");
    }
    Ok(outcome.status.code().unwrap_or(1))
}
