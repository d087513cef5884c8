//! Selector session: child process ownership and the preview side channel.
//!
//! Architecture:
//! - The selector child runs with stdin/stdout captured as ordinary pipes;
//!   candidate lines go in as `"<index> <label>\n"` records and the final
//!   selection comes back on stdout as `"<index> <selection>\n"`.
//! - Two extra raw descriptors are inherited by the child: it writes preview
//!   requests to one and block-reads one base64 reply line from the other.
//!   Payloads never touch argv, the environment, or the visible input, so
//!   they can be arbitrarily large and contain newlines or control bytes.
//! - Everything is single-threaded blocking I/O in strict request-then-reply
//!   alternation; the child closing its request descriptor (a zero-length
//!   read) is the end-of-session marker.

use crate::log_debug;
use crate::pipe::Pipe;
use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};

mod command;

pub use command::SelectorCommand;
use command::preview_command;

/// Upper bound on a single preview request read. Requests are one short
/// line each; the child blocks for the reply before sending the next.
const REQUEST_BUFFER_LEN: usize = 8192;

/// What a finished session reports: the selector's exit status, passed
/// through unchanged, and the chosen line if one was made.
#[derive(Debug)]
pub struct Outcome {
    pub status: ExitStatus,
    pub selection: Option<String>,
}

/// An interactive selection session over an external selector process.
///
/// Lifecycle: construct, [`start`](Self::start), feed candidates with
/// [`add_line`](Self::add_line), then [`wait`](Self::wait) for the user's
/// pick. [`shutdown`](Self::shutdown) (also run on drop) force-releases the
/// child and the side channel from any state.
#[derive(Debug, Default)]
pub struct FzfSession {
    child: Option<Child>,
    pipe: Option<Pipe>,
    items: Vec<Option<String>>,
    command: SelectorCommand,
}

impl FzfSession {
    /// Session driving the default `fzf` binary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Session driving a custom selector invocation.
    pub fn with_command(command: SelectorCommand) -> Self {
        Self {
            child: None,
            pipe: None,
            items: Vec::new(),
            command,
        }
    }

    /// Spawn the selector and wire up the preview side channel.
    ///
    /// Fails if the session is already running. Any failure while setting up
    /// tears down whatever was partially constructed before returning, so an
    /// error never leaves a child or an open descriptor behind.
    pub fn start(&mut self) -> Result<()> {
        if self.child.is_some() || self.pipe.is_some() {
            return Err(anyhow!("selector is already running"));
        }
        if let Err(err) = self.start_inner() {
            self.shutdown();
            return Err(err);
        }
        Ok(())
    }

    fn start_inner(&mut self) -> Result<()> {
        let mut pipe = Pipe::new();
        pipe.open()?;
        let mut child_pipe = Pipe::new();
        child_pipe.open()?;
        // After the swap the session pipe reads what the child writes and
        // writes what the child reads; child_pipe holds exactly the two
        // endpoints the child inherits by number.
        child_pipe.swap_read(&mut pipe);
        // The child must inherit exactly the two child-facing endpoints; the
        // session's own pair stays host-only so the child sees EOF on its
        // reply read if the host goes away mid-session.
        pipe.set_cloexec()?;
        let (reply_fd, request_fd) = child_pipe.fds();

        let child = Command::new(&self.command.program)
            .args(&self.command.args)
            .arg("--with-nth=2..")
            .arg("--preview")
            .arg(preview_command(reply_fd, request_fd))
            .env("FZPIPE_REQUEST_FD", request_fd.to_string())
            .env("FZPIPE_REPLY_FD", reply_fd.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to start selector: {}", self.command.program))?;
        log_debug(&format!(
            "selector started: {} (pid {}, side channel fds {}/{})",
            self.command.program,
            child.id(),
            reply_fd,
            request_fd
        ));

        // The child owns its inherited copies now; drop the host copies so
        // the request read sees EOF once the child closes its side.
        drop(child_pipe);
        self.pipe = Some(pipe);
        self.child = Some(child);
        Ok(())
    }

    /// Queue one candidate line with an optional preview payload.
    ///
    /// The line is written to the selector's stdin as `"<index> <line>\n"`
    /// and flushed immediately; the index is the 0-based position of this
    /// call and is the sole correlation key for preview lookups.
    pub fn add_line(&mut self, line: &str, preview: Option<&str>) -> Result<()> {
        let stdin = self
            .child
            .as_mut()
            .and_then(|child| child.stdin.as_mut())
            .ok_or_else(|| anyhow!("selector is not running"))?;
        let index = self.items.len();
        self.items.push(preview.map(str::to_string));
        stdin
            .write_all(format!("{index} {line}\n").as_bytes())
            .context("writing candidate line to selector")?;
        stdin.flush().context("flushing selector input")?;
        Ok(())
    }

    /// Close the selector's stdin, signalling that no more candidates will
    /// arrive. Safe to call when already closed or not running.
    pub fn close_input(&mut self) {
        if let Some(child) = self.child.as_mut() {
            drop(child.stdin.take());
        }
    }

    /// Serve preview requests until the selector is done, then collect its
    /// selection and exit status.
    ///
    /// Each request is answered by index lookup; malformed or out-of-range
    /// requests get the empty payload rather than ending the session. There
    /// is no timeout: a child that never closes its request descriptor nor
    /// exits blocks here indefinitely, so callers needing bounded latency
    /// must wrap the whole session externally.
    pub fn wait(&mut self) -> Result<Outcome> {
        let (Some(mut child), Some(mut pipe)) = (self.child.take(), self.pipe.take()) else {
            self.shutdown();
            bail!("selector is not running");
        };
        drop(child.stdin.take());

        let result = self.serve_requests(&mut pipe);
        pipe.close();
        if let Err(err) = result {
            // Reply-loop I/O died underneath us; reap the child rather than
            // leaving it attached to half a channel.
            drop(child.stdout.take());
            let _ = child.kill();
            let _ = child.wait();
            return Err(err);
        }

        let selection = match read_selection(&mut child) {
            Ok(selection) => selection,
            Err(err) => {
                // Same discipline as the reply-loop branch above: never
                // propagate an error while the child sits unreaped.
                let _ = child.kill();
                let _ = child.wait();
                return Err(err);
            }
        };
        let status = child.wait().context("waiting for selector exit")?;
        log_debug(&format!(
            "selector exited: {status}, selection {}",
            if selection.is_some() { "made" } else { "absent" }
        ));
        Ok(Outcome { status, selection })
    }

    /// Answer one preview request per iteration until the child closes its
    /// request descriptor.
    fn serve_requests(&self, pipe: &mut Pipe) -> Result<()> {
        let mut buf = [0u8; REQUEST_BUFFER_LEN];
        loop {
            let n = pipe.read(&mut buf)?;
            if n == 0 {
                return Ok(());
            }
            let payload = self.preview_for(&buf[..n]);
            let mut reply = STANDARD.encode(payload.as_bytes());
            reply.push('\n');
            pipe.write(reply.as_bytes())?;
        }
    }

    /// Resolve a raw request to its stored preview payload.
    ///
    /// The request's leading whitespace-delimited token is the index; any
    /// decode, parse, or lookup failure degrades to the empty payload so a
    /// single bad request cannot kill an otherwise healthy session.
    fn preview_for(&self, request: &[u8]) -> &str {
        let Ok(text) = std::str::from_utf8(request) else {
            log_debug("preview request was not valid UTF-8");
            return "";
        };
        let Some(token) = text.split_whitespace().next() else {
            return "";
        };
        let Ok(index) = token.parse::<usize>() else {
            log_debug("preview request index did not parse");
            return "";
        };
        match self.items.get(index) {
            Some(payload) => payload.as_deref().unwrap_or(""),
            None => {
                log_debug(&format!("preview request for unknown index {index}"));
                ""
            }
        }
    }

    /// Force-release everything the session holds: the side channel, the
    /// child's standard streams, and the child itself (killed and reaped).
    /// Idempotent and callable from any state; never fails.
    pub fn shutdown(&mut self) {
        if let Some(mut pipe) = self.pipe.take() {
            pipe.close();
        }
        if let Some(mut child) = self.child.take() {
            drop(child.stdin.take());
            drop(child.stdout.take());
            if let Err(err) = child.kill() {
                log_debug(&format!("killing selector failed: {err}"));
            }
            if let Err(err) = child.wait() {
                log_debug(&format!("reaping selector failed: {err}"));
            }
        }
    }
}

impl Drop for FzfSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Drain the selector's stdout into its final record, if it produced one.
fn read_selection(child: &mut Child) -> Result<Option<String>> {
    let Some(mut stdout) = child.stdout.take() else {
        return Ok(None);
    };
    let mut raw = String::new();
    stdout
        .read_to_string(&mut raw)
        .context("reading selector output")?;
    Ok(parse_selection(&raw))
}

/// Split the selector's final `"<index> <selection>"` record into the
/// selection text. Empty or index-only output means nothing was chosen.
fn parse_selection(raw: &str) -> Option<String> {
    let trimmed = raw.trim_end_matches('\n');
    let (_index, selection) = trimmed.split_once(char::is_whitespace)?;
    Some(selection.to_string())
}
