//! Selector invocation: which binary to run and the preview command it is
//! handed for the side-channel round trip.

use std::os::unix::io::RawFd;

/// The selector program and any user-supplied extra arguments.
///
/// The session appends its own `--with-nth`/`--preview` arguments after
/// these, so extra args can tune appearance (`--height`, `--prompt`, ...)
/// without touching the wire protocol.
#[derive(Debug, Clone)]
pub struct SelectorCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for SelectorCommand {
    fn default() -> Self {
        Self::new("fzf")
    }
}

impl SelectorCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Split a full command string into program and arguments, honoring
    /// shell quoting. Unbalanced quotes fall back to whitespace splitting.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let parts = shell_words::split(trimmed)
            .unwrap_or_else(|_| trimmed.split_whitespace().map(|s| s.to_string()).collect());
        let mut parts = parts.into_iter();
        let program = parts.next().unwrap_or_default();
        Self {
            program,
            args: parts.collect(),
        }
    }

    /// Append one extra argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Shell command the selector runs to render the highlighted line's preview:
/// write the full candidate line to the request descriptor, block-read one
/// base64 line back on the reply descriptor, decode and emit it. `{}` is the
/// selector's placeholder for the current line.
pub(super) fn preview_command(reply_fd: RawFd, request_fd: RawFd) -> String {
    [
        format!("echo {{}} >&{request_fd}"),
        format!("read -r -u {reply_fd} data"),
        r#"exec base64 -d <<<"$data""#.to_string(),
    ]
    .join(" && ")
}
