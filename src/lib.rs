//! Drive fzf (or any line-oriented selector) with out-of-band previews.
//!
//! Candidate lines are streamed to the selector's stdin as indexed records;
//! preview payloads stay on the host side and are fetched on demand over a
//! pair of inherited pipe descriptors, one base64 line per request. This
//! keeps payloads of any size and content out of argv, the environment, and
//! the selector's visible input stream.
//!
//! ```no_run
//! use fzpipe::FzfSession;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut session = FzfSession::new();
//! session.start()?;
//! session.add_line("Cargo.toml", Some("package manifest"))?;
//! session.add_line("src/lib.rs", Some("library root\nwith modules"))?;
//! session.close_input();
//! let outcome = session.wait()?;
//! if let Some(selection) = outcome.selection {
//!     println!("picked {selection}");
//! }
//! # Ok(())
//! # }
//! ```

mod logging;
pub mod pipe;
pub mod session;

pub(crate) use logging::log_debug;
pub use logging::log_file_path;
pub use pipe::Pipe;
pub use session::{FzfSession, Outcome, SelectorCommand};
