//! Side-process composition: commands whose stdout feeds a byte sink.
//!
//! The local pager and the directory-listing helper are both, from this
//! crate's point of view, just "a command whose standard output is
//! connected to somewhere else" - a data socket, a file, or (for the
//! client's own listings) the terminal's pager. Neither command's exit
//! status feeds back into the protocol's ack/error decision; only whether
//! the plumbing itself (spawn, stream, wait) succeeded matters there.
#![deny(missing_docs)]
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use std::io::Write;
use std::process::{Command, ExitStatus, Stdio};

use crate::lineio::stream_copy;

/// Run `argv[0]` with the remaining elements as arguments, copying its
/// standard output into `sink` until the child exits.
///
/// `argv` must be non-empty. Returns the child's exit status; the caller
/// decides whether a non-zero status is worth reporting; the protocol
/// itself never inspects it.
pub fn run_to_sink<W: Write>(argv: &[&str], sink: &mut W) -> Result<ExitStatus> {
    let (prog, args) = argv
        .split_first()
        .ok_or_else(|| color_eyre::eyre::eyre!("run_to_sink called with empty argv"))?;
    let mut child = Command::new(prog)
        .args(args)
        .stdout(Stdio::piped())
        .spawn()
        .wrap_err_with(|| format!("spawning {prog}"))?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| color_eyre::eyre::eyre!("{prog} was spawned without a piped stdout"))?;
    stream_copy(&mut stdout, sink).wrap_err_with(|| format!("streaming output of {prog}"))?;
    let status = child.wait().wrap_err_with(|| format!("waiting for {prog}"))?;
    Ok(status)
}

/// Run the platform's long-form directory listing for `dir`, writing it to
/// `sink`. Used by both the client's local `ls` and the server's `rls`.
pub fn list_directory<W: Write>(dir: &std::path::Path, sink: &mut W) -> Result<ExitStatus> {
    run_to_sink(&["ls", "-l", dir.to_str().unwrap_or(".")], sink)
}

/// Pipe `bytes` through the user's pager (`$PAGER`, defaulting to `more`),
/// letting the pager write directly to the terminal.
pub fn page(bytes: &[u8]) -> Result<ExitStatus> {
    let pager = std::env::var("PAGER").unwrap_or_else(|_| "more".to_string());
    let mut child = Command::new(&pager)
        .stdin(Stdio::piped())
        .spawn()
        .wrap_err_with(|| format!("spawning pager {pager}"))?;
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| color_eyre::eyre::eyre!("pager {pager} was spawned without a piped stdin"))?;
    // The pager may exit early (e.g. user quits); a broken pipe here is not
    // a transport error for the session, just a shorter-than-full display.
    let _ = stdin.write_all(bytes);
    drop(stdin);
    let status = child.wait().wrap_err_with(|| format!("waiting for pager {pager}"))?;
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_to_sink_captures_stdout() {
        let mut sink = Vec::new();
        let status = run_to_sink(&["echo", "hello"], &mut sink).unwrap();
        assert!(status.success());
        assert_eq!(sink, b"hello\n");
    }
}
