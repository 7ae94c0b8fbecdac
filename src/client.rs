//! Client-side session engine: the interactive REPL that parses user
//! commands and sequences the control/data traffic for each one.
#![deny(missing_docs)]
use color_eyre::Result;
use log::{debug, info, warn};
use std::fs::OpenOptions;
use std::io::{self, prelude::*};
use std::net::TcpStream;
use std::path::Path;

use crate::command::{self, Command, Kind};
use crate::pager::{list_directory, page};
use crate::proto::{ControlMessage, Response, CONTROL_PORT};

/// Whether a dispatched command succeeded, from the user's point of view.
///
/// Distinct from a transport failure: a `Failure` means the server (or a
/// local precheck) rejected the command and the session continues; a
/// transport error aborts the whole session instead of producing an
/// outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    fn status(self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::Failure => 1,
        }
    }
}

/// A connected client session.
pub struct Client {
    control: TcpStream,
    host: String,
}

impl Client {
    /// Connect to `host` on the well-known control port.
    pub fn connect(host: &str) -> Result<Self> {
        let control = TcpStream::connect((host, CONTROL_PORT))?;
        control.set_nodelay(true).ok();
        info!(target: "mftp", "connected to {host}:{CONTROL_PORT}");
        Ok(Self { control, host: host.to_string() })
    }

    /// Drive the REPL until the user exits or stdin reaches EOF.
    pub fn run(mut self) -> Result<()> {
        loop {
            print!("mftp$ ");
            io::stdout().flush()?;

            let mut line = String::new();
            let n = io::stdin().read_line(&mut line)?;
            if n == 0 {
                // EOF on stdin: exit without bothering the server.
                info!(target: "mftp", "stdin closed, ending session");
                return Ok(());
            }
            let line = line.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                continue;
            }

            let cmd = match command::parse(line) {
                Ok(cmd) => cmd,
                Err(err) => {
                    println!("{err}");
                    continue;
                }
            };

            self.announce(&cmd);
            match self.dispatch(&cmd) {
                Ok(outcome) => {
                    self.report(outcome);
                    if cmd.kind == Kind::Exit && outcome == Outcome::Success {
                        return Ok(());
                    }
                }
                Err(err) => {
                    // A transport failure aborts only the current command,
                    // but with the control socket now suspect, there is no
                    // safe way to continue the session.
                    warn!(target: "mftp", "transport failure: {err:#}");
                    println!("Connection to server lost: {err}");
                    return Ok(());
                }
            }
        }
    }

    fn announce(&self, cmd: &Command) {
        match &cmd.arg {
            Some(arg) => println!("Running \"{}\" with argument {arg}", cmd.kind),
            None => println!("Running \"{}\"", cmd.kind),
        }
    }

    fn report(&self, outcome: Outcome) {
        match outcome {
            Outcome::Success => println!("Command finished successfully (status = 0)"),
            Outcome::Failure => println!(
                "Command finished unsuccessfully (status = {})",
                Outcome::Failure.status()
            ),
        }
    }

    fn dispatch(&mut self, cmd: &Command) -> Result<Outcome> {
        match cmd.kind {
            Kind::Cd => Ok(self.local_cd(cmd.arg.as_deref().unwrap_or(""))),
            Kind::Ls => Ok(self.local_ls()),
            Kind::Exit => self.remote_exit(),
            Kind::Rcd => self.remote_rcd(cmd.arg.as_deref().unwrap_or("")),
            Kind::Rls => self.remote_rls(),
            Kind::Get => self.remote_get(cmd.arg.as_deref().unwrap_or("")),
            Kind::Show => self.remote_show(cmd.arg.as_deref().unwrap_or("")),
            Kind::Put => self.remote_put(cmd.arg.as_deref().unwrap_or("")),
            Kind::Data => unreachable!("Data is never user-dispatched"),
        }
    }

    fn local_cd(&self, path: &str) -> Outcome {
        match std::env::set_current_dir(path) {
            Ok(()) => Outcome::Success,
            Err(err) => {
                println!("cd: {err}");
                Outcome::Failure
            }
        }
    }

    fn local_ls(&self) -> Outcome {
        let cwd = match std::env::current_dir() {
            Ok(cwd) => cwd,
            Err(err) => {
                println!("ls: {err}");
                return Outcome::Failure;
            }
        };
        let mut buf = Vec::new();
        match list_directory(&cwd, &mut buf) {
            Ok(_status) => {
                let _ = page(&buf);
                Outcome::Success
            }
            Err(err) => {
                println!("ls: {err}");
                Outcome::Failure
            }
        }
    }

    /// Send a control message and expect a plain ack or an error in reply.
    fn simple_remote(&mut self, msg: ControlMessage) -> Result<Outcome> {
        msg.write(&mut self.control)?;
        match Response::read(&mut self.control)? {
            Response::Ack => Ok(Outcome::Success),
            Response::AckPort(_) => {
                color_eyre::eyre::bail!("unexpected ack-with-port for a non-data command")
            }
            Response::Error(reason) => {
                println!("Server error: {reason}");
                Ok(Outcome::Failure)
            }
        }
    }

    fn remote_exit(&mut self) -> Result<Outcome> {
        self.simple_remote(ControlMessage::new(Kind::Exit))
    }

    fn remote_rcd(&mut self, path: &str) -> Result<Outcome> {
        self.simple_remote(ControlMessage::with_arg(Kind::Rcd, path))
    }

    /// Run the data-channel handshake: send `D`, read the ack-with-port (or
    /// error), and connect out to the server on that port.
    fn open_data_channel(&mut self) -> Result<Option<TcpStream>> {
        ControlMessage::new(Kind::Data).write(&mut self.control)?;
        match Response::read(&mut self.control)? {
            Response::AckPort(port) => {
                let data = TcpStream::connect((self.host.as_str(), port))?;
                data.set_nodelay(true).ok();
                debug!(target: "mftp", "data channel open on port {port}");
                Ok(Some(data))
            }
            Response::Ack => {
                color_eyre::eyre::bail!("server acked Data without a port")
            }
            Response::Error(reason) => {
                println!("Server error: {reason}");
                Ok(None)
            }
        }
    }

    /// Read the terminal ack/error that follows a data transfer.
    fn terminal_ack(&mut self) -> Result<Outcome> {
        match Response::read(&mut self.control)? {
            Response::Ack => Ok(Outcome::Success),
            Response::AckPort(_) => {
                color_eyre::eyre::bail!("unexpected ack-with-port as a terminal response")
            }
            Response::Error(reason) => {
                println!("Server error: {reason}");
                Ok(Outcome::Failure)
            }
        }
    }

    fn remote_rls(&mut self) -> Result<Outcome> {
        let Some(mut data) = self.open_data_channel()? else {
            return Ok(Outcome::Failure);
        };
        ControlMessage::new(Kind::Rls).write(&mut self.control)?;
        let mut buf = Vec::new();
        crate::lineio::stream_copy(&mut data, &mut buf)?;
        drop(data);
        let outcome = self.terminal_ack()?;
        if outcome == Outcome::Success {
            let _ = page(&buf);
        }
        Ok(outcome)
    }

    fn remote_get(&mut self, path: &str) -> Result<Outcome> {
        let Some(mut data) = self.open_data_channel()? else {
            return Ok(Outcome::Failure);
        };
        ControlMessage::with_arg(Kind::Get, path).write(&mut self.control)?;
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());
        let file = OpenOptions::new().write(true).create_new(true).open(&name);
        let mut file = match file {
            Ok(f) => f,
            Err(err) => {
                // Drain and discard the transfer so the control socket stays
                // in sync, then report the local failure.
                let mut sink = io::sink();
                let _ = crate::lineio::stream_copy(&mut data, &mut sink);
                drop(data);
                let _ = self.terminal_ack();
                println!("get: {name}: {err}");
                return Ok(Outcome::Failure);
            }
        };
        crate::lineio::stream_copy(&mut data, &mut file)?;
        drop(data);
        self.terminal_ack()
    }

    fn remote_show(&mut self, path: &str) -> Result<Outcome> {
        let Some(mut data) = self.open_data_channel()? else {
            return Ok(Outcome::Failure);
        };
        ControlMessage::with_arg(Kind::Show, path).write(&mut self.control)?;
        let mut buf = Vec::new();
        crate::lineio::stream_copy(&mut data, &mut buf)?;
        drop(data);
        let outcome = self.terminal_ack()?;
        if outcome == Outcome::Success {
            let _ = page(&buf);
        }
        Ok(outcome)
    }

    fn remote_put(&mut self, path: &str) -> Result<Outcome> {
        // Local precheck: refuse without any control or data traffic if the
        // local file isn't a readable regular file.
        let meta = match std::fs::metadata(path) {
            Ok(meta) => meta,
            Err(err) => {
                println!("put: {path}: {err}");
                return Ok(Outcome::Failure);
            }
        };
        if !meta.is_file() {
            println!("put: {path}: not a regular file");
            return Ok(Outcome::Failure);
        }
        let mut file = match OpenOptions::new().read(true).open(path) {
            Ok(f) => f,
            Err(err) => {
                println!("put: {path}: {err}");
                return Ok(Outcome::Failure);
            }
        };

        let Some(mut data) = self.open_data_channel()? else {
            return Ok(Outcome::Failure);
        };
        ControlMessage::with_arg(Kind::Put, path).write(&mut self.control)?;

        // PUT is the one command that acks *before* the transfer: only
        // once the server has the destination open do we send bytes.
        match Response::read(&mut self.control)? {
            Response::Ack => {}
            Response::AckPort(_) => {
                color_eyre::eyre::bail!("unexpected ack-with-port as PUT's pre-transfer ack")
            }
            Response::Error(reason) => {
                println!("Server error: {reason}");
                return Ok(Outcome::Failure);
            }
        }

        crate::lineio::stream_copy(&mut file, &mut data)?;
        data.shutdown(std::net::Shutdown::Write).ok();
        drop(data);
        // PUT has no post-transfer ack: the pre-transfer ack above is the
        // only response this command ever gets.
        Ok(Outcome::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_status_codes() {
        assert_eq!(Outcome::Success.status(), 0);
        assert_eq!(Outcome::Failure.status(), 1);
    }
}
