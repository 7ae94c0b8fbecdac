//! Server-side session engine and connection acceptor.
//!
//! Each accepted client is handled in its own forked child process, which
//! gives each session a private process-wide working directory for free -
//! `rcd` in one session can never leak into another (see §9 in
//! `SPEC_FULL.md`). Within a session, everything is strictly sequential:
//! one control line is read, handled to completion (including any data
//! transfer), and only then is the next line read.
#![deny(missing_docs)]
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::{info, warn};
use std::fs::OpenOptions;
use std::io::{self, prelude::*};
use std::net::{TcpListener, TcpStream};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::FromRawFd;
use std::path::Path;

use crate::command::Kind;
use crate::pager::list_directory;
use crate::proto::{ControlMessage, Response, CONTROL_PORT, LISTEN_BACKLOG};

/// One client's session: its control socket and, while a data-bearing
/// command is in flight, its data socket.
pub struct Session {
    control: TcpStream,
    data: Option<TcpStream>,
}

impl Session {
    fn new(control: TcpStream) -> Self {
        Self { control, data: None }
    }

    fn send(&mut self, response: &Response) -> Result<()> {
        response.write(&mut self.control)
    }

    fn send_error(&mut self, reason: impl std::fmt::Display) -> Result<()> {
        self.send(&Response::Error(reason.to_string()))
    }

    /// Open an ephemeral listener, announce its port, and accept exactly
    /// one peer as this session's data socket.
    ///
    /// The port is written *before* `accept()` is called - the client
    /// cannot know what port to connect to otherwise, and waiting for the
    /// client to connect first would deadlock both sides.
    fn open_data_channel(&mut self) -> Result<()> {
        let listener = match TcpListener::bind(("127.0.0.1", 0)) {
            Ok(l) => l,
            Err(err) => {
                self.send_error(format!("could not open data connection: {err}"))?;
                return Ok(());
            }
        };
        let port = listener.local_addr().wrap_err("reading ephemeral port")?.port();
        self.send(&Response::AckPort(port))?;
        let (peer, _) = listener
            .accept()
            .wrap_err("accepting data connection")?;
        peer.set_nodelay(true).ok();
        self.data = Some(peer);
        Ok(())
    }

    fn handle_rcd(&mut self, arg: &str) -> Result<()> {
        match std::env::set_current_dir(arg) {
            Ok(()) => self.send(&Response::Ack),
            Err(err) => self.send_error(format!("cd to {arg} failed: {err}")),
        }
    }

    fn handle_rls(&mut self) -> Result<()> {
        let Some(mut data) = self.data.take() else {
            return self.send_error("Data connection not established");
        };
        let cwd = std::env::current_dir().wrap_err("reading current directory")?;
        let result = list_directory(&cwd, &mut data);
        drop(data);
        match result {
            Ok(_status) => self.send(&Response::Ack),
            Err(err) => self.send_error(format!("listing failed: {err}")),
        }
    }

    fn handle_get_or_show(&mut self, path: &str) -> Result<()> {
        let Some(mut data) = self.data.take() else {
            return self.send_error("Data connection not established");
        };
        let result = (|| -> io::Result<()> {
            let meta = std::fs::metadata(path)?;
            if !meta.is_file() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{path} is not a regular file"),
                ));
            }
            let mut file = std::fs::File::open(path)?;
            crate::lineio::stream_copy(&mut file, &mut data)?;
            Ok(())
        })();
        drop(data);
        match result {
            Ok(()) => self.send(&Response::Ack),
            Err(err) => self.send_error(format!("{path}: {err}")),
        }
    }

    fn handle_put(&mut self, path: &str) -> Result<()> {
        let Some(mut data) = self.data.take() else {
            return self.send_error("Data connection not established");
        };
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o666)
            .open(&name);
        let mut file = match file {
            Ok(f) => f,
            Err(err) => {
                drop(data);
                return self.send_error(format!("{name} already exists or cannot be created: {err}"));
            }
        };
        // PUT acks once, before the transfer, so the client knows it may
        // start sending bytes; there is no second ack once the stream ends.
        self.send(&Response::Ack)?;
        let result = crate::lineio::stream_copy(&mut data, &mut file);
        drop(data);
        if let Err(err) = result {
            warn!(target: "mftp", "receiving {name} failed: {err:#}");
        }
        Ok(())
    }

    /// Run the session loop until the client disconnects or exits.
    pub fn run(mut self) -> Result<()> {
        loop {
            let msg = match ControlMessage::read(&mut self.control) {
                Ok(Some(msg)) => msg,
                Ok(None) => {
                    info!(target: "mftp", "client closed control connection");
                    return Ok(());
                }
                Err(err) => {
                    warn!(target: "mftp", "malformed control message: {err:#}");
                    // best-effort: if the error is protocol-level the peer
                    // is still readable, but a raw I/O failure means the
                    // control socket itself is gone - nothing more to do.
                    return Ok(());
                }
            };

            match msg.kind {
                Kind::Exit => {
                    self.send(&Response::Ack)?;
                    info!(target: "mftp", "client exited");
                    return Ok(());
                }
                Kind::Data => {
                    self.open_data_channel()?;
                }
                Kind::Rcd => {
                    let arg = msg.arg.unwrap_or_default();
                    self.handle_rcd(&arg)?;
                }
                Kind::Rls => {
                    self.handle_rls()?;
                    self.data = None;
                }
                Kind::Get | Kind::Show => {
                    let arg = msg.arg.unwrap_or_default();
                    self.handle_get_or_show(&arg)?;
                    self.data = None;
                }
                Kind::Put => {
                    let arg = msg.arg.unwrap_or_default();
                    self.handle_put(&arg)?;
                    self.data = None;
                }
                Kind::Cd | Kind::Ls => {
                    self.send_error(format!("{:?} is not a valid control message", msg.kind))?;
                }
            }
        }
    }
}

/// Handle one accepted client to completion.
pub fn handle(control: TcpStream) -> Result<()> {
    control.set_nodelay(true).ok();
    Session::new(control).run()
}

/// Install a `SIGCHLD` handler that reaps terminated children without
/// blocking, so the acceptor never has to `wait()` explicitly.
///
/// Safety: the handler only calls `waitpid` in a loop with `WNOHANG`, which
/// is async-signal-safe.
fn install_sigchld_reaper() {
    extern "C" fn reap(_signum: libc::c_int) {
        loop {
            // SAFETY: waitpid with WNOHANG is async-signal-safe and does not
            // allocate; -1 collects any child, ECHILD/EINTR both end the loop.
            let pid = unsafe { libc::waitpid(-1, std::ptr::null_mut(), libc::WNOHANG) };
            if pid <= 0 {
                break;
            }
        }
    }
    unsafe {
        libc::signal(libc::SIGCHLD, reap as libc::sighandler_t);
    }
}

/// Build and bind the control-port listening socket by hand, since
/// `std::net::TcpListener::bind` always uses the platform's hardcoded
/// default backlog rather than [`LISTEN_BACKLOG`].
fn bind_control_listener() -> io::Result<TcpListener> {
    // SAFETY: `socket` is called with a valid address family/type pair and
    // its return value is checked before any further use.
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    let reuse: libc::c_int = 1;
    // SAFETY: `fd` is a valid, owned socket; `reuse` lives for the call.
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &reuse as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        let err = io::Error::last_os_error();
        unsafe { libc::close(fd) };
        return Err(err);
    }

    let addr = libc::sockaddr_in {
        sin_family: libc::AF_INET as libc::sa_family_t,
        sin_port: CONTROL_PORT.to_be(),
        sin_addr: libc::in_addr { s_addr: libc::INADDR_ANY },
        sin_zero: [0; 8],
    };
    // SAFETY: `addr` is a valid `sockaddr_in`, cast to the generic
    // `sockaddr` pointer `bind` expects, with its exact size passed along.
    let rc = unsafe {
        libc::bind(
            fd,
            &addr as *const libc::sockaddr_in as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        let err = io::Error::last_os_error();
        unsafe { libc::close(fd) };
        return Err(err);
    }

    // SAFETY: `fd` is bound and still owned by this function.
    let rc = unsafe { libc::listen(fd, LISTEN_BACKLOG) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        unsafe { libc::close(fd) };
        return Err(err);
    }

    // SAFETY: `fd` is a valid, bound, listening TCP socket and ownership is
    // transferred to the `TcpListener`, which will close it on drop.
    Ok(unsafe { TcpListener::from_raw_fd(fd) })
}

/// Bind the control port and accept clients forever, handling each one in
/// its own forked child process.
pub fn serve() -> Result<()> {
    let listener = bind_control_listener().wrap_err("binding control port")?;
    install_sigchld_reaper();
    info!(target: "mftp", "listening on {}", CONTROL_PORT);

    loop {
        let (stream, peer) = match listener.accept() {
            Ok(pair) => pair,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err).wrap_err("accepting client"),
        };
        info!(target: "mftp", "client connected from {peer}");

        match fork::fork() {
            Ok(fork::Fork::Child) => {
                drop(listener);
                let result = handle(stream);
                match result {
                    Ok(()) => info!(target: "mftp", "client {peer} disconnected"),
                    Err(err) => warn!(target: "mftp", "session with {peer} failed: {err:#}"),
                }
                std::process::exit(0);
            }
            Ok(fork::Fork::Parent(_child_pid)) => {
                drop(stream);
            }
            Err(err) => {
                warn!(target: "mftp", "fork failed (errno {err}), handling client inline");
                if let Err(err) = handle(stream) {
                    warn!(target: "mftp", "session with {peer} failed: {err:#}");
                }
            }
        }
    }
}
