//! Dev-server controller: lifecycle of the application under test plus
//! the HTTP boundary used by request/response listings.
//!
//! The [`AppServer`] trait decouples the replay engine from the real
//! server process. Tests use a scripted implementation that returns
//! predetermined responses without binding a port.

use std::cell::RefCell;
use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::error::{ServerStartError, StateError};
use crate::io::config::ServerConfig;

/// Response surface reconciled against an Output listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Abstraction over the application server a chapter runs against.
pub trait AppServer {
    /// Launch the server and block until it accepts connections or the
    /// startup timeout elapses.
    fn start(&mut self) -> Result<()>;
    /// Stop then start; required after changes the application cannot
    /// hot-reload (migrations, template changes).
    fn restart(&mut self) -> Result<()>;
    /// Stop and reap the server process. Idempotent.
    fn stop(&mut self) -> Result<()>;
    fn is_running(&self) -> bool;
    /// Issue a request against the running server. Calling this while the
    /// server is down is a [`StateError`].
    fn request(&self, method: &str, path: &str) -> Result<HttpResponse>;
}

/// Real dev server spawned from the chapter spec's server command.
pub struct DevServer {
    command: Vec<String>,
    port: u16,
    startup_timeout: Duration,
    workdir: PathBuf,
    // RefCell so the liveness probe can reap an exited child from the
    // shared-reference trait methods.
    child: RefCell<Option<Child>>,
    client: reqwest::blocking::Client,
}

impl DevServer {
    pub fn new(workdir: impl Into<PathBuf>, config: &ServerConfig) -> Self {
        Self {
            command: config.command.clone(),
            port: config.port,
            startup_timeout: Duration::from_secs(config.startup_timeout_secs),
            workdir: workdir.into(),
            child: RefCell::new(None),
            client: reqwest::blocking::Client::new(),
        }
    }

    fn addr(&self) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], self.port))
    }

    /// Poll until the port accepts connections or the deadline passes.
    fn wait_until_accepting(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.startup_timeout;
        while Instant::now() < deadline {
            if TcpStream::connect_timeout(&self.addr(), Duration::from_millis(250)).is_ok() {
                info!(port = self.port, "dev server accepting connections");
                return Ok(());
            }
            // A dead child will never start listening.
            {
                let mut slot = self.child.borrow_mut();
                if let Some(child) = slot.as_mut()
                    && let Ok(Some(status)) = child.try_wait()
                {
                    warn!(?status, "dev server exited during startup");
                    slot.take();
                    break;
                }
            }
            thread::sleep(Duration::from_millis(100));
        }
        self.stop().ok();
        Err(ServerStartError {
            port: self.port,
            timeout_secs: self.startup_timeout.as_secs(),
        }
        .into())
    }
}

impl AppServer for DevServer {
    #[instrument(skip_all, fields(port = self.port))]
    fn start(&mut self) -> Result<()> {
        if self.is_running() {
            warn!("dev server already running, start ignored");
            return Ok(());
        }
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("server.command is empty, this chapter has no dev server"))?;
        debug!(program = %program, "spawning dev server");
        let child = Command::new(program)
            .args(args)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("spawn dev server `{program}`"))?;
        *self.child.borrow_mut() = Some(child);
        self.wait_until_accepting()
    }

    fn restart(&mut self) -> Result<()> {
        self.stop()?;
        self.start()
    }

    fn stop(&mut self) -> Result<()> {
        let taken = self.child.borrow_mut().take();
        if let Some(mut child) = taken {
            debug!("stopping dev server");
            child.kill().context("kill dev server")?;
            child.wait().context("reap dev server")?;
        }
        Ok(())
    }

    /// A server that exited on its own counts as down; the dead child is
    /// reaped here so a later request gets a [`StateError`] instead of a
    /// connection failure.
    fn is_running(&self) -> bool {
        let mut slot = self.child.borrow_mut();
        match slot.as_mut().map(Child::try_wait) {
            None => false,
            Some(Ok(Some(status))) => {
                warn!(?status, "dev server exited on its own");
                slot.take();
                false
            }
            Some(_) => true,
        }
    }

    fn request(&self, method: &str, path: &str) -> Result<HttpResponse> {
        if !self.is_running() {
            return Err(StateError {
                operation: format!("{method} {path}"),
            }
            .into());
        }
        let url = format!("http://127.0.0.1:{}{path}", self.port);
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .with_context(|| format!("invalid http method `{method}`"))?;
        let response = self
            .client
            .request(method, &url)
            .send()
            .with_context(|| format!("request {url}"))?;
        let status = response.status().as_u16();
        let body = response.text().context("read response body")?;
        Ok(HttpResponse { status, body })
    }
}

impl Drop for DevServer {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(err = %err, "failed to stop dev server on drop");
        }
    }
}
