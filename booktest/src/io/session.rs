//! Interactive subprocess sessions for multi-turn listings.
//!
//! An interactive listing (e.g. a `manage.py` shell transcript) is not a
//! single command/output pair: the program prints a prompt, the user
//! types a line, and so on. The session spawns the command with piped
//! stdin/stdout, drains stdout on a reader thread, and lets the engine
//! collect "everything printed since the last turn" before sending the
//! next response.

use std::io::{Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// How long stdout must stay quiet before a prompt is considered
/// complete. Prompts routinely end without a newline, so silence is the
/// only end-of-prompt signal available.
pub const SETTLE: Duration = Duration::from_millis(300);

/// A running interactive child process.
pub struct InteractiveSession {
    command: String,
    child: Child,
    stdin: Option<ChildStdin>,
    chunks: Receiver<Vec<u8>>,
}

impl InteractiveSession {
    /// Spawn `cmd` through the shell with the given working directory.
    #[instrument(skip_all, fields(cmd))]
    pub fn spawn(cmd: &str, workdir: &std::path::Path) -> Result<Self> {
        debug!("spawning interactive session");
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .current_dir(workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("spawn interactive `{cmd}`"))?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("stdout was not piped"))?;

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut reader = stdout;
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(Self {
            command: cmd.to_string(),
            child,
            stdin,
            chunks: rx,
        })
    }

    /// Collect everything the program prints before its next read, i.e.
    /// the prompt for the upcoming turn.
    ///
    /// Waits up to `timeout` for the first byte, then keeps collecting
    /// until stdout stays quiet for a settle window. Returns what was
    /// collected; an empty result means the program printed nothing.
    pub fn read_prompt(&mut self, timeout: Duration) -> Result<String> {
        let mut collected = Vec::new();
        let deadline = Instant::now() + timeout;
        loop {
            let wait = if collected.is_empty() {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                deadline - now
            } else {
                SETTLE
            };
            match self.chunks.recv_timeout(wait) {
                Ok(chunk) => collected.extend_from_slice(&chunk),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        Ok(String::from_utf8_lossy(&collected).into_owned())
    }

    /// Send one line of user input.
    pub fn send_line(&mut self, response: &str) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| anyhow!("session stdin already closed"))?;
        stdin
            .write_all(response.as_bytes())
            .and_then(|()| stdin.write_all(b"\n"))
            .and_then(|()| stdin.flush())
            .with_context(|| format!("write to `{}`", self.command))?;
        Ok(())
    }

    /// Close stdin and wait for the program to exit.
    pub fn finish(mut self, timeout: Duration) -> Result<()> {
        drop(self.stdin.take());
        match self.child.wait_timeout(timeout).context("wait session")? {
            Some(status) => {
                debug!(exit_code = ?status.code(), "interactive session finished");
                Ok(())
            }
            None => {
                warn!(cmd = %self.command, "interactive session hung, killing");
                self.child.kill().context("kill session")?;
                self.child.wait().context("reap session")?;
                Err(anyhow!("interactive `{}` did not exit", self.command))
            }
        }
    }
}

impl Drop for InteractiveSession {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            self.child.kill().ok();
            self.child.wait().ok();
        }
    }
}
