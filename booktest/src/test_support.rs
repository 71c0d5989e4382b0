//! Test-only helpers: throwaway git repositories and a scripted dev
//! server that replays without binding a port.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, anyhow};

use crate::error::StateError;
use crate::io::server::{AppServer, HttpResponse};

/// Temporary git repository for driving replays in tests.
pub struct TestRepo {
    dir: tempfile::TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        let repo = Self { dir };
        repo.git(&["init", "-q"])?;
        repo.git(&["config", "user.email", "book@example.com"])?;
        repo.git(&["config", "user.name", "Book Tester"])?;
        Ok(repo)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn git(&self, args: &[&str]) -> Result<String> {
        let out = Command::new("git")
            .args(args)
            .current_dir(self.root())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !out.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&out.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    pub fn write_file(&self, path: &str, contents: &str) -> Result<()> {
        let target = self.root().join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&target, contents).with_context(|| format!("write {}", target.display()))?;
        Ok(())
    }

    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "-q", "--allow-empty", "-m", message])?;
        Ok(())
    }

    pub fn tag(&self, name: &str) -> Result<()> {
        self.git(&["tag", name])?;
        Ok(())
    }
}

/// Dev server stand-in returning predetermined responses and counting
/// lifecycle calls.
#[derive(Debug, Default)]
pub struct ScriptedServer {
    pub running: bool,
    pub starts: u32,
    pub restarts: u32,
    pub responses: RefCell<VecDeque<HttpResponse>>,
}

impl ScriptedServer {
    pub fn with_responses(responses: Vec<HttpResponse>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            ..Self::default()
        }
    }
}

impl AppServer for ScriptedServer {
    fn start(&mut self) -> Result<()> {
        self.running = true;
        self.starts += 1;
        Ok(())
    }

    fn restart(&mut self) -> Result<()> {
        self.running = true;
        self.restarts += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn request(&self, method: &str, path: &str) -> Result<HttpResponse> {
        if !self.running {
            return Err(StateError {
                operation: format!("{method} {path}"),
            }
            .into());
        }
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted response left for {method} {path}"))
    }
}
