//! Synchronous child-process invocation with captured output and a deadline.

use crate::BitfontError;
use std::{
    ffi::OsString,
    io::{ErrorKind as IoErrorKind, Read},
    path::PathBuf,
    process::{Command, ExitStatus, Stdio},
    thread::JoinHandle,
    time::{Duration, Instant},
};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// An external program the pipeline depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolRequirement {
    pub name: &'static str,
    pub install_hint: &'static str,
}

pub const SUBSETTER: ToolRequirement = ToolRequirement {
    name: "pyftsubset",
    install_hint: "pip install fonttools",
};
pub const RASTERIZER: ToolRequirement = ToolRequirement {
    name: "otf2bdf",
    install_hint: "brew install otf2bdf or apt-get install otf2bdf",
};
pub const COMPILER: ToolRequirement = ToolRequirement {
    name: "bdftopcf",
    install_hint: "brew install bdftopcf or apt-get install xfonts-utils",
};

pub const REQUIRED_TOOLS: [ToolRequirement; 3] = [SUBSETTER, RASTERIZER, COMPILER];

pub fn install_hint(program: &str) -> &'static str {
    REQUIRED_TOOLS
        .iter()
        .find(|t| t.name == program)
        .map(|t| t.install_hint)
        .unwrap_or("make sure it is on your PATH")
}

/// What a finished tool run left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub command: String,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ToolOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }
}

/// One command line, ready to run.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    program: String,
    args: Vec<OsString>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        ToolInvocation {
            program: program.into(),
            args: vec![],
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Human-readable command line for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().map(|a| a.to_string_lossy().into_owned()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion, killing the child if it outlives `timeout`.
    ///
    /// A missing program is a [`BitfontError::Dependency`]. A program that
    /// cannot be started or exits non-zero is a [`BitfontError::Conversion`],
    /// the latter carrying the captured stderr verbatim.
    pub fn run(&self, timeout: Duration) -> Result<ToolOutput, BitfontError> {
        let command = self.display();
        log::debug!("Running {}", command);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == IoErrorKind::NotFound {
                    BitfontError::Dependency {
                        tool: self.program.clone(),
                        hint: install_hint(&self.program).to_string(),
                    }
                } else {
                    BitfontError::Conversion {
                        tool: self.program.clone(),
                        exit_code: None,
                        stdout: String::new(),
                        stderr: format!("could not start: {}", e),
                    }
                }
            })?;

        let stdout_reader = drain(child.stdout.take());
        let stderr_reader = drain(child.stderr.take());

        let deadline = Instant::now() + timeout;
        let status: ExitStatus = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                log::warn!("{} timed out, killing it", self.program);
                // The child may have exited between try_wait and kill
                let _ = child.kill();
                let _ = child.wait();
                return Err(BitfontError::Timeout {
                    tool: self.program.clone(),
                    timeout,
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let stdout = join(stdout_reader);
        let stderr = String::from_utf8_lossy(&join(stderr_reader))
            .trim()
            .to_string();

        if !status.success() {
            return Err(BitfontError::Conversion {
                tool: self.program.clone(),
                exit_code: status.code(),
                stdout: String::from_utf8_lossy(&stdout).trim().to_string(),
                stderr: if stderr.is_empty() {
                    "Unknown error".to_string()
                } else {
                    stderr
                },
            });
        }
        Ok(ToolOutput {
            command,
            stdout,
            stderr,
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buffer = Vec::new();
            if let Err(e) = pipe.read_to_end(&mut buffer) {
                log::warn!("Error reading tool output: {}", e);
            }
            buffer
        })
    })
}

fn join(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Locate a program on `PATH`.
pub fn find_in_path(program: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// Result of looking for a required tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    pub requirement: ToolRequirement,
    pub path: Option<PathBuf>,
    pub version: Option<String>,
}

impl ToolStatus {
    pub fn is_installed(&self) -> bool {
        self.path.is_some()
    }
}

/// Check whether a tool is installed and ask it for its version.
pub fn probe(requirement: ToolRequirement) -> ToolStatus {
    let path = find_in_path(requirement.name);
    let version = path.as_ref().and_then(|_| {
        ToolInvocation::new(requirement.name)
            .arg("--version")
            .run(Duration::from_secs(2))
            .ok()
            .and_then(|output| {
                // Some tools print their version on stderr
                let text = if output.stdout.is_empty() {
                    output.stderr
                } else {
                    output.stdout_text()
                };
                text.lines().next().map(str::to_string)
            })
            .filter(|line| !line.is_empty())
    });
    ToolStatus {
        requirement,
        path,
        version,
    }
}

#[cfg(all(test, unix))]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::ErrorKind;
    use pretty_assertions::assert_eq;

    fn sh(script: &str) -> ToolInvocation {
        ToolInvocation::new("sh").arg("-c").arg(script)
    }

    #[test]
    fn test_captures_stdout() {
        let output = sh("printf hello").run(Duration::from_secs(10)).unwrap();
        assert_eq!(output.stdout, b"hello");
        assert_eq!(output.command, "sh -c printf hello");
    }

    #[test]
    fn test_nonzero_exit_keeps_stderr_verbatim() {
        let err = sh("echo 'no glyphs generated' >&2; exit 3")
            .run(Duration::from_secs(10))
            .unwrap_err();
        match err {
            BitfontError::Conversion {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(stderr, "no glyphs generated");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_missing_program() {
        let err = ToolInvocation::new("definitely-not-a-real-tool-xyz")
            .run(Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Dependency);
    }

    #[test]
    fn test_timeout_kills_child() {
        let started = Instant::now();
        let err = sh("sleep 30").run(Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, BitfontError::Timeout { .. }));
        assert_eq!(err.to_string(), "sh did not finish within 200ms");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_unstartable_program_is_conversion_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory exists but cannot be executed
        let err = ToolInvocation::new(dir.path().to_string_lossy())
            .run(Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conversion);
    }

    #[test]
    fn test_install_hint() {
        assert_eq!(install_hint("otf2bdf"), RASTERIZER.install_hint);
        assert_eq!(install_hint("other"), "make sure it is on your PATH");
    }
}
