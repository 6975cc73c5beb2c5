//! Update through the local `docker` CLI.
//!
//! The engine API does not reliably forward registry credentials on service
//! update, while `docker service update --with-registry-auth` does. This
//! backend shells out for that case. It cannot create services.

use std::io::{BufReader, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use crate::backend::{BackendKind, CreateOutcome, ExecutionBackend};
use crate::error::{Error, Result};
use crate::registry_auth::RegistryAuth;
use crate::spec::{WorkloadHandle, WorkloadSpec};

const POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct DaemonCli {
    program: String,
    program_args: Vec<String>,
    timeout: Duration,
    routing_label_key: Option<String>,
}

impl DaemonCli {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            program_args: Vec::new(),
            timeout,
            routing_label_key: None,
        }
    }

    /// Arguments placed before `service update`, e.g. `--context prod`.
    pub fn with_program_args(mut self, args: Vec<String>) -> Self {
        self.program_args = args;
        self
    }

    /// Forward this label with `--label-add` when the final spec carries it.
    pub fn with_routing_label(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.routing_label_key = Some(key).filter(|k| !k.trim().is_empty());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn update_args(&self, spec: &WorkloadSpec) -> Vec<String> {
        let mut args = vec![
            "service".to_string(),
            "update".to_string(),
            "--with-registry-auth".to_string(),
            "--image".to_string(),
            spec.image().to_string(),
        ];
        if let Some(key) = self.routing_label_key.as_deref() {
            if let Some(value) = spec.label(key) {
                args.push("--label-add".to_string());
                args.push(format!("{key}={value}"));
            }
        }
        args.push(spec.name.clone());
        args
    }

    fn exec_error(&self, target: &str, reason: impl Into<String>) -> Error {
        Error::Execution {
            program: self.program.clone(),
            target: target.to_string(),
            reason: reason.into(),
        }
    }

    fn run(&self, target: &str, args: &[String]) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.program_args).args(args);

        // Own process group, so a timeout takes down anything the CLI spawned.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            unsafe {
                cmd.pre_exec(|| {
                    if libc::setpgid(0, 0) != 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        tracing::info!(program = %self.program, ?args, "running daemon update");
        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.exec_error(target, format!("spawn failed: {e}")))?;
        let pid = child.id();
        // `None` when the configured timeout is too large to represent.
        let deadline = Instant::now().checked_add(self.timeout);

        let (tx, rx) = mpsc::channel::<String>();
        if let Some(out) = child.stdout.take() {
            let tx = tx.clone();
            std::thread::spawn(move || read_lines(out, tx));
        }
        if let Some(err) = child.stderr.take() {
            let tx = tx.clone();
            std::thread::spawn(move || read_lines(err, tx));
        }
        drop(tx);

        let mut last_line = String::new();
        loop {
            let remaining = deadline
                .map(|d| d.saturating_duration_since(Instant::now()))
                .unwrap_or(Duration::MAX);
            match rx.recv_timeout(remaining) {
                Ok(line) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    tracing::debug!(target: "daemon", "{line}");
                    last_line = line;
                }
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    kill_group(pid);
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(self.timeout_error());
                }
            }
        }

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if deadline.is_some_and(|d| Instant::now() >= d) => {
                    kill_group(pid);
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(self.timeout_error());
                }
                Ok(None) => std::thread::sleep(POLL),
                Err(e) => return Err(self.exec_error(target, format!("wait failed: {e}"))),
            }
        };

        if status.success() {
            return Ok(());
        }
        Err(self.exec_error(target, failure_reason(status, &last_line)))
    }

    fn timeout_error(&self) -> Error {
        Error::Timeout {
            what: format!("{} service update", self.program),
            after: self.timeout,
        }
    }
}

impl ExecutionBackend for DaemonCli {
    fn kind(&self) -> BackendKind {
        BackendKind::LocalDaemon
    }

    fn create(&self, spec: &WorkloadSpec, _auth: Option<&RegistryAuth>) -> Result<CreateOutcome> {
        Err(self.exec_error(&spec.name, "the daemon CLI cannot create services"))
    }

    fn update(&self, handle: &WorkloadHandle, auth: Option<&RegistryAuth>) -> Result<bool> {
        if auth.is_some() {
            // --with-registry-auth forwards the local client's login instead.
            tracing::debug!(
                name = handle.name(),
                "registry auth token is not used by the daemon backend"
            );
        }
        let args = self.update_args(&handle.spec);
        self.run(handle.name(), &args)?;
        Ok(true)
    }
}

fn failure_reason(status: ExitStatus, last_line: &str) -> String {
    if last_line.is_empty() {
        format!("exited with {status}")
    } else {
        format!("exited with {status}: {last_line}")
    }
}

fn kill_group(pid: u32) {
    #[cfg(unix)]
    {
        // Negative PID targets the whole process group.
        let _ = unsafe { libc::kill(-(pid as i32), libc::SIGKILL) };
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}

fn read_lines<R: Read>(reader: R, tx: mpsc::Sender<String>) {
    const MAX_PENDING_BYTES: usize = 16 * 1024;
    let mut r = BufReader::new(reader);
    let mut buf = [0u8; 4096];
    let mut pending = Vec::with_capacity(256);
    loop {
        let n = match r.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for b in &buf[..n] {
            if *b == b'\n' || *b == b'\r' {
                if !pending.is_empty() {
                    let _ = tx.send(String::from_utf8_lossy(&pending).into_owned());
                    pending.clear();
                }
            } else {
                pending.push(*b);
                if pending.len() >= MAX_PENDING_BYTES {
                    let _ = tx.send(String::from_utf8_lossy(&pending).into_owned());
                    pending.clear();
                }
            }
        }
    }
    if !pending.is_empty() {
        let _ = tx.send(String::from_utf8_lossy(&pending).into_owned());
    }
}
