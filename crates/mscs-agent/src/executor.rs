use std::{collections::BTreeSet, path::PathBuf, process::Stdio, time::Duration};

use mscs_world::CommandResult;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
};

/// Tokens `mscs` may be invoked with. Anything else is refused before spawning.
pub const DEFAULT_COMMANDS: [&str; 10] = [
    "start",
    "stop",
    "restart",
    "status",
    "list",
    "backup",
    "connected",
    "running",
    "worlds",
    "version",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAllowList(BTreeSet<String>);

impl CommandAllowList {
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(commands.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, command: &str) -> bool {
        self.0.contains(command)
    }
}

impl Default for CommandAllowList {
    fn default() -> Self {
        Self::new(DEFAULT_COMMANDS)
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub executable: PathBuf,
    pub allowed: CommandAllowList,
    pub timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("command not allowed: {0}")]
    NotAllowed(String),
    #[error("command `{command}` timed out after {}ms", .timeout.as_millis())]
    Timeout { command: String, timeout: Duration },
    #[error("command `{command}` exited with code {exit_code} and produced no usable output")]
    Failed { command: String, exit_code: i32 },
    #[error("failed to execute command `{command}`")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct CommandExecutor {
    config: ExecutorConfig,
}

impl CommandExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Runs `<mscs> <command> [<target>]` and captures its output.
    ///
    /// A blank `target` is left off argv so the tool applies the command to
    /// every world. No retries: a timeout or a non-zero exit is handed back
    /// to the caller as is.
    ///
    /// The process is driven by its own task. Dropping the returned future
    /// detaches the caller but the command still runs to exit or timeout.
    pub async fn execute(&self, target: &str, command: &str) -> Result<CommandResult, ExecError> {
        if !self.config.allowed.contains(command) {
            tracing::warn!(command, target, "rejected command outside the allow-list");
            return Err(ExecError::NotAllowed(command.to_string()));
        }

        let invocation = Invocation {
            executable: self.config.executable.clone(),
            command: command.to_string(),
            target: target.to_string(),
            timeout: self.config.timeout,
        };
        match tokio::spawn(invocation.run()).await {
            Ok(result) => result,
            Err(join_err) => Err(ExecError::Io {
                command: command.to_string(),
                source: std::io::Error::other(join_err),
            }),
        }
    }
}

/// One owned `mscs` run, detached from whoever asked for it.
struct Invocation {
    executable: PathBuf,
    command: String,
    target: String,
    timeout: Duration,
}

impl Invocation {
    async fn run(self) -> Result<CommandResult, ExecError> {
        let Self {
            executable,
            command,
            target,
            timeout,
        } = self;
        let io_err = |source: std::io::Error| ExecError::Io {
            command: command.clone(),
            source,
        };

        let mut cmd = Command::new(&executable);
        cmd.arg(&command);
        if !target.trim().is_empty() {
            cmd.arg(&target);
        }
        cmd.env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }

        #[cfg(unix)]
        {
            unsafe {
                cmd.pre_exec(|| {
                    // Own process group, so a timeout can take down the whole tree.
                    set_parent_death_signal()?;
                    if libc::setsid() == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        let mut child = cmd.spawn().map_err(io_err)?;
        let pgid = child.id().map(|p| p as i32);
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Both streams are drained alongside the wait; reading one to the end
        // before touching the other can stall a child that fills the other pipe.
        let drive = async {
            let (status, output, errors) =
                tokio::join!(child.wait(), read_lines(stdout), read_lines(stderr));
            Ok::<_, std::io::Error>((status?, output?, errors?))
        };

        let outcome = tokio::time::timeout(timeout, drive).await;
        match outcome {
            Ok(Ok((status, output, errors))) => {
                let exit_code = exit_code(&status);
                tracing::info!(%command, %target, exit_code, "mscs command completed");
                Ok(CommandResult {
                    exit_code,
                    output,
                    errors,
                })
            }
            Ok(Err(e)) => {
                tracing::error!(%command, %target, error = %e, "mscs command failed");
                let _ = child.kill().await;
                Err(io_err(e))
            }
            Err(_elapsed) => {
                #[cfg(unix)]
                {
                    if let Some(pgid) = pgid {
                        unsafe {
                            libc::kill(-pgid, libc::SIGKILL);
                        }
                    }
                }
                #[cfg(not(unix))]
                let _ = pgid;
                // Reap the child so nothing outlives the call.
                let _ = child.kill().await;
                tracing::error!(
                    %command,
                    %target,
                    timeout_ms = timeout.as_millis() as u64,
                    "mscs command timed out; process killed"
                );
                Err(ExecError::Timeout { command, timeout })
            }
        }
    }
}

async fn read_lines<R>(stream: Option<R>) -> std::io::Result<Vec<String>>
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return Ok(Vec::new());
    };

    let mut reader = BufReader::new(stream);
    let mut out = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        out.push(String::from_utf8_lossy(&buf).into_owned());
    }
    Ok(out)
}

#[cfg(unix)]
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(target_os = "linux")]
fn set_parent_death_signal() -> std::io::Result<()> {
    // If the agent dies mid-command, the child goes with it.
    let rc = unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(all(unix, not(target_os = "linux")))]
fn set_parent_death_signal() -> std::io::Result<()> {
    Ok(())
}
