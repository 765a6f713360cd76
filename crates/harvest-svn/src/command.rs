//! svn command execution abstraction

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use harvest_core::{HarvestError, Result, SvnConfig};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, instrument};

const CHUNK_SIZE: usize = 8 * 1024;
const MOCK_PIPE_CAPACITY: usize = 64 * 1024;

/// How a finished process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code; `None` when the process was terminated by a signal
    pub code: Option<i32>,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl std::fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit status: {}", code),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// Combined output of a completed svn command
#[derive(Debug, Clone)]
pub struct SvnOutput {
    /// stdout and stderr interleaved in arrival order
    pub output: Vec<u8>,
    pub status: ExitOutcome,
}

impl SvnOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Output as text, lossily decoded
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type ExitFuture = BoxFuture<'static, io::Result<ExitOutcome>>;

/// A started svn process with its output streams
pub struct SvnProcess {
    pub stdout: BoxedReader,
    pub stderr: BoxedReader,
    /// Resolves once the process has exited
    pub exit: ExitFuture,
}

impl std::fmt::Debug for SvnProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SvnProcess").finish_non_exhaustive()
    }
}

/// Trait for executing svn commands (allows mocking in tests)
#[async_trait]
pub trait SvnExecutor: Send + Sync {
    /// Run a command to completion and capture its combined output.
    ///
    /// A non-zero exit is not an error here; callers inspect
    /// [`SvnOutput::status`] so the tool's diagnostics are kept.
    async fn exec(&self, args: &[&str]) -> Result<SvnOutput>;

    /// Start a command and hand back its live output streams
    async fn spawn(&self, args: &[&str]) -> Result<SvnProcess>;
}

/// Real svn command executor
#[derive(Debug, Clone)]
pub struct SvnCommand {
    program: String,
    global_args: Vec<String>,
}

impl Default for SvnCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl SvnCommand {
    /// Executor running `svn` from `PATH`
    pub fn new() -> Self {
        Self {
            program: "svn".to_string(),
            global_args: Vec::new(),
        }
    }

    pub fn from_config(config: &SvnConfig) -> Self {
        Self {
            program: config.program.clone(),
            global_args: config.global_args.clone(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Options placed before every subcommand
    pub fn with_global_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.global_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl SvnExecutor for SvnCommand {
    #[instrument(skip(self), fields(program = %self.program))]
    async fn exec(&self, args: &[&str]) -> Result<SvnOutput> {
        let SvnProcess {
            mut stdout,
            mut stderr,
            exit,
        } = self.spawn(args).await?;

        let mut output = Vec::new();
        let (pumped, status) = tokio::join!(
            pump(&mut stdout, &mut stderr, &mut output, None),
            exit
        );
        pumped?;
        let status = status?;

        if !status.success() {
            debug!("svn command failed with {}", status);
        }

        Ok(SvnOutput { output, status })
    }

    #[instrument(skip(self), fields(program = %self.program))]
    async fn spawn(&self, args: &[&str]) -> Result<SvnProcess> {
        debug!("Executing {} {:?}", self.program, args);

        let mut child = Command::new(&self.program)
            .args(&self.global_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HarvestError::Svn(format!("Failed to execute {}: {}", self.program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarvestError::Svn("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| HarvestError::Svn("stderr was not captured".to_string()))?;

        let exit = async move { child.wait().await.map(ExitOutcome::from) }.boxed();

        Ok(SvnProcess {
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            exit,
        })
    }
}

/// Copy a process's stdout and stderr into `sink` in arrival order.
///
/// stdout chunks are also written to `tee` when given. Both streams are
/// drained to EOF even after the sink or tee fails, and a read error only
/// closes the stream it came from, so the child never stalls on a full
/// pipe. The first read error, else the first sink error, is returned at
/// the end.
pub(crate) async fn pump<O, E, W>(
    stdout: &mut O,
    stderr: &mut E,
    sink: &mut W,
    mut tee: Option<&mut (dyn AsyncWrite + Send + Unpin)>,
) -> io::Result<()>
where
    O: AsyncRead + Unpin + ?Sized,
    E: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut out_buf = vec![0u8; CHUNK_SIZE];
    let mut err_buf = vec![0u8; CHUNK_SIZE];
    let mut out_open = true;
    let mut err_open = true;
    let mut sink_error: Option<io::Error> = None;
    let mut read_error: Option<io::Error> = None;

    while out_open || err_open {
        tokio::select! {
            read = stdout.read(&mut out_buf), if out_open => {
                let n = match read {
                    Ok(0) => {
                        out_open = false;
                        continue;
                    }
                    Ok(n) => n,
                    Err(e) => {
                        debug!("stdout read failed: {}", e);
                        read_error.get_or_insert(e);
                        out_open = false;
                        continue;
                    }
                };
                let chunk = &out_buf[..n];
                forward(sink, chunk, &mut sink_error).await;

                let tee_failed = match tee.as_deref_mut() {
                    Some(writer) => writer.write_all(chunk).await.is_err(),
                    None => false,
                };
                if tee_failed {
                    debug!("tee reader went away, mirroring to sink only");
                    tee = None;
                }
            }
            read = stderr.read(&mut err_buf), if err_open => {
                let n = match read {
                    Ok(0) => {
                        err_open = false;
                        continue;
                    }
                    Ok(n) => n,
                    Err(e) => {
                        debug!("stderr read failed: {}", e);
                        read_error.get_or_insert(e);
                        err_open = false;
                        continue;
                    }
                };
                forward(sink, &err_buf[..n], &mut sink_error).await;
            }
        }
    }

    if let Some(e) = read_error.or(sink_error) {
        return Err(e);
    }
    sink.flush().await
}

async fn forward<W>(sink: &mut W, chunk: &[u8], error: &mut Option<io::Error>)
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if error.is_some() {
        return;
    }
    if let Err(e) = sink.write_all(chunk).await {
        debug!("sink write failed: {}", e);
        *error = Some(e);
    }
}

/// Scripted process handed out by [`MockSvnExecutor::spawn`]
struct MockProcess {
    feed: mpsc::UnboundedReceiver<Vec<u8>>,
    stderr: Vec<u8>,
    code: i32,
}

/// Feeds stdout to a live mock process; dropping it ends the process
#[derive(Debug, Clone)]
pub struct ProcessFeed {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ProcessFeed {
    /// Write a chunk to the process's stdout. Returns false once the
    /// process output is no longer being read.
    pub fn send(&self, chunk: impl Into<Vec<u8>>) -> bool {
        self.tx.send(chunk.into()).is_ok()
    }

    /// Close stdout and let the process exit
    pub fn finish(self) {}
}

/// Mock svn executor for testing
#[derive(Clone, Default)]
pub struct MockSvnExecutor {
    responses: HashMap<String, SvnOutput>,
    processes: Arc<Mutex<HashMap<String, VecDeque<MockProcess>>>>,
}

impl MockSvnExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canned result for `exec` with the space-joined arguments `command`
    pub fn with_response(mut self, command: &str, output: SvnOutput) -> Self {
        self.responses.insert(command.to_string(), output);
        self
    }

    pub fn with_output(self, command: &str, output: impl Into<Vec<u8>>, code: i32) -> Self {
        self.with_response(
            command,
            SvnOutput {
                output: output.into(),
                status: ExitOutcome { code: Some(code) },
            },
        )
    }

    /// Canned process for `spawn` whose stdout is written in one go
    pub fn with_process(
        self,
        command: &str,
        stdout: impl Into<Vec<u8>>,
        stderr: impl Into<Vec<u8>>,
        code: i32,
    ) -> Self {
        let (tx, feed) = mpsc::unbounded_channel();
        let _ = tx.send(stdout.into());
        self.push_process(
            command,
            MockProcess {
                feed,
                stderr: stderr.into(),
                code,
            },
        );
        self
    }

    /// Process for `spawn` whose stdout is fed by the returned handle.
    /// It keeps running until the feed is dropped.
    pub fn with_live_process(
        self,
        command: &str,
        stderr: impl Into<Vec<u8>>,
        code: i32,
    ) -> (Self, ProcessFeed) {
        let (tx, feed) = mpsc::unbounded_channel();
        self.push_process(
            command,
            MockProcess {
                feed,
                stderr: stderr.into(),
                code,
            },
        );
        (self, ProcessFeed { tx })
    }

    fn push_process(&self, command: &str, process: MockProcess) {
        let mut processes = self
            .processes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        processes
            .entry(command.to_string())
            .or_default()
            .push_back(process);
    }
}

#[async_trait]
impl SvnExecutor for MockSvnExecutor {
    async fn exec(&self, args: &[&str]) -> Result<SvnOutput> {
        let key = args.join(" ");
        self.responses
            .get(&key)
            .cloned()
            .ok_or_else(|| HarvestError::Svn(format!("No mock response for: {}", key)))
    }

    async fn spawn(&self, args: &[&str]) -> Result<SvnProcess> {
        let key = args.join(" ");
        let process = {
            let mut processes = self
                .processes
                .lock()
                .map_err(|_| HarvestError::Svn("mock process table poisoned".to_string()))?;
            processes.get_mut(&key).and_then(VecDeque::pop_front)
        }
        .ok_or_else(|| HarvestError::Svn(format!("No mock process for: {}", key)))?;

        let MockProcess {
            mut feed,
            stderr,
            code,
        } = process;
        let (mut writer, reader) = tokio::io::duplex(MOCK_PIPE_CAPACITY);

        let producer = tokio::spawn(async move {
            while let Some(chunk) = feed.recv().await {
                if writer.write_all(&chunk).await.is_err() {
                    break;
                }
            }
        });

        let exit = async move {
            producer
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            Ok(ExitOutcome { code: Some(code) })
        }
        .boxed();

        Ok(SvnProcess {
            stdout: Box::new(reader),
            stderr: Box::new(io::Cursor::new(stderr)),
            exit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_executor() {
        let executor = MockSvnExecutor::new().with_output(
            "list -R --xml https://example/repo/trunk",
            "<lists/>",
            0,
        );

        let output = executor
            .exec(&["list", "-R", "--xml", "https://example/repo/trunk"])
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.text(), "<lists/>");
    }

    #[tokio::test]
    async fn test_mock_executor_missing_response() {
        let executor = MockSvnExecutor::new();
        let err = executor.exec(&["info"]).await.unwrap_err();
        assert!(err.to_string().contains("No mock response for: info"));
    }

    #[tokio::test]
    async fn test_mock_process_streams_and_exits() {
        let executor = MockSvnExecutor::new().with_process("export a b", "A b/x\n", "warn\n", 1);

        let SvnProcess {
            mut stdout,
            mut stderr,
            exit,
        } = executor.spawn(&["export", "a", "b"]).await.unwrap();

        let mut sink = Vec::new();
        let (pumped, status) = tokio::join!(pump(&mut stdout, &mut stderr, &mut sink, None), exit);
        pumped.unwrap();
        let status = status.unwrap();

        assert!(!status.success());
        assert_eq!(status.to_string(), "exit status: 1");
        let text = String::from_utf8(sink).unwrap();
        assert!(text.contains("A b/x\n"));
        assert!(text.contains("warn\n"));

        // Each canned process is handed out once
        assert!(executor.spawn(&["export", "a", "b"]).await.is_err());
    }

    #[tokio::test]
    async fn test_pump_tees_stdout_only() {
        let mut stdout = io::Cursor::new(b"out line\n".to_vec());
        let mut stderr = io::Cursor::new(b"err line\n".to_vec());
        let mut sink = Vec::new();
        let mut tee = Vec::new();

        pump(
            &mut stdout,
            &mut stderr,
            &mut sink,
            Some(&mut tee as &mut (dyn AsyncWrite + Send + Unpin)),
        )
        .await
        .unwrap();

        assert_eq!(tee, b"out line\n");
        assert_eq!(sink.len(), b"out line\nerr line\n".len());
    }

    /// Reader that fails on its first read
    struct FailingReader;

    impl AsyncRead for FailingReader {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<io::Result<()>> {
            std::task::Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "stdout broke")))
        }
    }

    #[tokio::test]
    async fn test_pump_drains_stderr_after_stdout_read_error() {
        let mut stdout = FailingReader;
        // More than one chunk, so a single read would leave data behind
        let diagnostics = vec![b'e'; CHUNK_SIZE * 3];
        let mut stderr = io::Cursor::new(diagnostics.clone());
        let mut sink = Vec::new();

        let err = pump(&mut stdout, &mut stderr, &mut sink, None)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "stdout broke");
        assert_eq!(sink, diagnostics);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_real_command_captures_combined_output() {
        let executor = SvnCommand::new().with_program("sh");
        let output = executor
            .exec(&["-c", "echo to-stdout; echo to-stderr 1>&2; exit 3"])
            .await
            .unwrap();

        assert!(!output.success());
        assert_eq!(output.status.code, Some(3));
        let text = output.text();
        assert!(text.contains("to-stdout"));
        assert!(text.contains("to-stderr"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_real_command_prepends_global_args() {
        let executor = SvnCommand::new()
            .with_program("sh")
            .with_global_args(["-c"]);
        let output = executor.exec(&["echo global"]).await.unwrap();

        assert!(output.success());
        assert_eq!(output.text(), "global\n");
    }

    #[tokio::test]
    async fn test_launch_failure_is_error() {
        let executor = SvnCommand::new().with_program("svnharvest-no-such-program");
        let err = executor.exec(&["list"]).await.unwrap_err();

        assert!(matches!(err, HarvestError::Svn(_)));
        assert!(err.to_string().contains("svnharvest-no-such-program"));
    }
}
