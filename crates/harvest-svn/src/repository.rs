//! Repository façade over the svn command line
//!
//! A [`Repository`] is bound to one base location and runs `list`, `log`
//! and `export` against paths relative to it. It holds no mutable state and
//! can be shared between tasks.

use harvest_core::{Entry, ExportSummary, HarvestError, LogElement, Result};
use std::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::instrument::WithSubscriber;
use tracing::{debug, dispatcher, info, warn, Dispatch};

use crate::command::{SvnCommand, SvnExecutor, SvnOutput};
use crate::decode::{decode_list, decode_log};
use crate::export::run_export;
use crate::validate::{validate_location, validate_operand, validate_revision};

/// A (possibly remote) svn repository, usually the parent of the
/// `trunk/`, `tags/` and `branches/` layout
pub struct Repository<E: SvnExecutor = SvnCommand> {
    location: String,
    executor: E,
    dispatch: Dispatch,
}

impl<E: SvnExecutor> std::fmt::Debug for Repository<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("location", &self.location)
            .field("executor", &"<SvnExecutor>")
            .finish()
    }
}

impl Repository<SvnCommand> {
    /// Repository driven by `svn` from `PATH`
    pub fn new(location: impl Into<String>) -> Result<Self> {
        Self::with_executor(location, SvnCommand::new())
    }
}

impl<E: SvnExecutor> Repository<E> {
    /// Repository driven by the given executor.
    ///
    /// Log events go to the subscriber that is current at construction;
    /// use [`Repository::with_dispatch`] to choose another.
    pub fn with_executor(location: impl Into<String>, executor: E) -> Result<Self> {
        let location = location.into();
        validate_location(&location)?;

        Ok(Self {
            location,
            executor,
            dispatch: dispatcher::get_default(Dispatch::clone),
        })
    }

    /// Send this repository's log events to `dispatch`
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// `location/relpath`, joined literally.
    ///
    /// No normalization happens: an empty `relpath` leaves a trailing slash
    /// and a location ending in `/` gives a double slash. The tool receives
    /// exactly this string.
    pub fn full_path(&self, relpath: &str) -> String {
        format!("{}/{}", self.location, relpath)
    }

    /// Recursively list `relpath` (`svn list -R --xml`).
    ///
    /// The raw XML (or the tool's diagnostic) is copied to `sink`; pass
    /// `tokio::io::sink()` to discard it.
    pub async fn list<W>(&self, relpath: &str, sink: &mut W) -> Result<Vec<Entry>>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        self.list_inner(relpath, sink)
            .with_subscriber(self.dispatch.clone())
            .await
    }

    /// Verbose, quiet history of `relpath` (`svn log -v -q --xml`)
    pub async fn log<W>(&self, relpath: &str, sink: &mut W) -> Result<LogElement>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        self.log_inner(relpath, sink, None)
            .with_subscriber(self.dispatch.clone())
            .await
    }

    /// History of `relpath` restricted to `-r first:last`
    pub async fn log_by_range<W>(
        &self,
        relpath: &str,
        sink: &mut W,
        first: &str,
        last: &str,
    ) -> Result<LogElement>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        self.log_inner(relpath, sink, Some((first, last)))
            .with_subscriber(self.dispatch.clone())
            .await
    }

    /// Export `relpath` into the local directory `into`.
    ///
    /// stdout and stderr of the tool are mirrored to `sink` while it runs.
    /// Each exported file is sent on `notifier` as soon as the tool reports
    /// it; the channel is closed when the export output ends. Keep receiving
    /// until it closes, or a bounded channel will stall the export.
    pub async fn export<W>(
        &self,
        relpath: &str,
        into: impl AsRef<Path>,
        sink: &mut W,
        notifier: mpsc::Sender<String>,
    ) -> Result<ExportSummary>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let into = into.as_ref();
        let into = into.to_str().ok_or_else(|| {
            HarvestError::InvalidArgument(format!(
                "export destination is not valid UTF-8: {}",
                into.display()
            ))
        })?;
        self.export_inner(relpath, into, sink, notifier)
            .with_subscriber(self.dispatch.clone())
            .await
    }

    async fn list_inner<W>(&self, relpath: &str, sink: &mut W) -> Result<Vec<Entry>>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        info!(path = relpath, "listing");
        let full_path = self.full_path(relpath);

        let xml = self
            .run("list", &full_path, &["list", "-R", "--xml", full_path.as_str()], sink)
            .await?;
        Ok(decode_list(&xml)?.into_entries())
    }

    async fn log_inner<W>(
        &self,
        relpath: &str,
        sink: &mut W,
        range: Option<(&str, &str)>,
    ) -> Result<LogElement>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let full_path = self.full_path(relpath);

        let xml = match range {
            Some((first, last)) => {
                info!(path = relpath, first, last, "reading ranged log");
                let range = format!("{}:{}", validate_revision(first)?, validate_revision(last)?);
                self.run(
                    "get log for",
                    &full_path,
                    &["log", "-v", "-q", "-r", range.as_str(), "--xml", full_path.as_str()],
                    sink,
                )
                .await?
            }
            None => {
                info!(path = relpath, "reading log");
                self.run(
                    "get log for",
                    &full_path,
                    &["log", "-v", "-q", "--xml", full_path.as_str()],
                    sink,
                )
                .await?
            }
        };

        decode_log(&xml)
    }

    async fn export_inner<W>(
        &self,
        relpath: &str,
        into: &str,
        sink: &mut W,
        notifier: mpsc::Sender<String>,
    ) -> Result<ExportSummary>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        info!(path = relpath, into, "exporting");
        validate_operand(into, "export destination")?;
        let full_path = self.full_path(relpath);

        let args = ["export", full_path.as_str(), into];
        debug!(command = %args.join(" "), "executing");

        let process = self
            .executor
            .spawn(&args)
            .await
            .map_err(|e| execution_error("export", &full_path, e.to_string(), String::new()))?;

        let (status, summary) = run_export(process, sink, notifier)
            .await
            .map_err(|e| match e {
                HarvestError::Io(e) => {
                    execution_error("export", &full_path, e.to_string(), String::new())
                }
                other => other,
            })?;

        if !status.success() {
            warn!(path = %full_path, %status, files = summary.files, "export failed");
            // The output already went to the sink as it streamed
            return Err(execution_error(
                "export",
                &full_path,
                status.to_string(),
                String::new(),
            ));
        }

        info!(files = summary.files, revision = ?summary.revision, "export complete");
        Ok(summary)
    }

    /// Run a buffered command, mirror its output to `sink` and turn a
    /// failed exit into an execution error carrying that output
    async fn run<W>(
        &self,
        operation: &str,
        full_path: &str,
        args: &[&str],
        sink: &mut W,
    ) -> Result<Vec<u8>>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        debug!(command = %args.join(" "), "executing");

        let output = self
            .executor
            .exec(args)
            .await
            .map_err(|e| execution_error(operation, full_path, e.to_string(), String::new()))?;

        let mirrored = mirror(sink, &output).await;

        if !output.success() {
            warn!(path = full_path, status = %output.status, "svn {} failed", args[0]);
            return Err(execution_error(
                operation,
                full_path,
                output.status.to_string(),
                output.text(),
            ));
        }

        mirrored?;
        Ok(output.output)
    }
}

async fn mirror<W>(sink: &mut W, output: &SvnOutput) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    sink.write_all(&output.output).await?;
    sink.flush().await
}

fn execution_error(operation: &str, path: &str, message: String, output: String) -> HarvestError {
    HarvestError::Execution {
        operation: operation.to_string(),
        path: path.to_string(),
        message,
        output,
    }
}
