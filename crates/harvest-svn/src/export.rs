//! Export notification pipeline
//!
//! While `svn export` runs, its stdout is fanned out: one copy goes to the
//! caller's sink, the other through an in-memory pipe to a background task
//! that turns `A <path>` lines into notifications as they arrive.
//!
//! ```text
//!   child stdout ──► pump ──► sink
//!                      └────► pipe ──► export_notifier ──► mpsc::Sender<String>
//!   child stderr ──► pump ──► sink
//! ```

use harvest_core::{ExportSummary, HarvestError, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;
use tracing::instrument::{Instrument, WithSubscriber};
use tracing::{debug, warn};

use crate::command::{pump, ExitOutcome, SvnProcess};

/// Buffer between the pump and the notifier task
const PIPE_CAPACITY: usize = 64 * 1024;

/// Classification of one line of `svn export` output
#[derive(Debug, PartialEq, Eq)]
enum ExportLine<'a> {
    /// `A    <path>`
    Added(&'a str),
    /// `Exported revision N.`
    Revision(&'a str),
    Ignored,
}

fn parse_line(line: &str) -> ExportLine<'_> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    match *fields.as_slice() {
        ["A", file] => ExportLine::Added(file),
        ["Exported", "revision", rev] => ExportLine::Revision(rev.trim_end_matches('.')),
        _ => ExportLine::Ignored,
    }
}

/// Publish every exported file reported on `reader` to `notifier`.
///
/// Runs until `reader` reaches EOF, then drops `notifier`, which closes
/// the channel. If the receiver goes away early the rest of the stream is
/// still drained so the writer side never blocks.
pub async fn export_notifier<R>(reader: R, notifier: mpsc::Sender<String>) -> ExportSummary
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let mut summary = ExportSummary::default();
    let mut listening = true;

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Reading export output failed: {}", e);
                break;
            }
        }

        let text = String::from_utf8_lossy(&line);
        match parse_line(&text) {
            ExportLine::Added(file) => {
                if !listening {
                    continue;
                }
                if notifier.send(file.to_string()).await.is_ok() {
                    summary.files += 1;
                } else {
                    debug!("Notification receiver dropped, draining export output");
                    listening = false;
                }
            }
            ExportLine::Revision(rev) => summary.revision = Some(rev.to_string()),
            ExportLine::Ignored => debug!("Ignoring export line {:?}", text.trim_end()),
        }
    }

    summary
}

/// Drive a started export to completion.
///
/// Returns only after the process has exited, its output has been mirrored,
/// the pipe has been closed and the notifier has drained it. A failed
/// process still gets every notification that preceded the failure.
pub(crate) async fn run_export<W>(
    process: SvnProcess,
    sink: &mut W,
    notifier: mpsc::Sender<String>,
) -> Result<(ExitOutcome, ExportSummary)>
where
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let SvnProcess {
        mut stdout,
        mut stderr,
        exit,
    } = process;

    let (mut pipe_writer, pipe_reader) = tokio::io::duplex(PIPE_CAPACITY);
    let scanner = tokio::spawn(
        export_notifier(pipe_reader, notifier)
            .in_current_span()
            .with_current_subscriber(),
    );

    let (pumped, status) = tokio::join!(
        pump(
            &mut stdout,
            &mut stderr,
            sink,
            Some(&mut pipe_writer as &mut (dyn AsyncWrite + Send + Unpin)),
        ),
        exit
    );

    // The only close of the write half; the scanner sees EOF after this.
    drop(pipe_writer);
    let summary = scanner
        .await
        .map_err(|e| HarvestError::Notifier(e.to_string()))?;

    let status = status?;
    match pumped {
        Err(e) if status.success() => return Err(e.into()),
        Err(e) => warn!("Export output could not be mirrored: {}", e),
        Ok(()) => {}
    }

    Ok((status, summary))
}
