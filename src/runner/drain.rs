//! Line-oriented stream drainers.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::warn;

/// Per-stream settings for [`drain_lines`].
#[derive(Clone, Copy, Debug)]
pub(super) struct DrainOptions {
    stream: &'static str,
    capture: bool,
}

impl DrainOptions {
    pub(super) const fn new(stream: &'static str, capture: bool) -> Self {
        Self { stream, capture }
    }
}

/// Reads `reader` to end of file one line at a time.
///
/// Each line is written to `sink` as soon as it arrives. When capture is
/// enabled the line text is appended to the returned buffer followed by a
/// single `\n`. A failing sink is dropped with a warning and reading
/// continues, so the child never blocks on a full pipe.
pub(super) async fn drain_lines<R, W>(
    reader: R,
    mut sink: Option<W>,
    options: DrainOptions,
) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let mut captured = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }

        if let Some(out) = sink.as_mut()
            && let Err(err) = forward_line(out, &line).await
        {
            warn!(
                stream = options.stream,
                error = %err,
                "forwarding child output failed; discarding the rest of this stream"
            );
            sink = None;
        }

        if options.capture {
            captured.extend_from_slice(line_text(&line));
            captured.push(b'\n');
        }
    }

    Ok(captured)
}

async fn forward_line<W>(sink: &mut W, line: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    sink.write_all(line).await?;
    if !line.ends_with(b"\n") {
        sink.write_all(b"\n").await?;
    }
    sink.flush().await
}

/// Strips the line terminator (`\n` or `\r\n`) from a raw line.
fn line_text(line: &[u8]) -> &[u8] {
    let without_lf = line.strip_suffix(b"\n").unwrap_or(line);
    without_lf.strip_suffix(b"\r").unwrap_or(without_lf)
}

/// Converts a capture buffer to text, dropping one trailing newline.
pub(super) fn finish_capture(captured: &[u8]) -> String {
    let text = String::from_utf8_lossy(captured);
    text.strip_suffix('\n').unwrap_or(&text).to_owned()
}
