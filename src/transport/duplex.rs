//! Line-based chat over a bidirectional byte stream.
//!
//! Wire format: UTF-8 text lines terminated by `\n`, nothing else. The read
//! loop displays every received line that carries text; the write loop sends
//! operator input lines.

use crate::utils::{Console, Result, SessionError};
use futures::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Line delimiter on the wire
pub const DELIMITER: char = '\n';

/// Read lines from the stream and display them until the stream fails
///
/// Lines that are empty or consist solely of the delimiter are not shown.
/// Always ends with an error: [`SessionError::StreamClosed`] at end of
/// stream, [`SessionError::ReadFailed`] otherwise.
pub async fn read_loop<R>(reader: &mut R, console: &Console) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| SessionError::ReadFailed {
                reason: e.to_string(),
            })?;

        if read == 0 {
            return Err(SessionError::StreamClosed.into());
        }

        if let Some(text) = displayable(&line) {
            console.message(text);
        }
    }
}

/// Send operator input lines to the stream until input or the stream fails
///
/// Each line gets a delimiter appended and is flushed immediately. Ends with
/// [`SessionError::InputClosed`] when operator input is exhausted and
/// [`SessionError::WriteFailed`] when writing or flushing fails.
pub async fn write_loop<W>(writer: &mut W, console: &Console) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = console.read_line().await {
        let data = format!("{line}{DELIMITER}");

        writer
            .write_all(data.as_bytes())
            .await
            .map_err(write_failed)?;
        writer.flush().await.map_err(write_failed)?;
    }

    Err(SessionError::InputClosed.into())
}

fn write_failed(e: std::io::Error) -> SessionError {
    SessionError::WriteFailed {
        reason: e.to_string(),
    }
}

/// The text of a received line worth showing, without its delimiter
fn displayable(line: &str) -> Option<&str> {
    if line.is_empty() || line == "\n" {
        return None;
    }
    Some(line.strip_suffix(DELIMITER).unwrap_or(line))
}
