//! Newline framing over any byte stream.
//!
//! Every transport is reduced to a `LineStream` (inbound lines, newline
//! stripped) and a `LineSink` (outbound lines, already `\n`-terminated) so the
//! endpoint loops never see sockets directly.

use std::io;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::{sink, Sink, StreamExt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Inbound lines. Ends on EOF; yields `Err` on a read failure.
pub type LineStream = BoxStream<'static, io::Result<Bytes>>;

/// Outbound lines.
pub type LineSink = Pin<Box<dyn Sink<Bytes, Error = io::Error> + Send>>;

/// Split a bidirectional byte stream into line halves.
pub fn split<S>(stream: S, max_line_bytes: usize) -> (LineStream, LineSink)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (r, w) = tokio::io::split(stream);
    (line_stream(r, max_line_bytes), line_sink(w))
}

pub fn line_stream<R>(reader: R, max_line_bytes: usize) -> LineStream
where
    R: AsyncRead + Send + Unpin + 'static,
{
    stream::unfold(BufReader::new(reader), move |mut reader| async move {
        match read_line_bounded(&mut reader, max_line_bytes).await {
            Ok(Some(line)) => Some((Ok(line), reader)),
            Ok(None) => None,
            Err(e) => Some((Err(e), reader)),
        }
    })
    .boxed()
}

pub fn line_sink<W>(writer: W) -> LineSink
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    Box::pin(sink::unfold(writer, |mut w, line: Bytes| async move {
        w.write_all(&line).await?;
        w.flush().await?;
        Ok::<_, io::Error>(w)
    }))
}

/// Read one line of at most `max` bytes (newline excluded).
///
/// Oversized lines are discarded up to their newline and reading continues
/// with the next one. A final unterminated line before EOF is returned as-is.
pub async fn read_line_bounded<R>(reader: &mut R, max: usize) -> io::Result<Option<Bytes>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let mut buf = Vec::new();
        let limit = (max as u64).saturating_add(1);
        let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
        if n == 0 {
            return Ok(None);
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
            return Ok(Some(Bytes::from(buf)));
        }
        if buf.len() <= max {
            return Ok(Some(Bytes::from(buf)));
        }

        discard_line(reader).await?;
        tracing::warn!(max_line_bytes = max, "oversized line discarded");
    }
}

async fn discard_line<R>(reader: &mut R) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let (done, used) = {
            let buf = reader.fill_buf().await?;
            if buf.is_empty() {
                return Ok(());
            }
            match buf.iter().position(|b| *b == b'\n') {
                Some(i) => (true, i + 1),
                None => (false, buf.len()),
            }
        };
        reader.consume(used);
        if done {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::SinkExt;

    #[tokio::test]
    async fn splits_on_newline_and_strips_crlf() {
        let input: &[u8] = b"one\r\ntwo\nthree";
        let mut lines = line_stream(input, 64);
        assert_eq!(lines.next().await.unwrap().unwrap(), Bytes::from_static(b"one"));
        assert_eq!(lines.next().await.unwrap().unwrap(), Bytes::from_static(b"two"));
        assert_eq!(lines.next().await.unwrap().unwrap(), Bytes::from_static(b"three"));
        assert!(lines.next().await.is_none());
    }

    #[tokio::test]
    async fn oversized_line_is_skipped_not_fatal() {
        let mut input = vec![b'x'; 100];
        input.extend_from_slice(b"\nok\n");
        let mut lines = line_stream(std::io::Cursor::new(input), 16);
        assert_eq!(lines.next().await.unwrap().unwrap(), Bytes::from_static(b"ok"));
        assert!(lines.next().await.is_none());
    }

    #[tokio::test]
    async fn line_of_exactly_max_is_kept() {
        let input: &[u8] = b"abcd\nabcde\nz\n";
        let mut lines = line_stream(input, 4);
        assert_eq!(lines.next().await.unwrap().unwrap(), Bytes::from_static(b"abcd"));
        assert_eq!(lines.next().await.unwrap().unwrap(), Bytes::from_static(b"z"));
    }

    #[tokio::test]
    async fn sink_writes_lines_in_order() {
        let (a, b) = tokio::io::duplex(256);
        let (_ignored, mut sink) = split(a, 64);
        sink.send(Bytes::from_static(b"hello\n")).await.unwrap();
        sink.send(Bytes::from_static(b"world\n")).await.unwrap();
        drop(sink);

        let mut lines = line_stream(b, 64);
        assert_eq!(lines.next().await.unwrap().unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(lines.next().await.unwrap().unwrap(), Bytes::from_static(b"world"));
    }
}
