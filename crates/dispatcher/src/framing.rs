//! Content-Length framing for debug protocol messages
//!
//! Each message is sent as `Content-Length: N\r\n\r\n` followed by `N` bytes
//! of UTF-8 JSON. Bodies are handed over as raw strings: decoding is the
//! dispatcher's job, so that a malformed body still gets a protocol answer.
use std::io::{self, BufRead, Write};
use std::time::Duration;

use crate::error::FramingError;

pub struct FramedReader<R> {
    input: R,
}

impl<R> FramedReader<R>
where
    R: BufRead,
{
    pub fn new(input: R) -> Self {
        Self { input }
    }

    /// Block until the next message body is read
    ///
    /// Returns `None` once the input is closed.
    pub fn poll_message(&mut self) -> Result<Option<String>, FramingError> {
        let mut content_length: Option<usize> = None;
        let mut line = String::new();

        loop {
            line.clear();
            match self.input.read_line(&mut line) {
                Ok(0) => return Ok(None),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    // read timeout on the underlying stream
                    std::thread::sleep(Duration::from_millis(10));
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            let header = line.trim_end();
            if header.is_empty() {
                if content_length.is_some() {
                    break;
                }
                return Err(FramingError::MissingContentLength);
            }

            match header.split_once(':') {
                Some(("Content-Length", value)) => {
                    let length = value
                        .trim()
                        .parse()
                        .map_err(|_| FramingError::MalformedContentLength)?;
                    content_length = Some(length);
                }
                _ => return Err(FramingError::UnsupportedHeader(header.to_string())),
            }
        }

        let mut content = vec![0; content_length.unwrap_or_default()];
        self.input.read_exact(content.as_mut_slice())?;
        let content = String::from_utf8(content).map_err(|_| FramingError::InvalidUtf8)?;
        tracing::debug!(%content, "received raw message");
        Ok(Some(content))
    }
}

/// Write one framed message and flush
pub fn write_message<W>(output: &mut W, body: &str) -> Result<(), FramingError>
where
    W: Write + ?Sized,
{
    write!(output, "Content-Length: {}\r\n\r\n{}", body.len(), body)?;
    output.flush()?;
    tracing::debug!(%body, "sent raw message");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::{BufReader, Cursor, Read};

    use super::*;

    const TERMINATED: &str = "Content-Length: 37\r\n\r\n{\"type\":\"event\",\"event\":\"terminated\"}";

    fn reader(input: &str) -> FramedReader<Cursor<Vec<u8>>> {
        FramedReader::new(Cursor::new(input.as_bytes().to_vec()))
    }

    #[test]
    fn single_message() -> eyre::Result<()> {
        let mut reader = reader(TERMINATED);
        assert_eq!(
            reader.poll_message()?.as_deref(),
            Some(r#"{"type":"event","event":"terminated"}"#)
        );
        assert_eq!(reader.poll_message()?, None);
        Ok(())
    }

    #[test]
    fn multiple_messages() -> eyre::Result<()> {
        let mut reader = reader(&format!("{TERMINATED}{TERMINATED}"));
        assert!(reader.poll_message()?.is_some());
        assert!(reader.poll_message()?.is_some());
        assert!(reader.poll_message()?.is_none());
        Ok(())
    }

    /// Hands out its input a few bytes at a time
    struct Trickle {
        data: Cursor<Vec<u8>>,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(3);
            self.data.read(&mut buf[..len])
        }
    }

    #[test]
    fn split_between_reads() -> eyre::Result<()> {
        let input = Trickle {
            data: Cursor::new(TERMINATED.as_bytes().to_vec()),
        };
        let mut reader = FramedReader::new(BufReader::with_capacity(4, input));
        assert_eq!(
            reader.poll_message()?.as_deref(),
            Some(r#"{"type":"event","event":"terminated"}"#)
        );
        Ok(())
    }

    #[test]
    fn unsupported_header() {
        let mut reader = reader("Content-Type: json\r\n\r\n{}");
        assert!(matches!(
            reader.poll_message(),
            Err(FramingError::UnsupportedHeader(header)) if header == "Content-Type: json"
        ));
    }

    #[test]
    fn malformed_length() {
        let mut reader = reader("Content-Length: many\r\n\r\n{}");
        assert!(matches!(
            reader.poll_message(),
            Err(FramingError::MalformedContentLength)
        ));
    }

    #[test]
    fn missing_length() {
        let mut reader = reader("\r\n{}");
        assert!(matches!(
            reader.poll_message(),
            Err(FramingError::MissingContentLength)
        ));
    }

    #[test]
    fn written_messages_read_back() -> eyre::Result<()> {
        let mut output = Vec::new();
        write_message(&mut output, r#"{"seq":0}"#)?;
        write_message(&mut output, "{}")?;
        assert_eq!(
            String::from_utf8(output.clone())?,
            "Content-Length: 9\r\n\r\n{\"seq\":0}Content-Length: 2\r\n\r\n{}"
        );

        let mut reader = FramedReader::new(Cursor::new(output));
        assert_eq!(reader.poll_message()?.as_deref(), Some(r#"{"seq":0}"#));
        assert_eq!(reader.poll_message()?.as_deref(), Some("{}"));
        Ok(())
    }
}
