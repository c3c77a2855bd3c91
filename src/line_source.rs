use std::io;
use std::io::BufRead;
use std::str;

/// Yields one logical line at a time from a byte stream.
///
/// Trailing `\n` or `\r\n` is stripped, so an empty line comes back as
/// `Ok(Some(""))` while end of stream is `Ok(None)`. Lines of any length are
/// delivered whole. The stream must be UTF-8; invalid bytes surface as an
/// [io::ErrorKind::InvalidData] error.
pub(crate) struct LineSource<R> {
    reader: io::BufReader<R>,
    buf: Vec<u8>,
}

impl<R: io::Read> LineSource<R> {
    pub(crate) fn new(inner: R) -> LineSource<R> {
        LineSource {
            reader: io::BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    /// The next line with its line terminator removed, or `None` at end of
    /// stream.
    pub(crate) fn read_line(&mut self) -> io::Result<Option<&str>> {
        self.buf.clear();
        let read = self.reader.read_until(b'\n', &mut self.buf)?;
        if read == 0 {
            return Ok(None);
        }

        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
        }
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }

        match str::from_utf8(&self.buf) {
            Ok(line) => Ok(Some(line)),
            Err(e) => Err(io::Error::new(io::ErrorKind::InvalidData, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_lines(input: &[u8]) -> Vec<String> {
        let mut source = LineSource::new(input);
        let mut lines = Vec::new();
        while let Some(line) = source.read_line().unwrap() {
            lines.push(line.to_string());
        }
        lines
    }

    #[test]
    fn lf_terminated_lines() {
        assert_eq!(vec!["a", "b"], collect_lines(b"a\nb\n"));
    }

    #[test]
    fn crlf_and_lf_mixed() {
        assert_eq!(vec!["a", "b", "c"], collect_lines(b"a\r\nb\nc\r\n"));
    }

    #[test]
    fn last_line_without_terminator() {
        assert_eq!(vec!["a", "b"], collect_lines(b"a\nb"));
    }

    #[test]
    fn empty_line_is_not_end_of_stream() {
        assert_eq!(vec!["a", "", "b"], collect_lines(b"a\n\nb\n"));
    }

    #[test]
    fn end_of_stream_is_none_repeatedly() {
        let mut source = LineSource::new(&b"a\n"[..]);
        assert_eq!(Some("a"), source.read_line().unwrap());
        assert_eq!(None, source.read_line().unwrap());
        assert_eq!(None, source.read_line().unwrap());
    }

    #[test]
    fn long_lines_are_delivered_whole() {
        let long = "x".repeat(1 << 17);
        let input = format!("{}\nshort\n", long);
        let lines = collect_lines(input.as_bytes());
        assert_eq!(2, lines.len());
        assert_eq!(long, lines[0]);
        assert_eq!("short", lines[1]);
    }

    #[test]
    fn invalid_utf8_is_an_io_error() {
        let mut source = LineSource::new(&b"\xff\xfe\n"[..]);
        let err = source.read_line().unwrap_err();
        assert_eq!(io::ErrorKind::InvalidData, err.kind());
    }
}
