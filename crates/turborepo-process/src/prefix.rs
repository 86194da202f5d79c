//! Prepends a label to every line written through it, so a task's captured
//! stdout/stderr reads as `<pkg>:<task>: <line>` in the persisted log instead
//! of as an unattributed blob of bytes.

use std::io::{self, Write};

/// Wraps a writer, inserting `prefix` after every `\n` (and once before the
/// first byte). An empty prefix makes this a transparent passthrough, and
/// `group` frames the whole stream between GitHub Actions
/// `::group::`/`::endgroup::` markers.
pub struct PrefixedWriter<W> {
    inner: W,
    prefix: String,
    group: bool,
    at_line_start: bool,
    group_opened: bool,
}

impl<W: Write> PrefixedWriter<W> {
    pub fn new(inner: W, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
            group: false,
            at_line_start: true,
            group_opened: false,
        }
    }

    /// Frame output between `::group::<prefix>` / `::endgroup::` markers, as
    /// GitHub Actions logs expect for collapsible per-task sections.
    pub fn with_github_group(mut self) -> Self {
        self.group = true;
        self
    }

    fn open_group(&mut self) -> io::Result<()> {
        if self.group && !self.group_opened {
            writeln!(self.inner, "::group::{}", self.prefix.trim_end())?;
            self.group_opened = true;
        }
        Ok(())
    }

    /// Closes the GitHub Actions group marker, if one was opened. Call once
    /// the task has finished writing.
    pub fn finish(mut self) -> io::Result<W> {
        if self.group_opened {
            writeln!(self.inner, "::endgroup::")?;
        }
        Ok(self.inner)
    }
}

impl<W: Write> Write for PrefixedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.open_group()?;

        for line in split_inclusive(buf) {
            if self.at_line_start && !self.prefix.is_empty() {
                self.inner.write_all(self.prefix.as_bytes())?;
            }
            self.inner.write_all(line)?;
            self.at_line_start = line.last() == Some(&b'\n');
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Splits `buf` into chunks each ending in `\n` (the last may not).
fn split_inclusive(buf: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut rest = buf;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let split_at = rest.iter().position(|&b| b == b'\n').map(|i| i + 1);
        match split_at {
            Some(i) => {
                let (line, remainder) = rest.split_at(i);
                rest = remainder;
                Some(line)
            }
            None => {
                let line = rest;
                rest = &[];
                Some(line)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_each_line() {
        let mut out = Vec::new();
        {
            let mut writer = PrefixedWriter::new(&mut out, "pkg:build: ");
            writer.write_all(b"line one\nline two\n").unwrap();
        }
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "pkg:build: line one\npkg:build: line two\n"
        );
    }

    #[test]
    fn handles_writes_split_mid_line() {
        let mut out = Vec::new();
        {
            let mut writer = PrefixedWriter::new(&mut out, "p: ");
            writer.write_all(b"hel").unwrap();
            writer.write_all(b"lo\nworld\n").unwrap();
        }
        assert_eq!(String::from_utf8(out).unwrap(), "p: hello\np: world\n");
    }

    #[test]
    fn empty_prefix_is_passthrough() {
        let mut out = Vec::new();
        {
            let mut writer = PrefixedWriter::new(&mut out, "");
            writer.write_all(b"raw\n").unwrap();
        }
        assert_eq!(String::from_utf8(out).unwrap(), "raw\n");
    }

    #[test]
    fn github_group_frames_output() {
        let mut out = Vec::new();
        {
            let writer = PrefixedWriter::new(&mut out, "pkg:build: ").with_github_group();
            let mut writer = writer;
            writer.write_all(b"building\n").unwrap();
            writer.finish().unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("::group::pkg:build:\n"));
        assert!(text.ends_with("::endgroup::\n"));
    }
}
