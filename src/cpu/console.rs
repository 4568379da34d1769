//! Character I/O for the Input and Output instructions.
//!
//! The machine talks to the outside world one byte at a time. A
//! [`Console`] supplies those bytes; [`IoConsole`] wraps any reader and
//! writer, and [`BufferConsole`] keeps everything in memory.

use std::collections::VecDeque;
use std::io::{self, BufReader, BufWriter, Read, Stdin, Stdout, Write};

/// Byte-oriented input source and output sink.
pub trait Console {
    /// Next input byte, or `None` at end of input. May block.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;

    fn write_byte(&mut self, byte: u8) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<C: Console + ?Sized> Console for &mut C {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        (**self).read_byte()
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        (**self).write_byte(byte)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// Console over an arbitrary reader and writer.
///
/// Output is flushed before every read so that prompts appear before
/// the machine blocks waiting for input.
pub struct IoConsole<R: Read, W: Write> {
    input: R,
    output: W,
}

impl<R: Read, W: Write> IoConsole<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Give back the reader and writer.
    pub fn into_inner(self) -> (R, W) {
        (self.input, self.output)
    }
}

impl IoConsole<BufReader<Stdin>, BufWriter<Stdout>> {
    /// Console bound to the process's stdin and stdout.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), BufWriter::new(io::stdout()))
    }
}

impl<R: Read, W: Write> Console for IoConsole<R, W> {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        self.output.flush()?;
        let mut buf = [0u8; 1];
        loop {
            match self.input.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.output.write_all(&[byte])
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}

/// In-memory console: a queue of pending input and a log of output.
#[derive(Debug, Clone, Default)]
pub struct BufferConsole {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Console whose input is `input`, then end of input.
    pub fn with_input(input: impl AsRef<[u8]>) -> Self {
        Self {
            input: input.as_ref().iter().copied().collect(),
            output: Vec::new(),
        }
    }

    /// Append more pending input.
    pub fn feed(&mut self, bytes: impl AsRef<[u8]>) {
        self.input.extend(bytes.as_ref());
    }

    /// Everything written so far.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Output decoded lossily as text.
    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    /// Take the output written so far, leaving the log empty.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    pub fn pending_input(&self) -> usize {
        self.input.len()
    }
}

impl Console for BufferConsole {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.input.pop_front())
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.output.push(byte);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_console() {
        let mut console = BufferConsole::with_input("ab");
        assert_eq!(console.read_byte().unwrap(), Some(b'a'));
        assert_eq!(console.read_byte().unwrap(), Some(b'b'));
        assert_eq!(console.read_byte().unwrap(), None);

        console.write_byte(b'H').unwrap();
        console.write_byte(b'\n').unwrap();
        assert_eq!(console.output_string(), "H\n");
        assert_eq!(console.take_output(), b"H\n".to_vec());
        assert!(console.output().is_empty());
    }

    #[test]
    fn test_feed_after_eof() {
        let mut console = BufferConsole::new();
        assert_eq!(console.read_byte().unwrap(), None);
        console.feed([0xFFu8]);
        assert_eq!(console.pending_input(), 1);
        assert_eq!(console.read_byte().unwrap(), Some(0xFF));
    }

    #[test]
    fn test_io_console() {
        let input: &[u8] = b"x";
        let mut console = IoConsole::new(input, Vec::new());

        assert_eq!(console.read_byte().unwrap(), Some(b'x'));
        assert_eq!(console.read_byte().unwrap(), None);
        console.write_byte(b'!').unwrap();
        console.flush().unwrap();

        let (_, output) = console.into_inner();
        assert_eq!(output, b"!".to_vec());
    }
}
