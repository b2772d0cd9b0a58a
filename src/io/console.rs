use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::rc::Rc;

use log::warn;

use super::IoDevice;

/// Input port: every read blocks until one byte arrives from the stream.
/// End of stream reads as 0. Writes are ignored.
pub struct ConsoleIn<R: Read> {
    input: R,
    at_eof: bool,
}

impl<R: Read> ConsoleIn<R> {
    pub fn new(input: R) -> Self {
        ConsoleIn {
            input,
            at_eof: false,
        }
    }
}

impl<R: Read> IoDevice for ConsoleIn<R> {
    fn read(&mut self, addr: u16) -> u8 {
        let mut buf = [0u8; 1];
        loop {
            match self.input.read(&mut buf) {
                Ok(1) => return buf[0],
                Ok(_) => {
                    if !self.at_eof {
                        warn!("console input at ${:04X} reached end of stream", addr);
                        self.at_eof = true;
                    }
                    return 0;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("console input at ${:04X} failed: {}", addr, e);
                    return 0;
                }
            }
        }
    }

    fn write(&mut self, _addr: u16, _value: u8) {}
}

/// Output port: every write emits one byte and flushes. Reads return 0.
pub struct ConsoleOut<W: Write> {
    output: W,
}

impl<W: Write> ConsoleOut<W> {
    pub fn new(output: W) -> Self {
        ConsoleOut { output }
    }
}

impl<W: Write> IoDevice for ConsoleOut<W> {
    fn read(&mut self, _addr: u16) -> u8 {
        0
    }

    fn write(&mut self, addr: u16, value: u8) {
        if let Err(e) = self
            .output
            .write_all(&[value])
            .and_then(|_| self.output.flush())
        {
            warn!("console output at ${:04X} failed: {}", addr, e);
        }
    }
}

/// Shared in-memory sink. Clones see the same buffer, so one clone can be
/// handed to a `ConsoleOut` while another inspects what was written.
#[derive(Clone, Default, Debug)]
pub struct Capture {
    buf: Rc<RefCell<Vec<u8>>>,
}

impl Capture {
    pub fn new() -> Self {
        Capture::default()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.buf.borrow().clone()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.buf.borrow()).into_owned()
    }
}

impl Write for Capture {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.borrow_mut().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_console_in_reads_one_byte_per_access() {
        let mut console = ConsoleIn::new(&b"hi"[..]);
        assert_eq!(console.read(0xD010), b'h');
        assert_eq!(console.read(0xD010), b'i');
        assert_eq!(console.read(0xD010), 0);
        assert_eq!(console.read(0xD010), 0);
    }

    #[test]
    fn test_console_out_emits_bytes() {
        let capture = Capture::new();
        let mut console = ConsoleOut::new(capture.clone());
        console.write(0xD020, b'O');
        console.write(0xD020, b'K');
        assert_eq!(console.read(0xD020), 0);
        assert_eq!(capture.text(), "OK");
    }
}
