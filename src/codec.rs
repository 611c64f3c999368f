/// Position inside the current line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LineState {
    /// Next byte starts a line
    Start,
    /// Inside a line
    Middle,
    /// Last byte was a CR
    CarriageReturn,
}

/// The codec used for transparency
///
/// Line endings are normalised to CRLF and every line starting with a dot gets
/// a second one, so the payload can never contain the end-of-data marker.
/// State is kept across calls: a message may be fed in arbitrary chunks.
#[derive(Clone, Copy, Debug)]
pub struct ClientCodec {
    state: LineState,
}

impl Default for ClientCodec {
    fn default() -> Self {
        ClientCodec {
            state: LineState::Start,
        }
    }
}

impl ClientCodec {
    /// Creates a new client codec
    pub fn new() -> Self {
        ClientCodec::default()
    }

    /// Adds transparency to `frame`, appending the result to `buf`.
    pub fn encode(&mut self, frame: &[u8], buf: &mut Vec<u8>) {
        buf.reserve(frame.len() + frame.len() / 64 + 2);
        for &byte in frame {
            if self.state == LineState::CarriageReturn {
                buf.push(b'\n');
                self.state = LineState::Start;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\r' => {
                    buf.push(b'\r');
                    self.state = LineState::CarriageReturn;
                }
                b'\n' => {
                    buf.extend_from_slice(b"\r\n");
                    self.state = LineState::Start;
                }
                b'.' if self.state == LineState::Start => {
                    buf.extend_from_slice(b"..");
                    self.state = LineState::Middle;
                }
                _ => {
                    buf.push(byte);
                    self.state = LineState::Middle;
                }
            }
        }
    }

    /// Terminates the payload with `CRLF.CRLF`, reusing a trailing line break.
    pub fn finish(&mut self, buf: &mut Vec<u8>) {
        match self.state {
            LineState::Start => buf.extend_from_slice(b".\r\n"),
            LineState::Middle => buf.extend_from_slice(b"\r\n.\r\n"),
            LineState::CarriageReturn => buf.extend_from_slice(b"\n.\r\n"),
        }
        self.state = LineState::Start;
    }
}
