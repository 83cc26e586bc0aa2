//! Per-connection reassembly of delimiter-terminated frames.
//!
//! Reads may end anywhere, including inside a multi-byte char or between
//! two frames, so bytes are buffered until a full frame is available and the
//! remainder is carried over to the next read.

/// Byte buffer that yields complete frames.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    delimiter: Vec<u8>,
    max_frame_len: usize,
    /// Inside an oversize frame: drop bytes up to its delimiter.
    discarding: bool,
}

/// Outcome of feeding one read into the buffer.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Frames {
    /// Complete frames, delimiter stripped, in arrival order.
    pub complete: Vec<Vec<u8>>,
    /// Bytes discarded because a frame exceeded the size limit.
    pub overflowed: usize,
    /// Frames that started exceeding the size limit in this push.
    pub oversize: usize,
}

impl FrameBuffer {
    pub fn new(delimiter: char, max_frame_len: usize) -> Self {
        let mut tmp = [0u8; 4];
        Self {
            buf: Vec::new(),
            delimiter: delimiter.encode_utf8(&mut tmp).as_bytes().to_vec(),
            max_frame_len,
            discarding: false,
        }
    }

    /// Append freshly read bytes and drain every complete frame.
    ///
    /// Empty frames (two delimiters in a row) are skipped. If the pending
    /// partial frame grows past the limit it is discarded, and so is the
    /// rest of it up to and including its delimiter.
    pub fn push(&mut self, bytes: &[u8]) -> Frames {
        self.buf.extend_from_slice(bytes);

        let mut frames = Frames::default();
        if self.discarding && !self.skip_oversize(&mut frames) {
            return frames;
        }

        let mut start = 0;
        while let Some(at) = find(&self.buf[start..], &self.delimiter) {
            let end = start + at;
            if end > start {
                frames.complete.push(self.buf[start..end].to_vec());
            }
            start = end + self.delimiter.len();
        }
        self.buf.drain(..start);

        if self.buf.len() > self.max_frame_len {
            frames.overflowed += self.buf.len();
            self.buf.clear();
            self.discarding = true;
            frames.oversize += 1;
        }
        frames
    }

    /// Drop the tail of an oversize frame. Returns whether its delimiter
    /// was found.
    fn skip_oversize(&mut self, frames: &mut Frames) -> bool {
        match find(&self.buf, &self.delimiter) {
            Some(at) => {
                frames.overflowed += at;
                self.buf.drain(..at + self.delimiter.len());
                self.discarding = false;
                true
            }
            None => {
                // keep what could be the start of a split delimiter
                let keep = (self.delimiter.len() - 1).min(self.buf.len());
                let cut = self.buf.len() - keep;
                frames.overflowed += cut;
                self.buf.drain(..cut);
                false
            }
        }
    }

    /// Bytes of the pending partial frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
