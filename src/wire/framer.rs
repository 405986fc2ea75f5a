use crate::error::WireError;
use crate::wire::delta::DELTA_LEN;
use crate::wire::header::{HEADER_LEN, MsgType, PacketHeader};
use crate::wire::response::reply_len;
use std::io::{ErrorKind, Read};

/// Bytes a frame occupies in the sender's framing, including records beyond
/// the 128 the decoder materializes.
pub fn frame_len(header: &PacketHeader) -> Result<usize, WireError> {
    if !header.has_valid_magic() {
        return Err(WireError::BadMagic(header.magic));
    }
    Ok(match header.kind()? {
        MsgType::Deltas => HEADER_LEN + DELTA_LEN * header.declared_delta_count(),
        other => reply_len(other),
    })
}

/// Splits a byte stream of back-to-back LOB1 frames into whole frames.
///
/// The framer blocks only inside [`Read::read`] while the current frame is incomplete.
/// A frame with a broken header cannot be skipped, so the stream is unusable after
/// `BadMagic` or `UnsupportedMessage`.
pub struct PacketFramer<R: Read> {
    reader: R,
    buf: Vec<u8>,
    frames: u64,
    bytes: u64,
}

impl<R: Read> PacketFramer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(HEADER_LEN + DELTA_LEN * 128),
            frames: 0,
            bytes: 0,
        }
    }

    /// Next whole frame, `None` at a clean end of stream.
    pub fn next_frame(&mut self) -> Result<Option<&[u8]>, WireError> {
        self.buf.clear();
        self.buf.resize(HEADER_LEN, 0);
        let got = fill(&mut self.reader, &mut self.buf[..])?;
        if got == 0 {
            return Ok(None);
        }
        if got < HEADER_LEN {
            return Err(WireError::MalformedPacket {
                needed: HEADER_LEN,
                available: got,
            });
        }

        let header = PacketHeader::decode(&self.buf)?;
        let len = frame_len(&header)?;
        self.buf.resize(len, 0);
        let got = fill(&mut self.reader, &mut self.buf[HEADER_LEN..])?;
        if HEADER_LEN + got < len {
            return Err(WireError::MalformedPacket {
                needed: len,
                available: HEADER_LEN + got,
            });
        }

        self.frames += 1;
        self.bytes += len as u64;
        Ok(Some(&self.buf))
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Reads until `buf` is full or the stream ends. Returns the bytes read.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, WireError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
