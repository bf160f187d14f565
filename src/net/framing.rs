//! Length-prefixed message framing over a byte stream.
//!
//! Every message on the wire is
//!
//! ```text
//! [u16 BE length] [length bytes of payload]
//! ```
//!
//! There is no magic number, version byte or checksum. The 2-byte header caps
//! a payload at 65535 bytes and lets the receiver size its buffer before the
//! payload arrives.
//!
//! [`MessageFramer`] is implemented for every [`StreamTransport`], which
//! [`Socket`] is. Sending drives partial writes to completion; receiving loops
//! over partial reads and fails with [`SocketError::ShortRead`] if the peer
//! closes in the middle of a frame.
//!
//! # Example
//!
//! ```no_run
//! use greensocket::{MessageFramer, Socket, SocketType};
//! use std::time::Duration;
//!
//! let (sender, receiver) = Socket::pair(SocketType::Stream)?;
//! let timeout = Some(Duration::from_secs(5));
//!
//! sender.send_message(b"Hello Swift World!", timeout)?;
//!
//! let mut payload = Vec::new();
//! let count = receiver.recv_message(&mut payload, timeout)?;
//! assert_eq!(&payload[..count], b"Hello Swift World!");
//! # Ok::<(), greensocket::SocketError>(())
//! ```

use crate::error::{FramePart, Result, SocketError};
use crate::net::socket::{Socket, write_all_within};
use crate::time::Deadline;

use std::time::Duration;

/// Size of the length header in bytes.
pub const HEADER_LEN: usize = 2;

/// Largest payload the 16-bit header can describe.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Timeout-aware byte stream the framer reads from and writes to.
pub trait StreamTransport {
    /// Reads at most `buffer.len()` bytes; `Ok(0)` means end of stream.
    fn read_with_timeout(&self, buffer: &mut [u8], timeout: Option<Duration>) -> Result<usize>;

    /// Writes at most `buffer.len()` bytes, possibly fewer.
    fn write_with_timeout(&self, buffer: &[u8], timeout: Option<Duration>) -> Result<usize>;
}

impl StreamTransport for Socket {
    fn read_with_timeout(&self, buffer: &mut [u8], timeout: Option<Duration>) -> Result<usize> {
        Socket::read_with_timeout(self, buffer, timeout)
    }

    fn write_with_timeout(&self, buffer: &[u8], timeout: Option<Duration>) -> Result<usize> {
        Socket::write_with_timeout(self, buffer, timeout)
    }
}

/// Send and receive whole length-prefixed messages.
pub trait MessageFramer {
    /// Sends `payload` as one frame, returning the bytes written including
    /// the header.
    ///
    /// `timeout` bounds the whole frame, not each underlying write.
    ///
    /// # Errors
    /// [`SocketError::MessageTooLarge`] before anything is written when the
    /// payload exceeds [`MAX_PAYLOAD_LEN`].
    fn send_message(&self, payload: &[u8], timeout: Option<Duration>) -> Result<usize>;

    /// Receives one frame into `buffer` (replacing its contents) and returns
    /// the payload length.
    ///
    /// # Errors
    /// [`SocketError::ShortRead`] when the stream ends before the header or
    /// the announced payload is complete; `buffer` is left empty.
    fn recv_message(&self, buffer: &mut Vec<u8>, timeout: Option<Duration>) -> Result<usize>;
}

impl<T: StreamTransport + ?Sized> MessageFramer for T {
    fn send_message(&self, payload: &[u8], timeout: Option<Duration>) -> Result<usize> {
        let header = encode_header(payload.len())?;

        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.extend_from_slice(&header);
        frame.extend_from_slice(payload);

        write_all_within(&frame, Deadline::after(timeout), |chunk, remaining| {
            self.write_with_timeout(chunk, remaining)
        })?;

        log::trace!("[Framer] Sent frame with {} byte payload", payload.len());

        Ok(frame.len())
    }

    fn recv_message(&self, buffer: &mut Vec<u8>, timeout: Option<Duration>) -> Result<usize> {
        buffer.clear();
        let deadline = Deadline::after(timeout);

        let mut header = [0u8; HEADER_LEN];
        read_exact_within(self, &mut header, &deadline, FramePart::Header)?;

        let length = decode_header(header);
        log::trace!("[Framer] Received header announcing {} bytes", length);

        buffer.resize(length, 0);
        if let Err(error) = read_exact_within(self, buffer, &deadline, FramePart::Payload) {
            buffer.clear();
            return Err(error);
        }

        Ok(length)
    }
}

/// Encodes a payload length as the big-endian frame header.
pub fn encode_header(payload_len: usize) -> Result<[u8; HEADER_LEN]> {
    let length = u16::try_from(payload_len).map_err(|_| SocketError::MessageTooLarge(payload_len))?;
    Ok(length.to_be_bytes())
}

pub fn decode_header(header: [u8; HEADER_LEN]) -> usize {
    u16::from_be_bytes(header) as usize
}

fn read_exact_within<T: StreamTransport + ?Sized>(
    transport: &T,
    buffer: &mut [u8],
    deadline: &Deadline,
    part: FramePart,
) -> Result<()> {
    let mut filled = 0;

    while filled < buffer.len() {
        match transport.read_with_timeout(&mut buffer[filled..], deadline.remaining()) {
            Ok(0) => {
                return Err(SocketError::ShortRead {
                    part,
                    expected: buffer.len(),
                    received: filled,
                });
            }
            Ok(count) => filled += count,
            Err(SocketError::Timeout(_)) => return Err(SocketError::Timeout(deadline.duration())),
            Err(error) => return Err(error),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// In-memory stream that hands out at most `chunk` bytes per call.
    struct TrickleStream {
        incoming: RefCell<VecDeque<u8>>,
        outgoing: RefCell<Vec<u8>>,
        chunk: usize,
    }

    impl TrickleStream {
        fn new(incoming: &[u8], chunk: usize) -> Self {
            Self {
                incoming: RefCell::new(incoming.iter().copied().collect()),
                outgoing: RefCell::new(Vec::new()),
                chunk,
            }
        }
    }

    impl StreamTransport for TrickleStream {
        fn read_with_timeout(&self, buffer: &mut [u8], _: Option<Duration>) -> Result<usize> {
            let mut incoming = self.incoming.borrow_mut();
            let count = buffer.len().min(self.chunk).min(incoming.len());
            for slot in &mut buffer[..count] {
                *slot = incoming.pop_front().unwrap_or_default();
            }
            Ok(count)
        }

        fn write_with_timeout(&self, buffer: &[u8], _: Option<Duration>) -> Result<usize> {
            let count = buffer.len().min(self.chunk);
            self.outgoing.borrow_mut().extend_from_slice(&buffer[..count]);
            Ok(count)
        }
    }

    #[test]
    fn send_completes_across_partial_writes() {
        let stream = TrickleStream::new(&[], 3);

        let sent = stream.send_message(b"Hello Swift World!", None).unwrap();

        assert_eq!(sent, 20);
        let outgoing = stream.outgoing.borrow();
        assert_eq!(&outgoing[..2], &[0x00, 0x12]);
        assert_eq!(&outgoing[2..], b"Hello Swift World!");
    }

    #[test]
    fn receive_tolerates_single_byte_reads() {
        let stream = TrickleStream::new(&[0x00, 0x05, b'h', b'e', b'l', b'l', b'o'], 1);
        let mut payload = Vec::new();

        let count = stream.recv_message(&mut payload, None).unwrap();

        assert_eq!(count, 5);
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn empty_payload_is_a_valid_message() {
        let stream = TrickleStream::new(&[0x00, 0x00], 1);
        let mut payload = vec![1, 2, 3];

        assert_eq!(stream.recv_message(&mut payload, None).unwrap(), 0);
        assert!(payload.is_empty());
    }

    #[test]
    fn header_only_then_eof_is_a_short_payload_read() {
        let stream = TrickleStream::new(&[0x00, 0x13], 2);
        let mut payload = Vec::new();

        let error = stream.recv_message(&mut payload, None).unwrap_err();

        assert!(matches!(
            error,
            SocketError::ShortRead {
                part: FramePart::Payload,
                expected: 19,
                received: 0
            }
        ));
        assert!(payload.is_empty());
    }

    #[test]
    fn eof_inside_header_is_a_short_header_read() {
        let stream = TrickleStream::new(&[0x00], 4);
        let mut payload = Vec::new();

        let error = stream.recv_message(&mut payload, None).unwrap_err();

        assert!(matches!(
            error,
            SocketError::ShortRead {
                part: FramePart::Header,
                expected: 2,
                received: 1
            }
        ));
        assert!(!error.is_clean_eof());
    }

    #[test]
    fn eof_on_frame_boundary_is_clean() {
        let stream = TrickleStream::new(&[], 4);
        let mut payload = Vec::new();

        let error = stream.recv_message(&mut payload, None).unwrap_err();

        assert!(error.is_clean_eof());
    }

    #[test]
    fn oversized_payload_is_rejected_before_writing() {
        let stream = TrickleStream::new(&[], 1024);
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];

        let error = stream.send_message(&payload, None).unwrap_err();

        assert!(matches!(error, SocketError::MessageTooLarge(65536)));
        assert!(stream.outgoing.borrow().is_empty());
    }

    #[test]
    fn header_is_big_endian() {
        assert_eq!(encode_header(0x0102).unwrap(), [0x01, 0x02]);
        assert_eq!(decode_header([0xff, 0xff]), MAX_PAYLOAD_LEN);
    }
}
