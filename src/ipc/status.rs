//! Status announcements in their own sub-region.
//!
//! Status traffic is independent of the request mailbox: the responder may
//! announce at any time and the requester drains messages whenever it likes.

use std::fmt;

use tracing::debug;

use super::control_block::ControlBlock;
use super::layout::{STATUS_CODE, STATUS_LEN, STATUS_MAX, STATUS_PAYLOAD, STATUS_SEQ};

/// Reader retries before giving up on a status that keeps moving.
const READ_ATTEMPTS: usize = 8;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StatusCode {
    Ready,
    Info,
    Error,
    /// Code this build does not know about.
    Other(u32),
}

impl StatusCode {
    pub fn raw(self) -> u32 {
        match self {
            StatusCode::Ready => 1,
            StatusCode::Info => 2,
            StatusCode::Error => 3,
            StatusCode::Other(code) => code,
        }
    }

    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => StatusCode::Ready,
            2 => StatusCode::Info,
            3 => StatusCode::Error,
            other => StatusCode::Other(other),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Ready => f.write_str("READY"),
            StatusCode::Info => f.write_str("INFO"),
            StatusCode::Error => f.write_str("ERROR"),
            StatusCode::Other(code) => write!(f, "STATUS({code})"),
        }
    }
}

/// One status write as observed by a reader.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StatusMessage {
    pub seq: u64,
    pub code: StatusCode,
    pub message: String,
}

impl StatusMessage {
    /// Read the current status if its sequence differs from `last_seen`.
    ///
    /// The sequence, length and code are checked again after copying and the
    /// copy is retried if any of them moved. A writer that has replaced the
    /// message bytes but not yet the length, code or sequence is not visible
    /// here: the layout carries no in-progress marker, so such a read returns
    /// the new bytes under the previous code. Callers that need the pair
    /// exact should read again once the sequence advances.
    pub fn read(block: &ControlBlock, last_seen: u64) -> Option<Self> {
        for _ in 0..READ_ATTEMPTS {
            let seq = block.load_seq(STATUS_SEQ);
            if seq == 0 || seq == last_seen {
                return None;
            }
            let raw_len = block.read_u32(STATUS_LEN);
            let raw_code = block.read_u32(STATUS_CODE);
            let len = (raw_len as usize).min(STATUS_MAX);
            let message = block
                .read_bytes(STATUS_PAYLOAD, len)
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .unwrap_or_default();
            let settled = block.load_seq(STATUS_SEQ) == seq
                && block.read_u32(STATUS_LEN) == raw_len
                && block.read_u32(STATUS_CODE) == raw_code;
            if settled {
                return Some(Self {
                    seq,
                    code: StatusCode::from_raw(raw_code),
                    message,
                });
            }
        }
        None
    }
}

/// Writer half, borrowed from the responder's control block.
pub struct StatusChannel<'a> {
    block: &'a mut ControlBlock,
}

impl<'a> StatusChannel<'a> {
    pub fn new(block: &'a mut ControlBlock) -> Self {
        Self { block }
    }

    /// Publish a status. Message bytes, then length and code, then the bumped sequence.
    // TODO: add an in-progress marker word once requesters can be upgraded with the layout.
    /// Returns the published sequence number.
    pub fn write(&mut self, code: StatusCode, message: &str) -> u64 {
        let bytes = truncate_utf8(message, STATUS_MAX).as_bytes();
        // STATUS_PAYLOAD + STATUS_MAX is inside every mapping `open` accepts.
        let _ = self.block.write_bytes(STATUS_PAYLOAD, bytes);
        self.block.write_u32(STATUS_LEN, bytes.len() as u32);
        self.block.write_u32(STATUS_CODE, code.raw());
        let seq = self.block.load_seq(STATUS_SEQ).wrapping_add(1);
        self.block.publish_seq(STATUS_SEQ, seq);
        debug!(ev = "status_written", seq, code = %code, len = bytes.len());
        seq
    }

    pub fn ready(&mut self, message: &str) -> u64 {
        self.write(StatusCode::Ready, message)
    }

    pub fn info(&mut self, message: &str) -> u64 {
        self.write(StatusCode::Info, message)
    }

    pub fn error(&mut self, message: &str) -> u64 {
        self.write(StatusCode::Error, message)
    }
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a character.
fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> (tempfile::TempDir, ControlBlock) {
        let dir = tempfile::tempdir().expect("tempdir");
        let block = ControlBlock::create(dir.path().join("status.shm")).expect("create");
        (dir, block)
    }

    #[test]
    fn nothing_to_read_before_first_write() {
        let (_dir, block) = region();
        assert!(StatusMessage::read(&block, 0).is_none());
    }

    #[test]
    fn writes_are_sequenced_and_consistent() {
        let (_dir, mut block) = region();
        let first = StatusChannel::new(&mut block).info("loaded histogram shop.orders");
        let second = StatusChannel::new(&mut block).ready("ready");
        assert_eq!((first, second), (1, 2));

        let seen = StatusMessage::read(&block, first).expect("new status");
        assert_eq!(seen.seq, 2);
        assert_eq!(seen.code, StatusCode::Ready);
        assert_eq!(seen.message, "ready");
        assert!(StatusMessage::read(&block, 2).is_none());
    }

    #[test]
    fn shorter_message_does_not_leak_previous_bytes() {
        let (_dir, mut block) = region();
        StatusChannel::new(&mut block).error("a fairly long error message");
        StatusChannel::new(&mut block).info("ok");
        let seen = StatusMessage::read(&block, 0).expect("status");
        assert_eq!(seen.message, "ok");
        assert_eq!(seen.code, StatusCode::Info);
    }

    #[test]
    fn oversized_message_is_truncated_to_capacity() {
        let (_dir, mut block) = region();
        let long = "é".repeat(STATUS_MAX);
        StatusChannel::new(&mut block).error(&long);
        let seen = StatusMessage::read(&block, 0).expect("status");
        assert!(seen.message.len() <= STATUS_MAX);
        assert!(seen.message.chars().all(|c| c == 'é'));
        assert_eq!(seen.message.len(), STATUS_MAX);
    }

    #[test]
    fn unknown_codes_round_trip() {
        assert_eq!(StatusCode::from_raw(9), StatusCode::Other(9));
        assert_eq!(StatusCode::Other(9).raw(), 9);
        for code in [StatusCode::Ready, StatusCode::Info, StatusCode::Error] {
            assert_eq!(StatusCode::from_raw(code.raw()), code);
        }
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_utf8("héllo", 2), "h");
        assert_eq!(truncate_utf8("héllo", 3), "hé");
        assert_eq!(truncate_utf8("abc", 10), "abc");
    }

    #[test]
    fn header_written_ahead_of_the_sequence_reads_as_one_pair() {
        let (_dir, mut block) = region();
        StatusChannel::new(&mut block).ready("ready");

        // Writer stopped after length and code, before the sequence bump.
        block.write_bytes(STATUS_PAYLOAD, b"boom").expect("bytes");
        block.write_u32(STATUS_LEN, 4);
        block.write_u32(STATUS_CODE, StatusCode::Error.raw());
        let torn = StatusMessage::read(&block, 0).expect("status");
        assert_eq!(torn.seq, 1);
        assert_eq!((torn.code, torn.message.as_str()), (StatusCode::Error, "boom"));

        let seq = block.load_seq(STATUS_SEQ) + 1;
        block.publish_seq(STATUS_SEQ, seq);
        let done = StatusMessage::read(&block, 1).expect("published status");
        assert_eq!((done.seq, done.code), (2, StatusCode::Error));
        assert_eq!(done.message, "boom");
    }

    #[test]
    fn same_length_byte_rewrite_before_publish_is_the_known_window() {
        let (_dir, mut block) = region();
        StatusChannel::new(&mut block).ready("ready");

        // Message bytes replaced, nothing else yet.
        block.write_bytes(STATUS_PAYLOAD, b"ERR!!").expect("bytes");
        let seen = StatusMessage::read(&block, 0).expect("status");
        assert_eq!(seen.seq, 1);
        assert_eq!(seen.code, StatusCode::Ready);
        assert_eq!(seen.message, "ERR!!");

        // The completed write is observed as a new announcement.
        StatusChannel::new(&mut block).error("ERR!!");
        let next = StatusMessage::read(&block, seen.seq).expect("next status");
        assert_eq!((next.seq, next.code), (2, StatusCode::Error));
    }
}
