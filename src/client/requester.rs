//! Requester side of the control block.
//!
//! The requester owns reqSeq and the request fields. Each call writes the
//! request, publishes `reqSeq + 1` last, and spins until respSeq catches up.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::common::error::{CardError, CardResult};
use crate::dispatch::domain::{encode_generic, RequestHeader};
use crate::inference::domain::EstimateRequest;
use crate::ipc::control_block::ControlBlock;
use crate::ipc::layout::{
    OP_EXECUTE_QUERY, OP_FETCH_MODEL, OUTPUT_COUNT, PAYLOAD, REQ_MAX, REQ_SEQ, RESPONSE_HEADER,
    RESPONSE_MAX, RESP_SEQ,
};
use crate::ipc::status::{StatusCode, StatusMessage};

/// Sleep between checks of respSeq and statusSeq.
pub const SPIN_INTERVAL: Duration = Duration::from_micros(200);

pub struct Requester {
    block: ControlBlock,
    seq: u64,
    status_seen: u64,
}

impl Requester {
    /// Create and size a fresh backing file.
    pub fn create(path: impl AsRef<Path>) -> CardResult<Self> {
        Ok(Self::with_block(ControlBlock::create(path)?))
    }

    /// Attach to an existing region, continuing its reqSeq.
    pub fn open(path: impl AsRef<Path>) -> CardResult<Self> {
        Ok(Self::with_block(ControlBlock::open(path)?))
    }

    fn with_block(block: ControlBlock) -> Self {
        let seq = block.load_seq(REQ_SEQ);
        Self {
            block,
            seq,
            status_seen: 0,
        }
    }

    pub fn block(&self) -> &ControlBlock {
        &self.block
    }

    /// Sequence number of the most recent request.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Legacy estimate. Results are clamped at zero.
    pub fn estimate(&mut self, req: &EstimateRequest, timeout: Duration) -> CardResult<f64> {
        let fields = [
            req.namespace.as_bytes(),
            req.entity.as_bytes(),
            req.filter.as_bytes(),
            req.order.as_bytes(),
        ];
        let total: usize = fields.iter().map(|f| f.len()).sum();
        if total == 0 {
            return Err(CardError::decode(
                "estimate with four empty fields would be read as a generic frame",
            ));
        }
        if total > REQ_MAX {
            return Err(CardError::decode(format!(
                "estimate payload of {total} bytes exceeds {REQ_MAX}"
            )));
        }

        let mut offset = PAYLOAD;
        for field in fields {
            self.block.write_bytes(offset, field)?;
            offset += field.len();
        }
        RequestHeader {
            input_count: req.input_count,
            schema_len: fields[0].len() as u32,
            table_len: fields[1].len() as u32,
            filter_len: fields[2].len() as u32,
            order_len: fields[3].len() as u32,
        }
        .write(&mut self.block);

        self.submit(timeout)?;
        Ok(self.block.read_f64(OUTPUT_COUNT).max(0.0))
    }

    /// Raw artefact bytes for `model_id`; empty when the responder has none.
    pub fn fetch_model(&mut self, model_id: &str, timeout: Duration) -> CardResult<Vec<u8>> {
        self.generic(OP_FETCH_MODEL, model_id.as_bytes(), timeout)
    }

    /// Forward query text; the answer is the engine output or its error message.
    pub fn execute(&mut self, query: &str, timeout: Duration) -> CardResult<String> {
        let bytes = self.generic(OP_EXECUTE_QUERY, query.as_bytes(), timeout)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Send any opcode and return the response body.
    pub fn generic(&mut self, opcode: u8, body: &[u8], timeout: Duration) -> CardResult<Vec<u8>> {
        let frame = encode_generic(opcode, body);
        if frame.len() > REQ_MAX {
            return Err(CardError::decode(format!(
                "request frame of {} bytes exceeds {REQ_MAX}",
                frame.len()
            )));
        }
        self.block.write_bytes(PAYLOAD, &frame)?;
        RequestHeader::default().write(&mut self.block);

        self.submit(timeout)?;
        let len = self.block.read_u32(PAYLOAD) as usize;
        if len > RESPONSE_MAX {
            return Err(CardError::decode(format!(
                "response declares {len} bytes, region holds {RESPONSE_MAX}"
            )));
        }
        Ok(self.block.read_bytes(PAYLOAD + RESPONSE_HEADER, len)?.to_vec())
    }

    fn submit(&mut self, timeout: Duration) -> CardResult<()> {
        self.seq += 1;
        let seq = self.seq;
        self.block.publish_seq(REQ_SEQ, seq);

        let start = Instant::now();
        while self.block.load_seq(RESP_SEQ) != seq {
            if start.elapsed() >= timeout {
                return Err(CardError::Timeout("response"));
            }
            thread::sleep(SPIN_INTERVAL);
        }
        debug!(ev = "response_received", seq, dur_us = start.elapsed().as_micros() as u64);
        Ok(())
    }

    /// Next unseen status, if the responder wrote one since the last call.
    pub fn poll_status(&mut self) -> Option<StatusMessage> {
        let message = StatusMessage::read(&self.block, self.status_seen)?;
        self.status_seen = message.seq;
        Some(message)
    }

    /// Drain statuses until READY shows up or `timeout` elapses.
    pub fn await_ready(&mut self, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            while let Some(status) = self.poll_status() {
                if status.code == StatusCode::Ready {
                    return true;
                }
            }
            if start.elapsed() >= timeout {
                return false;
            }
            thread::sleep(SPIN_INTERVAL);
        }
    }
}
