//! Request decoding. The four legacy length fields select the mode: any non-zero
//! length means a legacy estimate, all zero means a generic opcode frame.

use crate::common::error::{CardError, CardResult};
use crate::inference::domain::EstimateRequest;
use crate::ipc::control_block::ControlBlock;
use crate::ipc::layout::{
    FILTER_LEN, GENERIC_HEADER, INPUT_COUNT, OP_EXECUTE_QUERY, OP_FETCH_MODEL, ORDER_LEN,
    OUTPUT_COUNT, PAYLOAD, RESPONSE_HEADER, RESPONSE_MAX, SCHEMA_LEN, TABLE_LEN,
};
use crate::ipc::status::StatusCode;

/// Scalar request fields copied out of the control block header.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RequestHeader {
    pub input_count: u64,
    pub schema_len: u32,
    pub table_len: u32,
    pub filter_len: u32,
    pub order_len: u32,
}

impl RequestHeader {
    pub fn read(block: &ControlBlock) -> Self {
        Self {
            input_count: block.read_u64(INPUT_COUNT),
            schema_len: block.read_u32(SCHEMA_LEN),
            table_len: block.read_u32(TABLE_LEN),
            filter_len: block.read_u32(FILTER_LEN),
            order_len: block.read_u32(ORDER_LEN),
        }
    }

    /// Write these fields into `block`. Used by the requester.
    pub fn write(&self, block: &mut ControlBlock) {
        block.write_u64(INPUT_COUNT, self.input_count);
        block.write_u32(SCHEMA_LEN, self.schema_len);
        block.write_u32(TABLE_LEN, self.table_len);
        block.write_u32(FILTER_LEN, self.filter_len);
        block.write_u32(ORDER_LEN, self.order_len);
    }

    pub fn is_legacy(&self) -> bool {
        self.lengths().iter().any(|len| *len != 0)
    }

    fn lengths(&self) -> [u32; 4] {
        [self.schema_len, self.table_len, self.filter_len, self.order_len]
    }
}

/// A decoded request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    Estimate(EstimateRequest),
    FetchModel { model_id: String },
    Execute { query: String },
    Unknown { opcode: u8 },
}

impl Request {
    /// Decode a request. `payload` is the whole request region.
    pub fn decode(header: &RequestHeader, payload: &[u8]) -> CardResult<Self> {
        if header.is_legacy() {
            decode_legacy(header, payload)
        } else {
            decode_generic(payload)
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Request::Estimate(_) => "estimate",
            Request::FetchModel { .. } => "fetch_model",
            Request::Execute { .. } => "execute",
            Request::Unknown { .. } => "unknown",
        }
    }
}

fn decode_legacy(header: &RequestHeader, payload: &[u8]) -> CardResult<Request> {
    let total: u64 = header.lengths().iter().map(|len| u64::from(*len)).sum();
    if total > payload.len() as u64 {
        return Err(CardError::decode(format!(
            "legacy payload of {total} bytes exceeds region of {}",
            payload.len()
        )));
    }

    let mut cursor = 0usize;
    let [namespace, entity, filter, order] = header.lengths().map(|len| {
        let start = cursor;
        cursor += len as usize;
        String::from_utf8_lossy(&payload[start..cursor]).into_owned()
    });

    Ok(Request::Estimate(EstimateRequest {
        namespace,
        entity,
        filter,
        order,
        input_count: header.input_count,
    }))
}

fn decode_generic(payload: &[u8]) -> CardResult<Request> {
    if payload.len() < GENERIC_HEADER {
        return Err(CardError::decode("generic frame shorter than its header"));
    }
    let opcode = payload[0];
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&payload[1..GENERIC_HEADER]);
    let len = u32::from_le_bytes(raw) as usize;
    let body = payload
        .get(GENERIC_HEADER..)
        .and_then(|rest| rest.get(..len))
        .ok_or_else(|| {
            CardError::decode(format!(
                "opcode {opcode} declares {len} bytes, region holds {}",
                payload.len() - GENERIC_HEADER
            ))
        })?;
    let text = || String::from_utf8_lossy(body).into_owned();

    Ok(match opcode {
        OP_FETCH_MODEL => Request::FetchModel { model_id: text() },
        OP_EXECUTE_QUERY => Request::Execute { query: text() },
        other => Request::Unknown { opcode: other },
    })
}

/// Response written back before respSeq is published.
#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    /// Legacy estimate, stored as an f64 at the outputCount offset.
    Estimate(f64),
    /// Generic `[len u32][bytes]` body at the start of the payload region.
    Payload(Vec<u8>),
}

impl Response {
    pub fn empty() -> Self {
        Response::Payload(Vec::new())
    }

    /// Copy the response into the control block.
    ///
    /// Payloads must already fit in `RESPONSE_MAX`; longer ones are rejected
    /// without touching the region.
    pub fn write(&self, block: &mut ControlBlock) -> CardResult<()> {
        match self {
            Response::Estimate(value) => block.write_f64(OUTPUT_COUNT, *value),
            Response::Payload(bytes) => {
                if bytes.len() > RESPONSE_MAX {
                    return Err(CardError::transport(format!(
                        "response of {} bytes exceeds {RESPONSE_MAX}",
                        bytes.len()
                    )));
                }
                block.write_bytes(PAYLOAD + RESPONSE_HEADER, bytes)?;
                block.write_u32(PAYLOAD, bytes.len() as u32);
            }
        }
        Ok(())
    }
}

/// Everything the dispatcher produced for one request.
#[derive(Clone, Debug, PartialEq)]
pub struct Outcome {
    pub response: Response,
    /// Statuses to announce before the response is published.
    pub statuses: Vec<(StatusCode, String)>,
}

impl Outcome {
    pub fn new(response: Response) -> Self {
        Self {
            response,
            statuses: Vec::new(),
        }
    }

    pub fn with_status(mut self, code: StatusCode, message: impl Into<String>) -> Self {
        self.statuses.push((code, message.into()));
        self
    }

    /// Zero-length payload plus an ERROR status.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(Response::empty()).with_status(StatusCode::Error, message)
    }
}

/// Encode a generic frame `[opcode][len u32][body]`.
pub fn encode_generic(opcode: u8, body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(GENERIC_HEADER + body.len());
    frame.push(opcode);
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(body);
    frame
}
