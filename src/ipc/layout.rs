//! Byte layout of the shared control block. All fields are little-endian.
//!
//! ```text
//! [0..8)    reqSeq       u64   written by the requester, published last
//! [8..16)   respSeq      u64   written by the responder, published last
//! [16..24)  inputCount   u64   legacy estimate input
//! [24..40)  schemaLen, tableLen, filterLen, orderLen   u32 x4
//! [40..48)  outputCount  f64   legacy estimate response
//! [48..56)  statusSeq    u64
//! [56..60)  statusLen    u32
//! [60..64)  statusCode   u32   1=READY 2=INFO 3=ERROR
//! [64..64+REQ_MAX)            request payload / generic response
//! [64+REQ_MAX..+STATUS_MAX)   status message bytes
//! ```

pub const REQ_SEQ: usize = 0;
pub const RESP_SEQ: usize = 8;
pub const INPUT_COUNT: usize = 16;
pub const SCHEMA_LEN: usize = 24;
pub const TABLE_LEN: usize = 28;
pub const FILTER_LEN: usize = 32;
pub const ORDER_LEN: usize = 36;
pub const OUTPUT_COUNT: usize = 40;
pub const STATUS_SEQ: usize = 48;
pub const STATUS_LEN: usize = 56;
pub const STATUS_CODE: usize = 60;

pub const HEADER_SIZE: usize = 64;
pub const REQ_MAX: usize = 512 * 1024;
pub const STATUS_MAX: usize = 64 * 1024;

/// Start of the request payload and of generic responses.
pub const PAYLOAD: usize = HEADER_SIZE;
/// Start of the status message bytes.
pub const STATUS_PAYLOAD: usize = HEADER_SIZE + REQ_MAX;
/// Smallest backing file `ControlBlock::open` accepts.
pub const REGION_SIZE: usize = HEADER_SIZE + REQ_MAX + STATUS_MAX;

/// Generic requests: `[opcode u8][len u32][bytes]`.
pub const GENERIC_HEADER: usize = 1 + 4;
/// Generic responses: `[len u32][bytes]`.
pub const RESPONSE_HEADER: usize = 4;
/// Largest body a generic response can carry.
pub const RESPONSE_MAX: usize = REQ_MAX - RESPONSE_HEADER;

pub const OP_FETCH_MODEL: u8 = 2;
pub const OP_EXECUTE_QUERY: u8 = 3;
