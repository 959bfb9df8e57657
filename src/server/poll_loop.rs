//! Responder loop: announce readiness, then serve one request per reqSeq change.
//!
//! ```text
//! Starting -> AnnouncingReady -> Waiting <-> Processing
//! ```
//!
//! Every observed request is answered. Decode and dispatch failures become an
//! ERROR status or a passthrough estimate; the loop itself never stops.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::dispatch::domain::{Outcome, RequestHeader, Response};
use crate::dispatch::service::OpcodeDispatcher;
use crate::ipc::control_block::ControlBlock;
use crate::ipc::layout::{PAYLOAD, REQ_MAX, REQ_SEQ, RESP_SEQ};
use crate::ipc::status::StatusChannel;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LoopState {
    Starting,
    AnnouncingReady,
    Waiting,
    /// Serving the request published with this reqSeq.
    Processing(u64),
}

pub struct PollLoop {
    block: ControlBlock,
    dispatcher: OpcodeDispatcher,
    interval: Duration,
    state: LoopState,
    warm_up_note: String,
    last_seq: u64,
    served: u64,
}

impl PollLoop {
    pub fn new(block: ControlBlock, dispatcher: OpcodeDispatcher, interval: Duration) -> Self {
        Self {
            block,
            dispatcher,
            interval,
            state: LoopState::Starting,
            warm_up_note: String::new(),
            last_seq: 0,
            served: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// reqSeq of the last request answered.
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub fn served(&self) -> u64 {
        self.served
    }

    pub fn block(&self) -> &ControlBlock {
        &self.block
    }

    /// Perform one transition. An idle `Waiting` step sleeps for one poll interval.
    pub fn step(&mut self) -> LoopState {
        self.state = match self.state {
            LoopState::Starting => {
                let warm = self.dispatcher.warm_up();
                info!(
                    ev = "startup",
                    loaded = warm.loaded.len(),
                    failed = warm.failed.len(),
                    path = %self.block.path().display(),
                );
                self.warm_up_note = warm.summary(self.dispatcher.predictor().model_ids());
                LoopState::AnnouncingReady
            }
            LoopState::AnnouncingReady => {
                let mut status = StatusChannel::new(&mut self.block);
                status.info(&self.warm_up_note);
                status.ready("ready");
                LoopState::Waiting
            }
            LoopState::Waiting => {
                let seq = self.block.load_seq(REQ_SEQ);
                if seq != self.last_seq {
                    LoopState::Processing(seq)
                } else {
                    thread::sleep(self.interval);
                    LoopState::Waiting
                }
            }
            LoopState::Processing(seq) => {
                self.process(seq);
                LoopState::Waiting
            }
        };
        self.state
    }

    /// Serve forever.
    // TODO: exit on a shutdown word in the control block once the requester writes one.
    pub fn run(mut self) -> ! {
        info!(ev = "loop_started", interval_us = self.interval.as_micros() as u64);
        loop {
            self.step();
        }
    }

    fn process(&mut self, seq: u64) {
        let start = Instant::now();
        let header = RequestHeader::read(&self.block);
        let outcome = match self.block.read_bytes(PAYLOAD, REQ_MAX) {
            Ok(payload) => self.dispatcher.dispatch(&header, payload),
            Err(err) => Outcome::failed(err.to_string()),
        };

        let mut status = StatusChannel::new(&mut self.block);
        for (code, message) in &outcome.statuses {
            status.write(*code, message);
        }

        if let Err(err) = outcome.response.write(&mut self.block) {
            error!(ev = "response_write_failed", seq, code = err.code() as u32, error = %err);
            StatusChannel::new(&mut self.block).error(&err.to_string());
            // An empty payload always fits.
            let _ = Response::empty().write(&mut self.block);
        }

        self.block.publish_seq(RESP_SEQ, seq);
        self.last_seq = seq;
        self.served += 1;
        debug!(ev = "response_published", seq, dur_us = start.elapsed().as_micros() as u64);
    }
}
