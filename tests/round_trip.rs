//! Requester and responder talking through a real mapped file.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cardest::inference::features::FEATURE_DIM;
use cardest::ipc::layout::{RESP_SEQ, REQ_SEQ};
use cardest::ipc::StatusCode;
use cardest::models::domain::{Activation, BaseEncoder, Dense, Mlp};
use cardest::models::{encode_model, FsModelStore, Model};
use cardest::{AppCfg, ControlBlock, EstimateRequest, OpcodeDispatcher, PollLoop, Requester};

const TIMEOUT: Duration = Duration::from_secs(5);
const WIDTH: usize = 3;

struct Responder {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Responder {
    fn spawn(region: &Path, cfg: &AppCfg) -> Self {
        let block = ControlBlock::open(region).expect("open region");
        let mut poll = PollLoop::new(
            block,
            OpcodeDispatcher::from_cfg(cfg),
            Duration::from_micros(50),
        );
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                poll.step();
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn cfg_for(root: &Path, query_cmd: Option<&str>) -> AppCfg {
    AppCfg {
        data_root: root.to_path_buf(),
        query_cmd: query_cmd.map(str::to_string),
        ..AppCfg::default()
    }
}

fn dense(inputs: usize, outputs: usize, scale: f32) -> Dense {
    let weights = (0..inputs * outputs)
        .map(|i| ((i % 5) as f32 - 2.0) * scale)
        .collect();
    Dense::new(inputs, outputs, weights, vec![0.1; outputs], Activation::Identity)
        .expect("dense")
}

fn install_models(store: &FsModelStore) {
    let encoder = Model::BaseEncoder(BaseEncoder {
        token_proj: dense(FEATURE_DIM, WIDTH, 0.05),
        namespace_proj: dense(FEATURE_DIM, WIDTH, 0.02),
        entity_proj: dense(FEATURE_DIM, WIDTH, 0.03),
        mlp: Mlp::new(vec![dense(WIDTH + 1, WIDTH, 0.1)]).expect("mlp"),
    });
    let layer = Model::Layer(Mlp::new(vec![dense(WIDTH, WIDTH, 0.2)]).expect("layer"));
    let head = Model::Head(Mlp::new(vec![dense(WIDTH, 1, 0.3)]).expect("head"));

    store
        .put_model("base_encoder_v1", &encode_model(&encoder).expect("encode"))
        .expect("put");
    store
        .put_model("ordered_layer_v1", &encode_model(&layer).expect("encode"))
        .expect("put");
    store
        .put_model("output_head_v1", &encode_model(&head).expect("encode"))
        .expect("put");
    store
        .put_entity_model("shop", "orders", &encode_model(&layer).expect("encode"))
        .expect("put");
}

#[test]
fn passthrough_when_no_models_are_installed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let region = dir.path().join("region.shm");
    let mut requester = Requester::create(&region).expect("create");
    let _responder = Responder::spawn(&region, &cfg_for(dir.path(), None));

    assert!(requester.await_ready(TIMEOUT));

    let req = EstimateRequest::new("shop", "orders", "(> amount 10)", "", 1000);
    let value = requester.estimate(&req, TIMEOUT).expect("estimate");
    assert_eq!(value, 1000.0);
    assert_eq!(requester.block().load_seq(RESP_SEQ), requester.seq());
}

#[test]
fn installed_models_produce_predictions_and_announce_histograms() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = cfg_for(dir.path(), None);
    install_models(&FsModelStore::new(&cfg));

    let region = dir.path().join("region.shm");
    let mut requester = Requester::create(&region).expect("create");
    let _responder = Responder::spawn(&region, &cfg);
    assert!(requester.await_ready(TIMEOUT));

    let req = EstimateRequest::new(
        "shop",
        "orders",
        "(and (> amount 10) (< amount 99))",
        "",
        5000,
    );
    let first = requester.estimate(&req, TIMEOUT).expect("estimate");
    assert!(first.is_finite() && first >= 0.0);
    assert_ne!(first, 5000.0);

    let status = requester.poll_status().expect("histogram status");
    assert_eq!(status.code, StatusCode::Info);
    assert_eq!(status.message, "loaded histogram shop.orders");

    let second = requester.estimate(&req, TIMEOUT).expect("estimate");
    assert_eq!(first.to_bits(), second.to_bits());
    assert!(requester.poll_status().is_none());

    let ordered = EstimateRequest::new("shop", "orders", "(> amount 10)", "amount|id", 5000);
    assert!(requester.estimate(&ordered, TIMEOUT).expect("ordered") >= 0.0);

    let unknown = EstimateRequest::new("shop", "returns", "(> amount 10)", "", 5000);
    assert_eq!(requester.estimate(&unknown, TIMEOUT).expect("unknown"), 5000.0);
}

#[test]
fn fetch_model_round_trips_raw_bytes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = cfg_for(dir.path(), None);
    let store = FsModelStore::new(&cfg);
    store.put_model("m1", b"\x00opaque\xffbytes").expect("put");

    let region = dir.path().join("region.shm");
    let mut requester = Requester::create(&region).expect("create");
    let _responder = Responder::spawn(&region, &cfg);
    assert!(requester.await_ready(TIMEOUT));

    let bytes = requester.fetch_model("m1", TIMEOUT).expect("fetch");
    assert_eq!(bytes, b"\x00opaque\xffbytes");
    assert!(requester.poll_status().is_none());

    let missing = requester.fetch_model("missing", TIMEOUT).expect("fetch");
    assert!(missing.is_empty());
    let status = requester.poll_status().expect("error status");
    assert_eq!(status.code, StatusCode::Error);
    assert_eq!(status.message, "model not found: missing");
}

#[test]
fn execute_forwards_to_the_query_command() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = cfg_for(dir.path(), Some("tr a-z A-Z"));
    let region = dir.path().join("region.shm");
    let mut requester = Requester::create(&region).expect("create");
    let _responder = Responder::spawn(&region, &cfg);
    assert!(requester.await_ready(TIMEOUT));

    let answer = requester.execute("select 1", TIMEOUT).expect("execute");
    assert_eq!(answer, "SELECT 1");
}

#[test]
fn execute_streams_a_query_larger_than_a_pipe_buffer() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = cfg_for(dir.path(), Some("cat"));
    let region = dir.path().join("region.shm");
    let mut requester = Requester::create(&region).expect("create");
    let _responder = Responder::spawn(&region, &cfg);
    assert!(requester.await_ready(TIMEOUT));

    let query = "select 1 union all ".repeat(16 * 1024);
    assert!(query.len() > 256 * 1024);
    let answer = requester.execute(&query, Duration::from_secs(20)).expect("execute");
    assert_eq!(answer, query);
    assert!(requester.poll_status().is_none());
}

#[test]
fn execute_without_engine_returns_the_error_text() {
    let dir = tempfile::tempdir().expect("tempdir");
    let region = dir.path().join("region.shm");
    let mut requester = Requester::create(&region).expect("create");
    let _responder = Responder::spawn(&region, &cfg_for(dir.path(), None));
    assert!(requester.await_ready(TIMEOUT));

    let answer = requester.execute("select 1", TIMEOUT).expect("execute");
    assert_eq!(answer, "engine: no query engine configured");
    let status = requester.poll_status().expect("error status");
    assert_eq!(status.code, StatusCode::Error);
    assert_eq!(status.message, answer);
}

#[test]
fn unknown_opcode_gets_an_empty_answer() {
    let dir = tempfile::tempdir().expect("tempdir");
    let region = dir.path().join("region.shm");
    let mut requester = Requester::create(&region).expect("create");
    let _responder = Responder::spawn(&region, &cfg_for(dir.path(), None));
    assert!(requester.await_ready(TIMEOUT));

    let body = requester.generic(42, b"anything", TIMEOUT).expect("generic");
    assert!(body.is_empty());
    assert!(requester.poll_status().is_none());
}

#[test]
fn sequences_advance_once_per_request() {
    let dir = tempfile::tempdir().expect("tempdir");
    let region = dir.path().join("region.shm");
    let mut requester = Requester::create(&region).expect("create");
    let _responder = Responder::spawn(&region, &cfg_for(dir.path(), None));
    assert!(requester.await_ready(TIMEOUT));

    for n in 1..=20u64 {
        let req = EstimateRequest::new("ns", "t", "true", "", n);
        assert_eq!(requester.estimate(&req, TIMEOUT).expect("estimate"), n as f64);
        assert_eq!(requester.block().load_seq(REQ_SEQ), n);
        assert_eq!(requester.block().load_seq(RESP_SEQ), n);
    }
}
