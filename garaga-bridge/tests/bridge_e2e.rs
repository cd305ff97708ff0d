//! End-to-end bridge runs against a shell-script prover

use admission_queue::{AdmissionQueue, CounterStore, MemoryCounterStore, QueueSettings};
use garaga_bridge::{Bridge, BridgeConfig, BridgeError, ProofRequest};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const QUEUE_KEY: &str = "e2e:slots";

/// Prover whose proof depends on the request context
const CONTEXT_PROVER: &str = r#"sum=$(cksum < "$GARAGA_CONTEXT_PATH" | cut -d' ' -f1)
printf '{"proof": [%s, "0x7"]}' "$sum" > "$GARAGA_PROOF_PATH"
printf '["5", "10", "20"]' > "$GARAGA_PUBLIC_INPUTS_PATH""#;

/// Prover that ignores the request
const STATIC_PROVER: &str = r#"printf '[1, 2, 3]' > "$GARAGA_PROOF_PATH"
printf '{"public_inputs": ["5", "10"]}' > "$GARAGA_PUBLIC_INPUTS_PATH""#;

struct Harness {
    _dir: TempDir,
    bridge: Bridge,
    store: Arc<MemoryCounterStore>,
}

fn harness(prover: &str, extra: &[(&str, &str)]) -> Harness {
    let dir = TempDir::new().unwrap();
    let (bridge, store) = bridge_in(dir.path(), prover, extra);
    Harness {
        _dir: dir,
        bridge,
        store,
    }
}

/// Bridge whose prover writes into `dir`
fn bridge_in(
    dir: &Path,
    prover: &str,
    extra: &[(&str, &str)],
) -> (Bridge, Arc<MemoryCounterStore>) {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("GARAGA_PROVE_CMD".to_string(), prover.to_string()),
        ("GARAGA_OUTPUT_DIR".to_string(), dir.display().to_string()),
        (
            "GARAGA_PUBLIC_INPUTS_PATH".to_string(),
            dir.join("public.json").display().to_string(),
        ),
    ]);
    for (name, value) in extra {
        vars.insert(name.to_string(), value.to_string());
    }
    let config = BridgeConfig::from_lookup(|name| vars.get(name).cloned()).unwrap();

    let store = Arc::new(MemoryCounterStore::new());
    let settings = QueueSettings {
        key: QUEUE_KEY.to_string(),
        ..config.queue.settings.clone()
    };
    let queue = AdmissionQueue::new(Arc::clone(&store) as Arc<dyn CounterStore>, settings);

    (Bridge::with_queue(config, Arc::new(queue)), store)
}

fn unqueued_bridge(vars: &HashMap<&str, String>) -> Bridge {
    let config = BridgeConfig::from_lookup(|name| vars.get(name).cloned()).unwrap();
    Bridge::with_queue(config, Arc::new(AdmissionQueue::disabled(QueueSettings::default())))
}

fn swap_request(amount: &str, nonce: &str) -> ProofRequest {
    ProofRequest::from_json(&format!(
        r#"{{"user_address":"0x111","verifier":"garaga","requested_at_unix":1000,
            "tx_context":{{"flow":"swap","from_token":"USDC","to_token":"ETH",
                "amount":"{}","nonce":"{}"}}}}"#,
        amount, nonce
    ))
    .unwrap()
}

#[tokio::test]
async fn test_distinct_swaps_get_distinct_dynamic_bindings() {
    let h = harness(CONTEXT_PROVER, &[("GARAGA_DYNAMIC_BINDING", "true")]);

    let first = h.bridge.bridge(&swap_request("100", "n1")).await.unwrap();
    let second = h.bridge.bridge(&swap_request("250", "n2")).await.unwrap();

    assert_ne!(first.intent_hash, second.intent_hash);
    assert_ne!(first.nullifier, second.nullifier);
    assert_ne!(first.commitment, second.commitment);
    assert_ne!(first.nullifier, first.commitment);

    // Binding is written into the default slots; the rest is untouched.
    assert_eq!(first.public_inputs.len(), 3);
    assert_eq!(first.public_inputs[0], first.nullifier);
    assert_eq!(first.public_inputs[1], first.commitment);
    assert_eq!(first.public_inputs[2].to_string(), "0x14");

    assert_ne!(first.proof, second.proof);
    assert_eq!(h.store.value(QUEUE_KEY), None);
}

#[tokio::test]
async fn test_extraction_binding_reads_slots() {
    let h = harness(CONTEXT_PROVER, &[]);
    let payload = h.bridge.bridge(&swap_request("100", "n1")).await.unwrap();

    assert_eq!(payload.nullifier.to_string(), "0x5");
    assert_eq!(payload.commitment.to_string(), "0xa");

    let json = serde_json::to_value(&payload).unwrap();
    assert_eq!(json["nullifier"], "0x5");
    assert_eq!(json["public_inputs"], serde_json::json!(["0x5", "0xa", "0x14"]));
    assert_eq!(json["proof"][1], "0x7");
    assert!(json["intent_hash"].as_str().unwrap().starts_with("0x"));
}

#[tokio::test]
async fn test_extraction_fails_on_short_public_inputs() {
    let h = harness(
        STATIC_PROVER,
        &[
            ("GARAGA_NULLIFIER_PUBLIC_INPUT_INDEX", "0"),
            ("GARAGA_COMMITMENT_PUBLIC_INPUT_INDEX", "4"),
        ],
    );
    let err = h.bridge.bridge(&swap_request("100", "n1")).await.unwrap_err();
    assert!(matches!(err, BridgeError::InsufficientPublicInputs { len: 2, required: 5, .. }));
}

#[tokio::test]
async fn test_prover_failure_releases_slot() {
    let h = harness("echo 'circuit exploded' >&2; exit 2", &[]);
    let err = h.bridge.bridge(&swap_request("100", "n1")).await.unwrap_err();

    match err {
        BridgeError::ProverCommand { stderr, .. } => assert!(stderr.contains("circuit exploded")),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(h.store.value(QUEUE_KEY), None);
}

#[tokio::test]
async fn test_prover_timeout() {
    let h = harness("sleep 5", &[("GARAGA_TIMEOUT_SECS", "1")]);
    let err = h.bridge.bridge(&swap_request("100", "n1")).await.unwrap_err();

    assert!(matches!(err, BridgeError::ProverTimeout { .. }));
    assert_eq!(h.store.value(QUEUE_KEY), None);
}

#[tokio::test]
async fn test_prover_that_writes_nothing_does_not_reuse_earlier_outputs() {
    let dir = TempDir::new().unwrap();
    let (writing, _) = bridge_in(dir.path(), STATIC_PROVER, &[]);
    writing.bridge(&swap_request("100", "n1")).await.unwrap();
    assert!(dir.path().join("proof.json").exists());

    let (silent, store) = bridge_in(dir.path(), "true", &[]);
    let err = silent.bridge(&swap_request("250", "n2")).await.unwrap_err();

    assert!(matches!(err, BridgeError::Artifact(_)));
    assert!(!dir.path().join("proof.json").exists());
    assert_eq!(store.value(QUEUE_KEY), None);
}

#[tokio::test]
async fn test_precomputed_payload_mode() {
    let dir = TempDir::new().unwrap();
    let payload_path = dir.path().join("payload.json");
    std::fs::write(
        &payload_path,
        r#"{"proof": ["0x10", "0x11"], "public_inputs": ["1", "2", "3"]}"#,
    )
    .unwrap();

    let vars: HashMap<&str, String> = HashMap::from([
        ("GARAGA_PRECOMPUTED_PAYLOAD_PATH", payload_path.display().to_string()),
        ("GARAGA_ALLOW_PRECOMPUTED_PAYLOAD", "true".to_string()),
        ("GARAGA_DYNAMIC_BINDING", "true".to_string()),
    ]);
    let bridge = unqueued_bridge(&vars);

    let payload = bridge.bridge(&swap_request("100", "n1")).await.unwrap();
    assert_eq!(payload.proof.len(), 2);
    assert_eq!(payload.public_inputs[0], payload.nullifier);
    assert_eq!(payload.public_inputs[2].to_string(), "0x3");
}

#[tokio::test]
async fn test_missing_prover_is_configuration_error() {
    let bridge = unqueued_bridge(&HashMap::new());

    let err = bridge.bridge(&ProofRequest::default()).await.unwrap_err();
    assert!(matches!(err, BridgeError::Configuration(_)));
}

#[tokio::test]
async fn test_self_test_passes_with_per_request_prover() {
    let h = harness(CONTEXT_PROVER, &[("GARAGA_DYNAMIC_BINDING", "1")]);
    let report = h.bridge.self_test(&ProofRequest::default()).await.unwrap();

    assert!(report.ok);
    assert!(!report.proofs_identical);
    assert_ne!(report.first.proof_sha256, report.second.proof_sha256);
    assert_ne!(report.first.intent_hash, report.second.intent_hash);
    assert_eq!(report.first.proof_len, 2);
    assert_eq!(report.first.public_inputs_len, 3);
}

#[tokio::test]
async fn test_self_test_flags_static_prover() {
    let h = harness(STATIC_PROVER, &[]);
    let report = h.bridge.self_test(&ProofRequest::default()).await.unwrap();

    assert!(!report.ok);
    assert!(report.proofs_identical);
    assert_eq!(report.first.proof_sha256, report.second.proof_sha256);
}

#[tokio::test]
async fn test_warmup_reports_sizes() {
    let h = harness(STATIC_PROVER, &[("GARAGA_WARMUP_TIMEOUT_SECS", "30")]);
    let report = h.bridge.warmup().await.unwrap();

    assert!(report.ok);
    assert_eq!(report.proof_len, 3);
    assert_eq!(report.public_inputs_len, 2);
}

#[tokio::test]
async fn test_prove_mode_validates_outputs() {
    let dir = TempDir::new().unwrap();
    let proof = dir.path().join("nested/proof.json");
    let public = dir.path().join("nested/public.json");
    let real_prover = r#"printf '{"pi_a": [], "pi_b": [], "pi_c": []}' > "$GARAGA_PROOF_PATH"
printf '[]' > "$GARAGA_PUBLIC_INPUTS_PATH""#;

    let vars: HashMap<&str, String> = HashMap::from([
        ("GARAGA_REAL_PROVER_CMD", real_prover.to_string()),
        ("GARAGA_PROOF_PATH", proof.display().to_string()),
        ("GARAGA_PUBLIC_INPUTS_PATH", public.display().to_string()),
    ]);
    let bridge = unqueued_bridge(&vars);

    let report = bridge.prove().await.unwrap();
    assert!(report.ok);
    assert_eq!(report.proof_path, proof);
    assert_eq!(report.public_inputs_path, public);
}

#[tokio::test]
async fn test_prove_mode_rejects_missing_output() {
    let dir = TempDir::new().unwrap();
    let vars: HashMap<&str, String> = HashMap::from([
        ("GARAGA_REAL_PROVER_CMD", "true".to_string()),
        ("GARAGA_PROOF_PATH", dir.path().join("proof.json").display().to_string()),
        ("GARAGA_PUBLIC_INPUTS_PATH", dir.path().join("public.json").display().to_string()),
    ]);
    let bridge = unqueued_bridge(&vars);

    let err = bridge.prove().await.unwrap_err();
    assert!(matches!(err, BridgeError::Artifact(_)));
}

#[tokio::test]
async fn test_prove_mode_ignores_outputs_from_earlier_run() {
    let dir = TempDir::new().unwrap();
    let proof = dir.path().join("proof.json");
    let public = dir.path().join("public.json");
    std::fs::write(&proof, r#"{"pi_a": [], "pi_b": [], "pi_c": []}"#).unwrap();
    std::fs::write(&public, "[]").unwrap();

    let vars: HashMap<&str, String> = HashMap::from([
        ("GARAGA_REAL_PROVER_CMD", "true".to_string()),
        ("GARAGA_PROOF_PATH", proof.display().to_string()),
        ("GARAGA_PUBLIC_INPUTS_PATH", public.display().to_string()),
    ]);
    let bridge = unqueued_bridge(&vars);

    let err = bridge.prove().await.unwrap_err();
    assert!(matches!(err, BridgeError::Artifact(_)));
    assert!(!proof.exists());
}
