//! Intent hashing
//!
//! The intent hash commits to the user-visible parameters of a transaction.
//! Each recognized flow owns its preimage layout, so the field order is fixed
//! per variant and a new flow is a new variant.

use crate::request::ProofRequest;
use felt_artifacts::FieldElement;
use rand::Rng;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Transaction intent extracted from `tx_context`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowIntent {
    Swap {
        from_token: String,
        to_token: String,
        amount: String,
    },
    LimitOrder {
        from_token: String,
        to_token: String,
        amount: String,
        price: String,
    },
    Stake {
        token: String,
        amount: String,
        pool: String,
    },
    /// Unrecognized flow, committed to as canonical JSON of the whole context
    Other { canonical_context: String },
}

impl FlowIntent {
    /// Classify a transaction context by its `flow` (or `action_type`) field
    pub fn from_context(context: &Map<String, Value>) -> Self {
        let discriminator = context
            .get("flow")
            .map(field_text)
            .filter(|flow| !flow.trim().is_empty())
            .or_else(|| context.get("action_type").map(field_text))
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let field = |name: &str| context.get(name).map(field_text).unwrap_or_default();

        match discriminator.as_str() {
            "swap" => FlowIntent::Swap {
                from_token: field("from_token"),
                to_token: field("to_token"),
                amount: field("amount"),
            },
            "limit" | "limit_order" | "limit-order" => FlowIntent::LimitOrder {
                from_token: field("from_token"),
                to_token: field("to_token"),
                amount: field("amount"),
                price: field("price"),
            },
            "stake" => {
                let token = first_non_empty(&[field("token"), field("from_token")]);
                let pool = first_non_empty(&[field("pool"), field("to_token"), token.clone()]);
                FlowIntent::Stake {
                    token,
                    amount: field("amount"),
                    pool,
                }
            }
            _ => FlowIntent::Other {
                canonical_context: Value::Object(context.clone()).to_string(),
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FlowIntent::Swap { .. } => "swap",
            FlowIntent::LimitOrder { .. } => "limit_order",
            FlowIntent::Stake { .. } => "stake",
            FlowIntent::Other { .. } => "other",
        }
    }

    /// Ordered preimage fields, address first and nonce last
    pub fn preimage(&self, address: &str, nonce: &str) -> Vec<String> {
        let mut fields = vec![address.to_ascii_lowercase()];
        match self {
            FlowIntent::Swap {
                from_token,
                to_token,
                amount,
            } => fields.extend([from_token.clone(), to_token.clone(), amount.clone()]),
            FlowIntent::LimitOrder {
                from_token,
                to_token,
                amount,
                price,
            } => fields.extend([
                from_token.clone(),
                to_token.clone(),
                amount.clone(),
                price.clone(),
            ]),
            FlowIntent::Stake {
                token,
                amount,
                pool,
            } => fields.extend([token.clone(), amount.clone(), pool.clone()]),
            FlowIntent::Other { canonical_context } => fields.push(canonical_context.clone()),
        }
        fields.push(nonce.to_string());
        fields
    }
}

/// Derived intent for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub flow: FlowIntent,
    pub hash: FieldElement,
    pub nonce: String,
}

/// Derive the intent hash and nonce of a request
///
/// # Arguments
/// * `request` - Incoming proof request
///
/// # Returns
/// The classified flow, `felt(sha256(field_1|...|field_n))` and the resolved
/// nonce. Deterministic whenever the request carries a nonce or a timestamp.
pub fn derive_intent(request: &ProofRequest) -> Intent {
    let flow = FlowIntent::from_context(&request.tx_context);
    let nonce = resolve_nonce(request);
    let preimage = flow.preimage(&request.user_address, &nonce).join("|");
    let hash = FieldElement::from_digest(&Sha256::digest(preimage.as_bytes()));

    tracing::debug!("Derived {} intent hash {} (nonce {})", flow.kind(), hash, nonce);

    Intent { flow, hash, nonce }
}

/// Nonce resolution: `tx_context.nonce`, then `requested_at_unix`, then a
/// process-local unique fallback
fn resolve_nonce(request: &ProofRequest) -> String {
    if let Some(nonce) = request
        .tx_context
        .get("nonce")
        .map(field_text)
        .filter(|nonce| !nonce.trim().is_empty())
    {
        return nonce;
    }
    if let Some(requested_at) = request.requested_at_unix {
        return requested_at.to_string();
    }

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    let salt: [u8; 8] = rand::thread_rng().gen();
    format!("{}-{}", nanos, hex::encode(salt))
}

/// Preimage text of one context field
///
/// Strings verbatim, numbers by their JSON text, null as empty, everything
/// else as canonical JSON.
fn field_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn first_non_empty(candidates: &[String]) -> String {
    candidates
        .iter()
        .find(|candidate| !candidate.is_empty())
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(context: Value) -> ProofRequest {
        ProofRequest {
            user_address: "0x111".to_string(),
            verifier: "garaga".to_string(),
            requested_at_unix: Some(1000),
            tx_context: context.as_object().cloned().unwrap_or_default(),
        }
    }

    fn expected_hash(preimage: &str) -> FieldElement {
        FieldElement::from_digest(&Sha256::digest(preimage.as_bytes()))
    }

    #[test]
    fn test_swap_preimage_layout() {
        let req = request(json!({
            "flow": "swap", "from_token": "USDC", "to_token": "ETH", "amount": "100", "nonce": "n1"
        }));
        let intent = derive_intent(&req);

        assert_eq!(intent.nonce, "n1");
        assert_eq!(intent.flow.kind(), "swap");
        assert_eq!(intent.hash, expected_hash("0x111|USDC|ETH|100|n1"));
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let req = request(json!({"flow": "swap", "amount": "100", "nonce": "n1"}));
        assert_eq!(derive_intent(&req), derive_intent(&req));
    }

    #[test]
    fn test_flow_change_changes_hash() {
        let swap = request(json!({
            "flow": "swap", "from_token": "USDC", "to_token": "ETH", "amount": "100", "nonce": "n1"
        }));
        let stake = request(json!({
            "flow": "stake", "from_token": "USDC", "to_token": "ETH", "amount": "100", "nonce": "n1"
        }));
        assert_ne!(derive_intent(&swap).hash, derive_intent(&stake).hash);
    }

    #[test]
    fn test_address_is_lowercased() {
        let mut upper = request(json!({"flow": "swap", "nonce": "n1"}));
        upper.user_address = "0xABCDEF".to_string();
        let mut lower = upper.clone();
        lower.user_address = "0xabcdef".to_string();
        assert_eq!(derive_intent(&upper).hash, derive_intent(&lower).hash);
    }

    #[test]
    fn test_stake_fallbacks() {
        let flow = FlowIntent::from_context(
            json!({"flow": "STAKE", "from_token": "STRK", "amount": 5})
                .as_object()
                .unwrap(),
        );
        assert_eq!(
            flow,
            FlowIntent::Stake {
                token: "STRK".to_string(),
                amount: "5".to_string(),
                pool: "STRK".to_string(),
            }
        );

        let flow = FlowIntent::from_context(
            json!({"flow": "stake", "token": "STRK", "to_token": "POOL-A", "pool": null})
                .as_object()
                .unwrap(),
        );
        assert!(matches!(flow, FlowIntent::Stake { ref pool, .. } if pool == "POOL-A"));
    }

    #[test]
    fn test_limit_order_aliases_and_action_type() {
        for name in ["limit", "limit_order", "Limit-Order"] {
            let flow = FlowIntent::from_context(json!({"action_type": name}).as_object().unwrap());
            assert_eq!(flow.kind(), "limit_order", "alias {}", name);
        }

        let flow = FlowIntent::from_context(
            json!({"flow": "swap", "action_type": "stake"}).as_object().unwrap(),
        );
        assert_eq!(flow.kind(), "swap");
    }

    #[test]
    fn test_limit_order_includes_price() {
        let req = request(json!({
            "flow": "limit", "from_token": "A", "to_token": "B",
            "amount": "1", "price": "2.5", "nonce": "x"
        }));
        assert_eq!(derive_intent(&req).hash, expected_hash("0x111|A|B|1|2.5|x"));
    }

    #[test]
    fn test_unknown_flow_uses_canonical_context() {
        let req = request(json!({"zeta": 1, "alpha": {"b": true, "a": null}, "nonce": "k"}));
        let intent = derive_intent(&req);

        assert_eq!(intent.flow.kind(), "other");
        assert_eq!(
            intent.hash,
            expected_hash(r#"0x111|{"alpha":{"a":null,"b":true},"nonce":"k","zeta":1}|k"#)
        );
    }

    #[test]
    fn test_nonce_resolution_order() {
        let req = request(json!({"flow": "swap"}));
        assert_eq!(derive_intent(&req).nonce, "1000");

        let mut req = request(json!({"flow": "swap", "nonce": ""}));
        req.requested_at_unix = None;
        let first = derive_intent(&req).nonce;
        let second = derive_intent(&req).nonce;
        assert!(!first.is_empty());
        assert_ne!(first, second);
    }
}
