//! Hiro API response parsing.

use orbit_protocol::{AccountState, ContractId, LedgerError, NetworkInfo, TxState, TxStatus};
use serde_json::Value;

fn decode(msg: impl Into<String>) -> LedgerError {
    LedgerError::Decode(msg.into())
}

/// Parses a micro-unit amount given as a number, a decimal string, or a
/// `0x`-prefixed hex string (as `/v2/accounts` returns it).
pub fn parse_amount(value: &Value) -> Result<u64, LedgerError> {
    match value {
        Value::Number(n) => n.as_u64().ok_or_else(|| decode(format!("bad amount {n}"))),
        Value::String(s) => {
            let parsed = match s.strip_prefix("0x") {
                Some(hex) => u128::from_str_radix(hex, 16),
                None => s.parse::<u128>(),
            };
            let amount = parsed.map_err(|e| decode(format!("bad amount {s:?}: {e}")))?;
            u64::try_from(amount).map_err(|_| decode(format!("amount out of range: {s}")))
        }
        Value::Null => Ok(0),
        other => Err(decode(format!("bad amount {other}"))),
    }
}

/// `GET /v2/accounts/{address}`
pub fn parse_account(address: &str, body: &Value) -> Result<AccountState, LedgerError> {
    let balance = parse_amount(body.get("balance").unwrap_or(&Value::Null))?;
    let locked = parse_amount(body.get("locked").unwrap_or(&Value::Null))?;
    let nonce = body
        .get("nonce")
        .and_then(Value::as_u64)
        .ok_or_else(|| decode("account response missing nonce"))?;
    Ok(AccountState {
        address: address.to_string(),
        balance,
        locked,
        nonce,
    })
}

/// `GET /v2/transactions/{tx_id}`
pub fn parse_transaction(tx_id: &str, body: &Value) -> Result<TxStatus, LedgerError> {
    let raw = body
        .get("tx_status")
        .and_then(Value::as_str)
        .ok_or_else(|| decode("transaction response missing tx_status"))?;
    let result = match body.get("tx_result") {
        Some(Value::Object(map)) => map.get("repr").and_then(Value::as_str).map(str::to_string),
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    };
    Ok(TxStatus {
        tx_id: body
            .get("tx_id")
            .and_then(Value::as_str)
            .unwrap_or(tx_id)
            .to_string(),
        state: TxState::from_api(raw),
        block_height: body.get("block_height").and_then(Value::as_u64),
        result,
    })
}

/// `GET /v2/accounts/{address}/contracts`; entries may be objects with a
/// `contract_id` or bare strings.
pub fn parse_contracts(body: &Value) -> Result<Vec<ContractId>, LedgerError> {
    let list = match body {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("contracts") {
            Some(Value::Array(items)) => items,
            _ => return Ok(Vec::new()),
        },
        _ => return Err(decode("unexpected contracts response")),
    };
    let mut contracts: Vec<ContractId> = list
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.as_str()),
            Value::Object(map) => map.get("contract_id").and_then(Value::as_str),
            _ => None,
        })
        .map(|s| s.parse::<ContractId>().map_err(|e| decode(format!("{e}"))))
        .collect::<Result<_, _>>()?;
    contracts.sort();
    contracts.dedup();
    Ok(contracts)
}

/// `GET /v2/info`
pub fn parse_info(body: &Value) -> Result<NetworkInfo, LedgerError> {
    let network_id = body
        .get("network_id")
        .and_then(Value::as_u64)
        .ok_or_else(|| decode("info response missing network_id"))?;
    Ok(NetworkInfo {
        network_id: u32::try_from(network_id)
            .map_err(|_| decode(format!("network_id out of range: {network_id}")))?,
        block_height: body
            .get("stacks_tip_height")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        server_version: body
            .get("server_version")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// `POST /v2/transactions` success body: a JSON string tx id.
pub fn parse_broadcast(body: &str) -> Result<String, LedgerError> {
    let trimmed = body.trim();
    let tx_id = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::String(s)) => s,
        Ok(Value::Object(map)) => map
            .get("txid")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| decode("broadcast response missing txid"))?,
        _ => trimmed.trim_matches('"').to_string(),
    };
    if tx_id.is_empty() {
        return Err(decode("empty tx id"));
    }
    Ok(tx_id)
}

/// Extracts the rejection reason from a `400` broadcast body.
pub fn rejection_reason(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map
            .get("reason")
            .or_else(|| map.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
        _ => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn amounts_in_all_encodings() {
        assert_eq!(parse_amount(&json!("0x00000000000000000000000000989680")).unwrap(), 10_000_000);
        assert_eq!(parse_amount(&json!("2500000")).unwrap(), 2_500_000);
        assert_eq!(parse_amount(&json!(42)).unwrap(), 42);
        assert_eq!(parse_amount(&Value::Null).unwrap(), 0);
        assert!(parse_amount(&json!("0xzz")).is_err());
    }

    #[test]
    fn account_response() {
        let body = json!({
            "balance": "0x000000000000000000000000001e8480",
            "locked": "0x00000000000000000000000000000000",
            "nonce": 7,
            "balance_proof": ""
        });
        let account = parse_account("ST1", &body).unwrap();
        assert_eq!(account.balance, 2_000_000);
        assert_eq!(account.locked, 0);
        assert_eq!(account.nonce, 7);
    }

    #[test]
    fn transaction_states() {
        let body = json!({
            "tx_id": "0xabc",
            "tx_status": "abort_by_response",
            "block_height": 120,
            "tx_result": { "hex": "0x08", "repr": "(err u1)" }
        });
        let status = parse_transaction("0xabc", &body).unwrap();
        assert_eq!(status.state, TxState::AbortByResponse);
        assert_eq!(status.block_height, Some(120));
        assert_eq!(status.result.as_deref(), Some("(err u1)"));

        let pending = parse_transaction("0xdef", &json!({ "tx_status": "pending" })).unwrap();
        assert_eq!(pending.tx_id, "0xdef");
        assert!(!pending.state.is_terminal());
    }

    #[test]
    fn contracts_response_shapes() {
        let body = json!({ "contracts": [
            { "contract_id": "ST1.token" },
            { "contract_id": "ST1.all-traits" },
            { "contract_id": "ST1.token" }
        ]});
        let ids: Vec<String> = parse_contracts(&body).unwrap().iter().map(|c| c.to_string()).collect();
        assert_eq!(ids, vec!["ST1.all-traits", "ST1.token"]);

        let bare = json!(["ST1.a"]);
        assert_eq!(parse_contracts(&bare).unwrap().len(), 1);
    }

    #[test]
    fn info_response() {
        let info = parse_info(&json!({
            "network_id": 2147483648u64,
            "stacks_tip_height": 1500,
            "server_version": "stacks-node 2.5"
        }))
        .unwrap();
        assert_eq!(info.network_id, 2_147_483_648);
        assert_eq!(info.block_height, 1500);
    }

    #[test]
    fn broadcast_bodies() {
        assert_eq!(parse_broadcast("\"0x1234\"").unwrap(), "0x1234");
        assert_eq!(parse_broadcast("{\"txid\":\"0x99\"}").unwrap(), "0x99");
        assert!(parse_broadcast("\"\"").is_err());
        assert_eq!(
            rejection_reason(r#"{"error":"transaction rejected","reason":"ContractAlreadyExists"}"#),
            "ContractAlreadyExists"
        );
        assert_eq!(rejection_reason("plain text"), "plain text");
    }
}
