use std::time::Duration;

use serde_json::{json, Value};

pub const RPC_TIMEOUT_SECS: u64 = 20;

pub fn read_json_or_text(resp: &mut ureq::http::Response<ureq::Body>) -> Value {
    let text = resp
        .body_mut()
        .read_to_string()
        .unwrap_or_else(|_| String::new());
    serde_json::from_str::<Value>(&text).unwrap_or_else(|_| json!({ "raw": text }))
}

pub fn rpc_json(rpc_url: &str, payload: Value, timeout: Duration) -> Result<Value, String> {
    let request = ureq::post(rpc_url)
        .header("content-type", "application/json")
        .config()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build();
    let mut resp = request
        .send_json(payload)
        .map_err(|e| format!("RPC request failed ({rpc_url}): {e}"))?;
    let status = resp.status().as_u16();
    let body = read_json_or_text(&mut resp);
    if status >= 400 {
        return Err(format!("RPC HTTP failure ({status}): {body}"));
    }
    if let Some(err) = body.get("error") {
        return Err(format!("RPC error: {err}"));
    }
    body.get("result")
        .cloned()
        .ok_or("RPC response missing result".to_string())
}

pub fn rpc_call(
    rpc_url: &str,
    method: &str,
    params: Value,
    timeout: Duration,
) -> Result<Value, String> {
    let payload = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });
    rpc_json(rpc_url, payload, timeout)
}

pub fn rpc_string(
    rpc_url: &str,
    method: &str,
    params: Value,
    timeout: Duration,
) -> Result<String, String> {
    let result = rpc_call(rpc_url, method, params, timeout)?;
    result
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| format!("{method} returned non-string result: {result}"))
}

pub fn eth_call(
    rpc_url: &str,
    to: &str,
    data: &[u8],
    timeout: Duration,
) -> Result<Vec<u8>, String> {
    let params = json!([
        {
            "to": to,
            "data": format!("0x{}", hex::encode(data)),
        },
        "latest",
    ]);
    let hex = rpc_string(rpc_url, "eth_call", params, timeout)?;
    parse_hex_bytes(&hex)
}

pub fn strip_0x(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

pub fn parse_hex_bytes(value: &str) -> Result<Vec<u8>, String> {
    let clean = strip_0x(value);
    if clean.is_empty() {
        return Ok(Vec::new());
    }
    hex::decode(clean).map_err(|e| format!("invalid hex bytes '{value}': {e}"))
}

pub fn parse_hex_u64(value: &str) -> Result<u64, String> {
    let clean = strip_0x(value.trim());
    if clean.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(clean, 16).map_err(|e| format!("invalid hex quantity '{value}': {e}"))
}

pub fn parse_hex_u128(value: &str) -> Result<u128, String> {
    let clean = strip_0x(value.trim());
    if clean.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(clean, 16).map_err(|e| format!("invalid hex quantity '{value}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_hex_is_empty_bytes() {
        assert_eq!(parse_hex_bytes("0x").unwrap(), Vec::<u8>::new());
        assert_eq!(parse_hex_bytes("0x0a0b").unwrap(), vec![0x0a, 0x0b]);
    }

    #[test]
    fn parses_quantities() {
        assert_eq!(parse_hex_u64("0x2a").unwrap(), 42);
        assert_eq!(parse_hex_u64("0x").unwrap(), 0);
        assert_eq!(parse_hex_u128("0X3B9ACA00").unwrap(), 1_000_000_000);
        assert!(parse_hex_u64("0xnothex").is_err());
    }
}
