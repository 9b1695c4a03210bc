//! Hiro-compatible HTTP ledger client.
//!
//! Async HTTP client using `reqwest`. Transactions are built by an injected
//! [`TransactionEncoder`]; this client only fetches nonces and broadcasts.

use std::sync::Arc;
use std::time::Duration;

use orbit_protocol::constants::LEDGER_REQUEST_TIMEOUT;
use orbit_protocol::{
    AccountState, Artifact, ContractId, Credential, LedgerClient, LedgerError, LedgerFuture,
    Network, NetworkConfig, NetworkInfo, ReadOnlyQuery, TxId, TxStatus,
};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::encoder::{DeployRequest, TransactionEncoder};
use crate::wire;

/// Default deploy fee in micro-units.
pub const DEFAULT_DEPLOY_FEE: u64 = 100_000;

/// Tunables for [`HttpLedgerClient`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpLedgerOptions {
    #[serde(with = "orbit_protocol::duration::secs")]
    pub request_timeout: Duration,
    /// Fee attached to every deploy transaction, in micro-units.
    pub deploy_fee: u64,
}

impl Default for HttpLedgerOptions {
    fn default() -> Self {
        Self {
            request_timeout: LEDGER_REQUEST_TIMEOUT,
            deploy_fee: DEFAULT_DEPLOY_FEE,
        }
    }
}

/// [`LedgerClient`] over the Hiro REST API.
pub struct HttpLedgerClient {
    http: reqwest::Client,
    base_url: String,
    network: Network,
    deployer: String,
    encoder: Arc<dyn TransactionEncoder>,
    deploy_fee: u64,
    /// Next nonce to use; `None` until fetched (or after a nonce rejection).
    next_nonce: Mutex<Option<u64>>,
}

fn transport(e: reqwest::Error) -> LedgerError {
    if e.is_timeout() {
        LedgerError::Timeout
    } else {
        LedgerError::Transport(e.to_string())
    }
}

impl HttpLedgerClient {
    pub fn new(
        config: &NetworkConfig,
        encoder: Arc<dyn TransactionEncoder>,
        options: HttpLedgerOptions,
    ) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(transport)?;

        Ok(Self {
            http,
            base_url: config.api_url().to_string(),
            network: config.network,
            deployer: config.deployer_address.clone(),
            encoder,
            deploy_fee: options.deploy_fee,
            next_nonce: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn check(resp: reqwest::Response, what: &str) -> Result<reqwest::Response, LedgerError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(LedgerError::NotFound(what.to_string()));
        }
        let body = resp.text().await.unwrap_or_default();
        Err(LedgerError::Api {
            status: status.as_u16(),
            body,
        })
    }

    /// Performs a GET and decodes the JSON body.
    async fn get(&self, endpoint: &str, what: &str) -> Result<Value, LedgerError> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(%url, "GET");
        let resp = self.http.get(&url).send().await.map_err(transport)?;
        let resp = Self::check(resp, what).await?;
        resp.json::<Value>()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))
    }

    async fn fetch_account(&self, address: &str) -> Result<AccountState, LedgerError> {
        let body = self
            .get(&format!("/v2/accounts/{address}?proof=0"), address)
            .await?;
        wire::parse_account(address, &body)
    }

    async fn broadcast(&self, tx: Vec<u8>) -> Result<TxId, LedgerError> {
        let url = format!("{}/v2/transactions", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(tx)
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        let body = resp.text().await.map_err(transport)?;
        if status.is_success() {
            return wire::parse_broadcast(&body);
        }
        if status == reqwest::StatusCode::BAD_REQUEST {
            return Err(LedgerError::Rejected {
                reason: wire::rejection_reason(&body),
            });
        }
        Err(LedgerError::Api {
            status: status.as_u16(),
            body,
        })
    }

    async fn submit_inner(
        &self,
        artifact: &Artifact,
        source: &str,
        credential: &Credential,
    ) -> Result<TxId, LedgerError> {
        // Held across encode + broadcast so concurrent submissions get
        // consecutive nonces.
        let mut next_nonce = self.next_nonce.lock().await;
        let nonce = match *next_nonce {
            Some(n) => n,
            None => self.fetch_account(&self.deployer).await?.nonce,
        };

        let request = DeployRequest {
            network: self.network,
            contract_name: &artifact.id,
            source,
            deployer: &self.deployer,
            nonce,
            fee: self.deploy_fee,
            credential,
        };
        let tx = self
            .encoder
            .encode_deploy(&request)
            .map_err(|e| LedgerError::Rejected {
                reason: e.to_string(),
            })?;

        match self.broadcast(tx).await {
            Ok(tx_id) => {
                *next_nonce = Some(nonce + 1);
                info!(artifact = %artifact.id, tx = %tx_id, nonce, "deploy broadcast");
                Ok(tx_id)
            }
            Err(LedgerError::Rejected { reason }) => {
                if reason.to_ascii_lowercase().contains("nonce") {
                    *next_nonce = None;
                } else {
                    *next_nonce = Some(nonce);
                }
                warn!(artifact = %artifact.id, %reason, "deploy rejected");
                Err(LedgerError::Rejected { reason })
            }
            Err(e) => {
                *next_nonce = Some(nonce);
                Err(e)
            }
        }
    }

    async fn read_only(&self, query: &ReadOnlyQuery) -> Result<Value, LedgerError> {
        let ContractId { deployer, name } = &query.contract;
        let Some(function) = &query.function else {
            return self
                .get(
                    &format!("/v2/contracts/interface/{deployer}/{name}"),
                    &query.contract.to_string(),
                )
                .await;
        };

        let url = format!(
            "{}/v2/contracts/call-read/{deployer}/{name}/{function}",
            self.base_url
        );
        let body = serde_json::json!({
            "sender": query.sender.as_deref().unwrap_or(&self.deployer),
            "arguments": query.args,
        });
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let resp = Self::check(resp, &query.contract.to_string()).await?;
        let value: Value = resp
            .json()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))?;

        if value.get("okay").and_then(Value::as_bool) == Some(false) {
            let cause = value
                .get("cause")
                .and_then(Value::as_str)
                .unwrap_or("read-only call failed");
            return Err(LedgerError::Rejected {
                reason: cause.to_string(),
            });
        }
        Ok(value)
    }
}

impl LedgerClient for HttpLedgerClient {
    fn network(&self) -> Network {
        self.network
    }

    fn submit<'a>(
        &'a self,
        artifact: &'a Artifact,
        source: &'a str,
        credential: &'a Credential,
    ) -> LedgerFuture<'a, TxId> {
        Box::pin(self.submit_inner(artifact, source, credential))
    }

    fn get_account<'a>(&'a self, address: &'a str) -> LedgerFuture<'a, AccountState> {
        Box::pin(self.fetch_account(address))
    }

    fn get_transaction<'a>(&'a self, tx_id: &'a str) -> LedgerFuture<'a, TxStatus> {
        Box::pin(async move {
            let body = self.get(&format!("/v2/transactions/{tx_id}"), tx_id).await?;
            wire::parse_transaction(tx_id, &body)
        })
    }

    fn call_read_only<'a>(&'a self, query: &'a ReadOnlyQuery) -> LedgerFuture<'a, Value> {
        Box::pin(self.read_only(query))
    }

    fn get_deployed_contracts<'a>(&'a self, address: &'a str) -> LedgerFuture<'a, Vec<ContractId>> {
        Box::pin(async move {
            let body = self
                .get(&format!("/v2/accounts/{address}/contracts"), address)
                .await?;
            wire::parse_contracts(&body)
        })
    }

    fn get_network_info(&self) -> LedgerFuture<'_, NetworkInfo> {
        Box::pin(async move {
            let body = self.get("/v2/info", "info").await?;
            wire::parse_info(&body)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::EncodeError;
    use orbit_protocol::Category;
    use std::sync::Mutex as StdMutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Encoder that records the nonces it was asked to sign.
    #[derive(Default)]
    struct RecordingEncoder {
        nonces: StdMutex<Vec<u64>>,
    }

    impl TransactionEncoder for RecordingEncoder {
        fn encode_deploy(&self, request: &DeployRequest<'_>) -> Result<Vec<u8>, EncodeError> {
            self.nonces.lock().unwrap().push(request.nonce);
            Ok(format!("{}:{}", request.contract_name, request.nonce).into_bytes())
        }
    }

    fn header_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n")
    }

    fn content_length(head: &str) -> usize {
        head.lines()
            .filter_map(|l| l.split_once(':'))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Serves one canned response per connection and returns the request
    /// lines it saw.
    async fn stub_server(
        responses: Vec<(u16, &'static str)>,
    ) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut seen = Vec::new();
            for (status, body) in responses {
                let (mut sock, _) = listener.accept().await.unwrap();
                let mut req = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    let n = sock.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    req.extend_from_slice(&buf[..n]);
                    if let Some(end) = header_end(&req) {
                        let head = String::from_utf8_lossy(&req[..end]).to_string();
                        if req.len() >= end + 4 + content_length(&head) {
                            break;
                        }
                    }
                }
                let text = String::from_utf8_lossy(&req).to_string();
                seen.push(text.lines().next().unwrap_or_default().to_string());

                let resp = format!(
                    "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                sock.write_all(resp.as_bytes()).await.unwrap();
                sock.shutdown().await.ok();
            }
            seen
        });
        (format!("http://{addr}"), handle)
    }

    fn client(url: &str, encoder: Arc<dyn TransactionEncoder>) -> HttpLedgerClient {
        let mut config = NetworkConfig::new(Network::Devnet, "ST1DEPLOYER", Credential::new("key"));
        config.api_url = Some(url.to_string());
        HttpLedgerClient::new(&config, encoder, HttpLedgerOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn submit_fetches_nonce_once_then_increments() {
        let (url, server) = stub_server(vec![
            (200, r#"{"balance":"0x0","locked":"0x0","nonce":3}"#),
            (200, r#""0xaaa""#),
            (200, r#""0xbbb""#),
        ])
        .await;
        let encoder = Arc::new(RecordingEncoder::default());
        let client = client(&url, encoder.clone());
        let cred = Credential::new("key");

        let a = Artifact::new("a", "a.clar", Category::General);
        let b = Artifact::new("b", "b.clar", Category::General);
        assert_eq!(client.submit(&a, "(a)", &cred).await.unwrap(), "0xaaa");
        assert_eq!(client.submit(&b, "(b)", &cred).await.unwrap(), "0xbbb");

        assert_eq!(*encoder.nonces.lock().unwrap(), vec![3, 4]);
        let seen = server.await.unwrap();
        assert!(seen[0].starts_with("GET /v2/accounts/ST1DEPLOYER"));
        assert!(seen[1].starts_with("POST /v2/transactions"));
        assert!(seen[2].starts_with("POST /v2/transactions"));
    }

    #[tokio::test]
    async fn broadcast_400_is_rejection() {
        let (url, server) = stub_server(vec![
            (200, r#"{"balance":"0x0","locked":"0x0","nonce":0}"#),
            (400, r#"{"error":"transaction rejected","reason":"ContractAlreadyExists"}"#),
        ])
        .await;
        let client = client(&url, Arc::new(RecordingEncoder::default()));
        let a = Artifact::new("a", "a.clar", Category::General);

        let err = client.submit(&a, "(a)", &Credential::new("key")).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::Rejected {
                reason: "ContractAlreadyExists".into()
            }
        );
        assert!(!err.is_retryable());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn status_codes_map_to_errors() {
        let (url, server) = stub_server(vec![(404, "{}"), (503, "down")]).await;
        let client = client(&url, Arc::new(RecordingEncoder::default()));

        assert!(matches!(
            client.get_transaction("0x1").await,
            Err(LedgerError::NotFound(_))
        ));
        let err = client.get_network_info().await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::Api {
                status: 503,
                body: "down".into()
            }
        );
        assert!(err.is_retryable());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn interface_query_uses_get() {
        let (url, server) = stub_server(vec![(200, r#"{"functions":[]}"#)]).await;
        let client = client(&url, Arc::new(RecordingEncoder::default()));
        let query = ReadOnlyQuery::interface(ContractId::new("ST1DEPLOYER", "token"));

        let value = client.call_read_only(&query).await.unwrap();
        assert!(value.get("functions").is_some());
        let seen = server.await.unwrap();
        assert!(seen[0].starts_with("GET /v2/contracts/interface/ST1DEPLOYER/token"));
    }

    #[tokio::test]
    async fn unreachable_node_is_transport_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client(&format!("http://{addr}"), Arc::new(RecordingEncoder::default()));
        let err = client.get_account("ST1").await.unwrap_err();
        assert!(err.is_retryable(), "{err:?}");
    }
}
