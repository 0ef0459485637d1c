//! Adapter for a `defid` node and its wallet.
//!
//! One client covers all four collaborator traits: account and token
//! queries, wallet coin selection, wallet signing and broadcast. EVM-side
//! balances go through the node's Ethereum JSON-RPC endpoint.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use crate::domain::{
    AccountLookup, Amount, AppError, BlockchainError, COIN, Domain, DomainAddress, FundingProvider,
    Network, NetworkSubmitter, OutPoint, SignedTransaction, TokenBalance, TokenInfo,
    Transaction, TransactionId, TransactionSigner, TransferDomainPayload, TransferLeg,
    UnsignedTransaction, UnspentOutput, ValidationError,
};

use super::client::JsonRpcClient;

/// Fee rate used when the node cannot estimate one (0.0001 DFI per kvB).
pub const DEFAULT_FALLBACK_FEE_RATE: i64 = 10_000;

/// Highest fallback fee rate accepted from configuration (1 DFI per kvB).
pub const MAX_FALLBACK_FEE_RATE: i64 = COIN;

/// Blocks within which `estimatesmartfee` should aim to confirm.
const CONFIRMATION_TARGET: u32 = 6;

/// EVM balances carry 18 decimals, DVM amounts carry 8.
const WEI_PER_UNIT: u128 = 10_000_000_000;

/// `balanceOf(address)`
const BALANCE_OF_SELECTOR: &str = "70a08231";

const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;

pub struct DefidClient {
    rpc: JsonRpcClient,
    evm_rpc: Option<JsonRpcClient>,
    network: Network,
    fallback_fee_rate: Amount,
}

impl DefidClient {
    #[must_use]
    pub fn new(rpc: JsonRpcClient, network: Network) -> Self {
        Self {
            rpc,
            evm_rpc: None,
            network,
            fallback_fee_rate: Amount::from_units(DEFAULT_FALLBACK_FEE_RATE)
                .unwrap_or(Amount::ZERO),
        }
    }

    /// Route `eth_*` calls to a separate endpoint.
    #[must_use]
    pub fn with_evm_rpc(mut self, evm_rpc: JsonRpcClient) -> Self {
        self.evm_rpc = Some(evm_rpc);
        self
    }

    #[must_use]
    pub fn with_fallback_fee_rate(mut self, rate: Amount) -> Self {
        self.fallback_fee_rate = rate;
        self
    }

    fn evm(&self) -> &JsonRpcClient {
        self.evm_rpc.as_ref().unwrap_or(&self.rpc)
    }

    async fn dvm_balance(&self, address: &DomainAddress, token_id: u32) -> Result<Amount, AppError> {
        let balances: HashMap<String, Value> = self
            .rpc
            .call(
                "getaccount",
                json!([address.render(self.network), {}, true]),
            )
            .await?;
        match balances.get(&token_id.to_string()) {
            Some(value) => parse_amount(value),
            None => Ok(Amount::ZERO),
        }
    }

    async fn evm_balance(&self, address: &[u8; 20], token_id: u32) -> Result<Amount, AppError> {
        let holder = format!("0x{}", hex::encode(address));
        let wei: String = if token_id == 0 {
            self.evm()
                .call("eth_getBalance", json!([holder, "latest"]))
                .await?
        } else {
            let data = format!("0x{BALANCE_OF_SELECTOR}{:0>64}", hex::encode(address));
            self.evm()
                .call(
                    "eth_call",
                    json!([{ "to": dst20_contract(token_id), "data": data }, "latest"]),
                )
                .await?
        };
        wei_to_amount(&wei)
    }

    async fn list_unspent(&self, owners: &[String]) -> Result<Vec<UnspentOutput>, AppError> {
        let params = if owners.is_empty() {
            json!([1, 9_999_999])
        } else {
            json!([1, 9_999_999, owners])
        };
        let entries: Vec<ListUnspentEntry> = self.rpc.call("listunspent", params).await?;
        entries
            .into_iter()
            .filter(|entry| entry.token_id == 0)
            .map(ListUnspentEntry::into_unspent)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct ListUnspentEntry {
    txid: String,
    vout: u32,
    amount: Value,
    #[serde(rename = "scriptPubKey")]
    script_pub_key: String,
    #[serde(rename = "tokenId", default)]
    token_id: u32,
}

impl ListUnspentEntry {
    fn into_unspent(self) -> Result<UnspentOutput, AppError> {
        Ok(UnspentOutput {
            outpoint: OutPoint::from_display_hex(&self.txid, self.vout)?,
            value: parse_amount(&self.amount)?,
            script_pubkey: hex::decode(&self.script_pub_key)
                .map_err(|e| rpc_error(format!("listunspent scriptPubKey: {e}")))?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenEntry {
    symbol: String,
    #[serde(rename = "isDAT")]
    is_dat: bool,
    #[serde(rename = "isLPS")]
    is_lps: bool,
}

#[derive(Debug, Deserialize)]
struct AddressInfo {
    #[serde(default)]
    ismine: bool,
}

#[derive(Debug, Deserialize)]
struct FeeEstimate {
    feerate: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SignResult {
    hex: String,
    complete: bool,
    #[serde(default)]
    errors: Vec<SignError>,
}

#[derive(Debug, Deserialize)]
struct SignError {
    error: String,
}

#[async_trait]
impl AccountLookup for DefidClient {
    #[instrument(skip(self, address), fields(address = %address.render(self.network)))]
    async fn balance_of(
        &self,
        address: &DomainAddress,
        domain: Domain,
        token_id: u32,
    ) -> Result<Amount, AppError> {
        match (domain, address) {
            (Domain::Evm, DomainAddress::Evm { address }) => self.evm_balance(address, token_id).await,
            (Domain::Dvm, address) if address.compatible_with(Domain::Dvm) => {
                self.dvm_balance(address, token_id).await
            }
            _ => Err(ValidationError::InvalidField {
                field: "address".to_string(),
                message: format!(
                    "{} is not {}",
                    address.render(self.network),
                    domain.address_requirement()
                ),
            }
            .into()),
        }
    }

    async fn owns_address(&self, address: &DomainAddress) -> Result<bool, AppError> {
        let info: AddressInfo = self
            .rpc
            .call("getaddressinfo", json!([address.render(self.network)]))
            .await?;
        Ok(info.ismine)
    }

    async fn get_token(&self, token_id: u32) -> Result<Option<TokenInfo>, AppError> {
        let result: Result<HashMap<String, TokenEntry>, _> = self
            .rpc
            .call("gettoken", json!([token_id.to_string()]))
            .await;
        let tokens = match result {
            Ok(tokens) => tokens,
            Err(AppError::Blockchain(BlockchainError::Rejected { code, .. }))
                if code == RPC_INVALID_ADDRESS_OR_KEY =>
            {
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        Ok(tokens.into_iter().next().map(|(id, entry)| TokenInfo {
            id: id.parse().unwrap_or(token_id),
            symbol: entry.symbol,
            is_dat: entry.is_dat,
            is_lps: entry.is_lps,
        }))
    }

    async fn token_balances(&self, include_evm: bool) -> Result<Vec<TokenBalance>, AppError> {
        let balances: HashMap<String, Value> = self
            .rpc
            .call("gettokenbalances", json!([{}, true, false, include_evm]))
            .await?;
        let mut lines = balances
            .iter()
            .map(|(id, value)| {
                Ok(TokenBalance {
                    token_id: id
                        .parse()
                        .map_err(|_| rpc_error(format!("gettokenbalances token id {id}")))?,
                    amount: parse_amount(value)?,
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;
        lines.sort_by_key(|line| line.token_id);
        Ok(lines)
    }
}

#[async_trait]
impl FundingProvider for DefidClient {
    #[instrument(skip(self, owners), fields(owners = owners.len()))]
    async fn select_inputs(
        &self,
        required: Amount,
        _domain: Domain,
        owners: &[DomainAddress],
    ) -> Result<Vec<UnspentOutput>, AppError> {
        let owner_names: Vec<String> = owners.iter().map(|o| o.render(self.network)).collect();
        let mut candidates = if owner_names.is_empty() {
            Vec::new()
        } else {
            self.list_unspent(&owner_names).await?
        };
        for coin in self.list_unspent(&[]).await? {
            if !candidates.iter().any(|c| c.outpoint == coin.outpoint) {
                candidates.push(coin);
            }
        }

        let mut selected: Vec<UnspentOutput> = Vec::new();
        // one coin per owner first so each DVM source signs an input
        for owner in owners {
            let script = owner.script();
            if let Some(pos) = candidates.iter().position(|c| c.script_pubkey == script) {
                selected.push(candidates.remove(pos));
            }
        }

        let mut total = sum(&selected)?;
        for coin in candidates {
            if total >= required {
                break;
            }
            total = total
                .checked_add(coin.value)
                .ok_or_else(|| AppError::Internal("coin value overflows".to_string()))?;
            selected.push(coin);
        }

        if total < required {
            return Err(BlockchainError::InsufficientFunds {
                required,
                available: total,
            }
            .into());
        }
        debug!(coins = selected.len(), %total, "Selected wallet coins");
        Ok(selected)
    }

    async fn fee_rate(&self) -> Result<Amount, AppError> {
        let estimate: FeeEstimate = self
            .rpc
            .call("estimatesmartfee", json!([CONFIRMATION_TARGET]))
            .await?;
        match estimate.feerate {
            Some(rate) => parse_amount(&rate),
            None => {
                debug!(fallback = %self.fallback_fee_rate, "No fee estimate available");
                Ok(self.fallback_fee_rate)
            }
        }
    }
}

#[async_trait]
impl TransactionSigner for DefidClient {
    #[instrument(skip_all, fields(inputs = unsigned.tx.inputs.len()))]
    async fn sign(&self, unsigned: UnsignedTransaction) -> Result<SignedTransaction, AppError> {
        let result: SignResult = self
            .rpc
            .call("signrawtransactionwithwallet", json!([unsigned.tx.to_hex()]))
            .await?;
        if !result.complete {
            let reasons: Vec<String> = result.errors.into_iter().map(|e| e.error).collect();
            return Err(BlockchainError::SigningFailed(if reasons.is_empty() {
                "wallet could not sign every input".to_string()
            } else {
                reasons.join("; ")
            })
            .into());
        }
        let signed = Transaction::from_hex(&result.hex)?;
        Ok(unsigned.into_signed(signed)?)
    }
}

#[async_trait]
impl NetworkSubmitter for DefidClient {
    #[instrument(skip_all, fields(bytes = raw.len()))]
    async fn submit_raw(&self, raw: &[u8]) -> Result<TransactionId, AppError> {
        let txid: String = self
            .rpc
            .call_once("sendrawtransaction", json!([hex::encode(raw)]))
            .await?;
        info!(txid = %txid, "Transaction broadcast");
        Ok(txid)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.get_block_height().await.map(|_| ())
    }

    async fn get_block_height(&self) -> Result<u64, AppError> {
        self.rpc.call("getblockcount", json!([])).await
    }

    #[instrument(skip_all, fields(items = payload.items().len()))]
    async fn send_transfer_domain(
        &self,
        payload: &TransferDomainPayload,
    ) -> Result<TransactionId, AppError> {
        let items: Vec<Value> = payload
            .items()
            .iter()
            .map(|item| {
                json!({
                    "src": leg_json(&item.src, self.network),
                    "dst": leg_json(&item.dst, self.network),
                })
            })
            .collect();
        let txid: String = self.rpc.call_once("transferdomain", json!([items])).await?;
        info!(txid = %txid, "Node-built transfer broadcast");
        Ok(txid)
    }
}

fn leg_json(leg: &TransferLeg, network: Network) -> Value {
    let mut value = json!({
        "address": leg.address.render(network),
        "amount": leg.amount.to_string(),
        "domain": leg.domain.tag(),
    });
    if !leg.data.is_empty() {
        value["data"] = Value::String(hex::encode(&leg.data));
    }
    value
}

/// Address of the DST20 contract mirroring DVM token `token_id`.
fn dst20_contract(token_id: u32) -> String {
    format!("0xff{token_id:038x}")
}

/// Amounts arrive as JSON numbers in coins, e.g. `97.5` or `1e-08`.
fn parse_amount(value: &Value) -> Result<Amount, AppError> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => return Err(rpc_error(format!("expected an amount, got {other}"))),
    };
    let decimal = Decimal::from_str_exact(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| rpc_error(format!("amount {text}: {e}")))?;
    Ok(Amount::from_decimal(decimal.normalize())?)
}

fn wei_to_amount(quantity: &str) -> Result<Amount, AppError> {
    let digits = quantity.trim_start_matches("0x").trim_start_matches('0');
    if digits.is_empty() {
        return Ok(Amount::ZERO);
    }
    let wei = u128::from_str_radix(digits, 16)
        .map_err(|e| rpc_error(format!("quantity {quantity}: {e}")))?;
    let units = i64::try_from(wei / WEI_PER_UNIT)
        .map_err(|_| rpc_error(format!("quantity {quantity} out of range")))?;
    Ok(Amount::from_units(units)?)
}

fn sum(coins: &[UnspentOutput]) -> Result<Amount, AppError> {
    coins
        .iter()
        .try_fold(Amount::ZERO, |acc, coin| acc.checked_add(coin.value))
        .ok_or_else(|| AppError::Internal("coin value overflows".to_string()))
}

fn rpc_error(message: String) -> AppError {
    AppError::Blockchain(BlockchainError::RpcError(message))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};

    use super::*;
    use crate::domain::{COIN, TokenAmount, TransferItem};
    use crate::infra::rpc::{RpcClientConfig, RpcCredentials};

    type Reply = Result<Value, (i64, String)>;
    type Handler = Arc<dyn Fn(&str, &Value) -> Reply + Send + Sync>;

    #[derive(Clone)]
    struct FakeNode {
        handler: Handler,
        calls: Arc<Mutex<Vec<(String, Value)>>>,
    }

    async fn rpc(State(node): State<FakeNode>, Json(request): Json<Value>) -> (StatusCode, Json<Value>) {
        let method = request["method"].as_str().unwrap_or_default().to_string();
        let params = request["params"].clone();
        node.calls.lock().unwrap().push((method.clone(), params.clone()));
        match (node.handler)(&method, &params) {
            Ok(result) => (
                StatusCode::OK,
                Json(json!({"result": result, "error": null, "id": request["id"]})),
            ),
            Err((code, message)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"result": null, "error": {"code": code, "message": message}, "id": request["id"]})),
            ),
        }
    }

    async fn spawn_node(
        handler: impl Fn(&str, &Value) -> Reply + Send + Sync + 'static,
    ) -> (DefidClient, Arc<Mutex<Vec<(String, Value)>>>) {
        let node = FakeNode {
            handler: Arc::new(handler),
            calls: Arc::new(Mutex::new(Vec::new())),
        };
        let calls = node.calls.clone();
        let app = Router::new().route("/", post(rpc)).with_state(node);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = JsonRpcClient::new(
            &format!("http://{addr}/"),
            Some(RpcCredentials {
                user: "user".to_string(),
                password: "pass".to_string().into(),
            }),
            RpcClientConfig {
                timeout: Duration::from_secs(5),
                max_retries: 1,
                retry_delay: Duration::from_millis(10),
            },
        )
        .unwrap();
        (DefidClient::new(client, Network::Regtest), calls)
    }

    const OWNER: DomainAddress = DomainAddress::Legacy {
        pubkey_hash: [0x11; 20],
    };
    const EVM: DomainAddress = DomainAddress::Evm {
        address: [0x22; 20],
    };

    #[test]
    fn test_parse_amount_forms() {
        assert_eq!(parse_amount(&json!(97.5)).unwrap().units(), 9_750_000_000);
        assert_eq!(parse_amount(&json!(1e-8)).unwrap().units(), 1);
        assert_eq!(parse_amount(&json!("3.00000000")).unwrap().units(), 3 * COIN);
        assert!(parse_amount(&json!(true)).is_err());
    }

    #[test]
    fn test_wei_to_amount_truncates_to_eight_decimals() {
        // 3 DFI = 3e18 wei
        assert_eq!(wei_to_amount("0x29a2241af62c0000").unwrap().units(), 3 * COIN);
        assert_eq!(wei_to_amount("0x0").unwrap(), Amount::ZERO);
        assert_eq!(wei_to_amount("0x2540be3ff").unwrap(), Amount::ZERO);
    }

    #[test]
    fn test_dst20_contract_address() {
        assert_eq!(
            dst20_contract(1),
            "0xff00000000000000000000000000000000000001"
        );
        assert_eq!(dst20_contract(255).len(), 42);
    }

    #[tokio::test]
    async fn test_dvm_balance_reads_indexed_account() {
        let (client, calls) = spawn_node(|method, _| match method {
            "getaccount" => Ok(json!({"0": 100.0, "1": 2.5})),
            _ => Err((-32601, "Method not found".to_string())),
        })
        .await;
        let balance = client.balance_of(&OWNER, Domain::Dvm, 1).await.unwrap();
        assert_eq!(balance.units(), 250_000_000);
        let missing = client.balance_of(&OWNER, Domain::Dvm, 7).await.unwrap();
        assert_eq!(missing, Amount::ZERO);

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].1[0], OWNER.render(Network::Regtest));
        assert_eq!(calls[0].1[2], true);
    }

    #[tokio::test]
    async fn test_evm_balance_uses_eth_rpc() {
        let (client, calls) = spawn_node(|method, _| match method {
            "eth_getBalance" => Ok(json!("0x29a2241af62c0000")),
            "eth_call" => Ok(json!(format!("0x{:064x}", 5 * WEI_PER_UNIT))),
            _ => Err((-32601, "Method not found".to_string())),
        })
        .await;
        let dfi = client.balance_of(&EVM, Domain::Evm, 0).await.unwrap();
        assert_eq!(dfi.units(), 3 * COIN);
        let dst20 = client.balance_of(&EVM, Domain::Evm, 1).await.unwrap();
        assert_eq!(dst20.units(), 5);

        let calls = calls.lock().unwrap();
        let call = &calls[1].1[0];
        assert_eq!(call["to"], dst20_contract(1));
        assert!(call["data"].as_str().unwrap().starts_with("0x70a08231"));
        assert!(call["data"].as_str().unwrap().ends_with(&hex::encode([0x22; 20])));
    }

    #[tokio::test]
    async fn test_balance_rejects_mismatched_address() {
        let (client, _) = spawn_node(|_, _| Ok(Value::Null)).await;
        let result = client.balance_of(&OWNER, Domain::Evm, 0).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_unknown_token_is_none() {
        let (client, _) = spawn_node(|method, params| match (method, params[0].as_str()) {
            ("gettoken", Some("0")) => Ok(json!({"0": {"symbol": "DFI", "isDAT": true, "isLPS": false}})),
            ("gettoken", _) => Err((-5, "Token not found".to_string())),
            _ => Err((-32601, "Method not found".to_string())),
        })
        .await;
        let dfi = client.get_token(0).await.unwrap().unwrap();
        assert_eq!(dfi.symbol, "DFI");
        assert!(dfi.is_transferable());
        assert!(client.get_token(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_select_inputs_prefers_owner_coins() {
        let owner_script = hex::encode(OWNER.script());
        let other_script = hex::encode(
            DomainAddress::Legacy {
                pubkey_hash: [0x33; 20],
            }
            .script(),
        );
        let (client, _) = spawn_node(move |method, params| match method {
            "listunspent" if params.get(2).is_some() => Ok(json!([
                {"txid": "aa".repeat(32), "vout": 0, "amount": 0.5, "scriptPubKey": owner_script},
            ])),
            "listunspent" => Ok(json!([
                {"txid": "bb".repeat(32), "vout": 1, "amount": 2.0, "scriptPubKey": other_script},
                {"txid": "cc".repeat(32), "vout": 0, "amount": 9.0, "scriptPubKey": other_script, "tokenId": 1},
                {"txid": "aa".repeat(32), "vout": 0, "amount": 0.5, "scriptPubKey": owner_script},
            ])),
            _ => Err((-32601, "Method not found".to_string())),
        })
        .await;

        let coins = client
            .select_inputs(Amount::from_units(COIN).unwrap(), Domain::Dvm, &[OWNER])
            .await
            .unwrap();
        assert_eq!(coins.len(), 2);
        assert_eq!(coins[0].script_pubkey, OWNER.script());
        assert_eq!(coins[1].value.units(), 2 * COIN);

        let short = client
            .select_inputs(Amount::from_units(10 * COIN).unwrap(), Domain::Dvm, &[OWNER])
            .await;
        assert!(matches!(
            short,
            Err(AppError::Blockchain(BlockchainError::InsufficientFunds { .. }))
        ));
    }

    #[tokio::test]
    async fn test_fee_rate_falls_back_without_estimate() {
        let (client, _) = spawn_node(|_, _| Ok(json!({"errors": ["Insufficient data"], "blocks": 0}))).await;
        let rate = client.fee_rate().await.unwrap();
        assert_eq!(rate.units(), DEFAULT_FALLBACK_FEE_RATE);

        let (client, _) = spawn_node(|_, _| Ok(json!({"feerate": 0.0002, "blocks": 6}))).await;
        assert_eq!(client.fee_rate().await.unwrap().units(), 20_000);
    }

    #[tokio::test]
    async fn test_incomplete_signature_fails() {
        let (client, _) = spawn_node(|_, params| {
            Ok(json!({
                "hex": params[0],
                "complete": false,
                "errors": [{"error": "Unable to sign input"}]
            }))
        })
        .await;
        let coin = UnspentOutput {
            outpoint: OutPoint {
                txid: [0xaa; 32],
                vout: 0,
            },
            value: Amount::from_units(COIN).unwrap(),
            script_pubkey: OWNER.script(),
        };
        let tx = Transaction::new(vec![crate::domain::TxIn::unsigned(coin.outpoint)], Vec::new());
        let result = client
            .sign(UnsignedTransaction {
                tx,
                prevouts: vec![coin],
            })
            .await;
        match result {
            Err(AppError::Blockchain(BlockchainError::SigningFailed(message))) => {
                assert_eq!(message, "Unable to sign input");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_submit_is_not_retried_and_keeps_node_code() {
        let (client, calls) = spawn_node(|_, _| {
            Err((-26, "TransferDomainTx: tx must have at least one input from account owner (code 16)".to_string()))
        })
        .await;
        let result = client.submit_raw(&[0x04, 0x00]).await;
        match result {
            Err(AppError::Blockchain(BlockchainError::Rejected { code, message })) => {
                assert_eq!(code, -26);
                assert!(message.contains("account owner"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transferdomain_request_shape() {
        let (client, calls) = spawn_node(|_, _| Ok(json!("ab".repeat(32)))).await;
        let amount = TokenAmount::new(0, Amount::from_units(3 * COIN).unwrap()).unwrap();
        let payload = TransferDomainPayload::single(TransferItem::new(
            TransferLeg::new(OWNER, amount, Domain::Dvm),
            TransferLeg::new(EVM, amount, Domain::Evm),
        ));
        let txid = client.send_transfer_domain(&payload).await.unwrap();
        assert_eq!(txid, "ab".repeat(32));

        let calls = calls.lock().unwrap();
        let (method, params) = &calls[0];
        assert_eq!(method, "transferdomain");
        let item = &params[0][0];
        assert_eq!(item["src"]["domain"], 2);
        assert_eq!(item["dst"]["domain"], 3);
        assert_eq!(item["src"]["amount"], "3.00000000@0");
        assert_eq!(item["dst"]["address"], EVM.render(Network::Regtest));
        assert!(item["src"].get("data").is_none());
    }

    #[tokio::test]
    async fn test_block_height_and_health() {
        let (client, _) = spawn_node(|_, _| Ok(json!(1234))).await;
        assert_eq!(client.get_block_height().await.unwrap(), 1234);
        assert!(client.health_check().await.is_ok());
    }
}
