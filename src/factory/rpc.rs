/// JSON-RPC methods for the custody factory
use serde_json::{json, Value};
use primitive_types::{H160, H256, U256};
use super::{
    CallContext, FactoryCall, FactoryEvent, Request, Role, StandardFactory, TokenEvent,
    TokenLedger,
};

/// Read-only methods; everything else mutates the factory or token
pub const QUERY_METHODS: &[&str] = &[
    "factory_paused",
    "factory_hasRole",
    "factory_getRoleMemberCount",
    "factory_getRoleMember",
    "factory_getMintRequest",
    "factory_getBurnRequest",
    "factory_getMintRequestsLength",
    "factory_getBurnRequestsLength",
    "factory_custodianDeposit",
    "factory_merchantDeposit",
    "token_info",
    "token_balanceOf",
    "token_allowance",
];

/// Factory RPC handler
pub struct FactoryRpcHandler;

impl FactoryRpcHandler {
    /// Dispatch `method` against `factory`.
    ///
    /// `timestamp` is the logical time of the call; the caller is read from
    /// the `from` parameter of state-changing methods.
    pub fn handle(
        factory: &mut StandardFactory,
        timestamp: u64,
        method: &str,
        params: Value,
    ) -> Result<Value, String> {
        match method {
            "factory_paused" => Ok(json!({ "paused": factory.is_paused() })),
            "factory_hasRole" => Self::has_role(factory, &params),
            "factory_getRoleMemberCount" => Self::role_member_count(factory, &params),
            "factory_getRoleMember" => Self::role_member(factory, &params),
            "factory_getMintRequest" => Self::get_request(factory, &params, true),
            "factory_getBurnRequest" => Self::get_request(factory, &params, false),
            "factory_getMintRequestsLength" => Ok(json!({ "length": factory.mint_requests_len() })),
            "factory_getBurnRequestsLength" => Ok(json!({ "length": factory.burn_requests_len() })),
            "factory_custodianDeposit" => {
                let merchant = parse_address(&params["merchant"])?;
                Ok(json!({ "deposit": factory.custodian_deposit(merchant) }))
            }
            "factory_merchantDeposit" => {
                let merchant = parse_address(&params["merchant"])?;
                Ok(json!({ "deposit": factory.merchant_deposit(merchant) }))
            }
            "token_info" => Ok(Self::token_info(factory)),
            "token_balanceOf" => {
                let account = parse_address(&params["account"])?;
                Ok(json!({ "balance": factory.token().balance_of(account).to_string() }))
            }
            "token_allowance" => {
                let owner = parse_address(&params["owner"])?;
                let spender = parse_address(&params["spender"])?;
                Ok(json!({ "allowance": factory.token().allowance(owner, spender).to_string() }))
            }
            "token_approve" => Self::token_approve(factory, &params),
            "token_transfer" => Self::token_transfer(factory, &params),
            _ => {
                let call = parse_call(method, &params)?;
                let caller = parse_address(&params["from"])?;
                Self::execute(factory, CallContext::new(caller, timestamp), call)
            }
        }
    }

    /// Run a state-changing factory call
    pub fn execute(
        factory: &mut StandardFactory,
        ctx: CallContext,
        call: FactoryCall,
    ) -> Result<Value, String> {
        let events = factory.execute(&ctx, call).map_err(|e| e.to_string())?;

        let mut response = json!({
            "status": "success",
            "events": events.iter().map(event_json).collect::<Vec<_>>(),
        });

        // Surface the commitment of a freshly opened request
        for event in &events {
            if let FactoryEvent::MintRequestAdd { nonce, request_hash, .. }
            | FactoryEvent::Burned { nonce, request_hash, .. } = event
            {
                response["nonce"] = json!(nonce);
                response["requestHash"] = json!(format!("0x{:x}", request_hash));
            }
        }

        Ok(response)
    }

    fn has_role(factory: &StandardFactory, params: &Value) -> Result<Value, String> {
        let role = parse_role(&params["role"])?;
        let account = parse_address(&params["account"])?;
        Ok(json!({ "hasRole": factory.has_role(role, account) }))
    }

    fn role_member_count(factory: &StandardFactory, params: &Value) -> Result<Value, String> {
        let role = parse_role(&params["role"])?;
        Ok(json!({ "role": role.as_str(), "count": factory.role_member_count(role) }))
    }

    fn role_member(factory: &StandardFactory, params: &Value) -> Result<Value, String> {
        let role = parse_role(&params["role"])?;
        let index = params["index"].as_u64().ok_or("Missing 'index' field")?;
        let member = usize::try_from(index)
            .ok()
            .and_then(|index| factory.role_member(role, index))
            .ok_or_else(|| format!("{} has no member at index {}", role, index))?;

        Ok(json!({ "role": role.as_str(), "member": format!("0x{:x}", member) }))
    }

    fn get_request(factory: &StandardFactory, params: &Value, mint: bool) -> Result<Value, String> {
        let nonce = params["nonce"].as_u64().ok_or("Missing 'nonce' field")?;
        let request = if mint {
            factory.get_mint_request(nonce)
        } else {
            factory.get_burn_request(nonce)
        }
        .map_err(|e| e.to_string())?;

        Ok(request_json(request))
    }

    fn token_info(factory: &StandardFactory) -> Value {
        let token = factory.token();
        json!({
            "address": format!("0x{:x}", token.address()),
            "name": token.name,
            "symbol": token.symbol,
            "decimals": token.decimals,
            "totalSupply": token.total_supply.to_string(),
            "totalSupplyFormatted": format_balance(token.total_supply, token.decimals),
        })
    }

    fn token_approve(factory: &mut StandardFactory, params: &Value) -> Result<Value, String> {
        let owner = parse_address(&params["from"])?;
        let spender = parse_address(&params["spender"])?;
        let amount = parse_u256(&params["amount"])?;

        match factory
            .token_mut()
            .approve(owner, spender, amount)
            .map_err(|e| e.to_string())?
        {
            TokenEvent::Approval { owner, spender, amount, .. } => Ok(json!({
                "status": "success",
                "owner": format!("0x{:x}", owner),
                "spender": format!("0x{:x}", spender),
                "amount": amount.to_string()
            })),
            _ => Err("Unexpected event type".to_string()),
        }
    }

    fn token_transfer(factory: &mut StandardFactory, params: &Value) -> Result<Value, String> {
        let from = parse_address(&params["from"])?;
        let to = parse_address(&params["to"])?;
        let amount = parse_u256(&params["amount"])?;

        match factory
            .token_mut()
            .transfer(from, to, amount)
            .map_err(|e| e.to_string())?
        {
            TokenEvent::Transfer { from, to, amount, .. } => Ok(json!({
                "status": "success",
                "from": format!("0x{:x}", from),
                "to": format!("0x{:x}", to),
                "amount": amount.to_string()
            })),
            _ => Err("Unexpected event type".to_string()),
        }
    }
}

/// Build a state-changing call from an RPC method name and its params
pub fn parse_call(method: &str, params: &Value) -> Result<FactoryCall, String> {
    let call = match method {
        "factory_addCustodian" => FactoryCall::AddCustodian {
            account: parse_address(&params["account"])?,
        },
        "factory_removeCustodian" => FactoryCall::RemoveCustodian {
            account: parse_address(&params["account"])?,
        },
        "factory_addMerchant" => FactoryCall::AddMerchant {
            account: parse_address(&params["account"])?,
        },
        "factory_removeMerchant" => FactoryCall::RemoveMerchant {
            account: parse_address(&params["account"])?,
        },
        "factory_setOwner" => FactoryCall::SetOwner {
            new_owner: parse_address(&params["newOwner"])?,
        },
        "factory_pause" => FactoryCall::Pause,
        "factory_unpause" => FactoryCall::Unpause,
        "factory_setCustodianDeposit" => FactoryCall::SetCustodianDeposit {
            merchant: parse_address(&params["merchant"])?,
            deposit: parse_string(params, "deposit")?,
        },
        "factory_setMerchantDeposit" => FactoryCall::SetMerchantDeposit {
            deposit: parse_string(params, "deposit")?,
        },
        "factory_addMintRequest" => FactoryCall::AddMintRequest {
            amount: parse_u256(&params["amount"])?,
            deposit: parse_string(params, "deposit")?,
        },
        "factory_cancelMintRequest" => FactoryCall::CancelMintRequest {
            request_hash: parse_h256(&params["requestHash"])?,
        },
        "factory_confirmMintRequest" => FactoryCall::ConfirmMintRequest {
            request_hash: parse_h256(&params["requestHash"])?,
            external_ref: parse_string(params, "externalRef")?,
        },
        "factory_rejectMintRequest" => FactoryCall::RejectMintRequest {
            request_hash: parse_h256(&params["requestHash"])?,
        },
        "factory_burn" => FactoryCall::Burn {
            amount: parse_u256(&params["amount"])?,
        },
        "factory_confirmBurnRequest" => FactoryCall::ConfirmBurnRequest {
            request_hash: parse_h256(&params["requestHash"])?,
            external_ref: parse_string(params, "externalRef")?,
        },
        "factory_reclaimToken" => FactoryCall::ReclaimToken {
            token: parse_address(&params["token"])?,
        },
        "factory_transfer" => FactoryCall::Transfer {
            amount: parse_u256(&params["amount"])?,
        },
        _ => return Err(format!("Unknown method: {}", method)),
    };
    Ok(call)
}

/// JSON view of a request
pub fn request_json(request: &Request) -> Value {
    json!({
        "nonce": request.nonce,
        "requester": format!("0x{:x}", request.requester),
        "amount": request.amount.to_string(),
        "deposit": request.deposit,
        "externalRef": request.external_ref,
        "timestamp": request.timestamp,
        "status": request.status.to_string(),
        "requestHash": format!("0x{:x}", request.request_hash),
    })
}

/// JSON view of an event: its name plus the serialized payload
pub fn event_json(event: &FactoryEvent) -> Value {
    let data = serde_json::to_value(event)
        .ok()
        .and_then(|value| value.get(event.name()).cloned())
        .unwrap_or(Value::Null);

    json!({ "event": event.name(), "data": data })
}

// Helper functions

fn parse_string(params: &Value, field: &str) -> Result<String, String> {
    params[field]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| format!("Missing '{}' field", field))
}

fn parse_role(value: &Value) -> Result<Role, String> {
    let name = value.as_str().ok_or("Role must be a string")?;
    Role::parse(name).ok_or_else(|| format!("Unknown role: {}", name))
}

fn parse_hex(value: &Value, len: usize, what: &str) -> Result<Vec<u8>, String> {
    let text = value
        .as_str()
        .ok_or_else(|| format!("{} must be a string", what))?;
    let clean = text.strip_prefix("0x").unwrap_or(text);

    if clean.len() != len * 2 {
        return Err(format!("Invalid {} length", what.to_lowercase()));
    }

    hex::decode(clean).map_err(|_| format!("Invalid hex {}", what.to_lowercase()))
}

/// Parse address from JSON value
pub fn parse_address(value: &Value) -> Result<H160, String> {
    let bytes = parse_hex(value, 20, "Address")?;
    Ok(H160::from_slice(&bytes))
}

/// Parse a 32-byte hash from JSON value
pub fn parse_h256(value: &Value) -> Result<H256, String> {
    let bytes = parse_hex(value, 32, "Hash")?;
    Ok(H256::from_slice(&bytes))
}

/// Parse U256 from JSON value
pub fn parse_u256(value: &Value) -> Result<U256, String> {
    match value {
        Value::String(s) => {
            if let Some(hex) = s.strip_prefix("0x") {
                U256::from_str_radix(hex, 16).map_err(|_| "Invalid hex number".to_string())
            } else {
                U256::from_dec_str(s).map_err(|_| "Invalid decimal number".to_string())
            }
        }
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| "Number too large".to_string()),
        _ => Err("Amount must be a string or number".to_string()),
    }
}

/// Format balance with proper decimals.
///
/// `10^decimals` overflows U256 above 77 decimals; the raw integer is
/// returned in that case.
pub fn format_balance(balance: U256, decimals: u8) -> String {
    let Some(divisor) = U256::from(10).checked_pow(U256::from(decimals)) else {
        return balance.to_string();
    };
    let integer_part = balance / divisor;
    let fractional_part = balance % divisor;

    if fractional_part.is_zero() {
        return integer_part.to_string();
    }

    let frac_str = format!("{:0width$}", fractional_part, width = decimals as usize);
    let trimmed = frac_str.trim_end_matches('0');
    format!("{}.{}", integer_part, trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{EnumerableRoleRegistry, Factory, WrappedToken};

    const OWNER: &str = "0x0000000000000000000000000000000000000001";
    const CUSTODIAN: &str = "0x0000000000000000000000000000000000000002";
    const MERCHANT: &str = "0x0000000000000000000000000000000000000003";

    fn factory() -> StandardFactory {
        let dao = H160::from_low_u64_be(0xDA);
        let address = H160::from_low_u64_be(0xF0);
        let mut token = WrappedToken::new(
            "Wrapped Filecoin".to_string(),
            "WFIL".to_string(),
            18,
            H160::from_low_u64_be(0xAA),
            dao,
        );
        token.grant_minter(dao, address).unwrap();

        Factory::new(
            address,
            H160::from_low_u64_be(1),
            EnumerableRoleRegistry::new(),
            token,
            100,
        )
        .unwrap()
    }

    fn call(factory: &mut StandardFactory, method: &str, params: Value) -> Value {
        FactoryRpcHandler::handle(factory, 200, method, params).unwrap()
    }

    #[test]
    fn test_parse_address() {
        let addr_val = json!("0x742d35Cc6621C0532c5C3d30485e1c463E2D0E6C");
        assert!(parse_address(&addr_val).is_ok());

        assert!(parse_address(&json!("0x1234")).is_err());
        assert!(parse_address(&json!(42)).is_err());
    }

    #[test]
    fn test_parse_u256() {
        let result = parse_u256(&json!("1000000000000000000"));
        assert_eq!(result.unwrap(), U256::from(1_000_000_000_000_000_000_u64));

        assert_eq!(parse_u256(&json!("0xff")).unwrap(), U256::from(255));
        assert_eq!(parse_u256(&json!(7)).unwrap(), U256::from(7));
        assert!(parse_u256(&json!(true)).is_err());
    }

    #[test]
    fn test_format_balance() {
        let balance = U256::from(1_500_000_000_000_000_000_u64);
        assert_eq!(format_balance(balance, 18), "1.5");

        let balance_whole = U256::from(2_000_000_000_000_000_000_u64);
        assert_eq!(format_balance(balance_whole, 18), "2");

        assert_eq!(format_balance(U256::from(5), 77), format!("0.{}5", "0".repeat(76)));
        assert_eq!(format_balance(U256::from(5), 78), "5");
        assert_eq!(format_balance(U256::MAX, u8::MAX), U256::MAX.to_string());
    }

    #[test]
    fn test_token_info_with_oversized_decimals() {
        let dao = H160::from_low_u64_be(0xDA);
        let token = WrappedToken::new(
            "Wide".to_string(),
            "WIDE".to_string(),
            80,
            H160::from_low_u64_be(0xAA),
            dao,
        );
        let mut factory = Factory::new(
            H160::from_low_u64_be(0xF0),
            H160::from_low_u64_be(1),
            EnumerableRoleRegistry::new(),
            token,
            100,
        )
        .unwrap();

        let info = call(&mut factory, "token_info", json!({}));
        assert_eq!(info["decimals"], json!(80));
        assert_eq!(info["totalSupplyFormatted"], json!("0"));
    }

    #[test]
    fn test_mint_flow_over_rpc() {
        let mut factory = factory();

        call(&mut factory, "factory_addCustodian", json!({ "from": OWNER, "account": CUSTODIAN }));
        call(&mut factory, "factory_addMerchant", json!({ "from": OWNER, "account": MERCHANT }));
        call(
            &mut factory,
            "factory_setCustodianDeposit",
            json!({ "from": CUSTODIAN, "merchant": MERCHANT, "deposit": "f1vault" }),
        );

        let opened = call(
            &mut factory,
            "factory_addMintRequest",
            json!({ "from": MERCHANT, "amount": "10", "deposit": "f1vault" }),
        );
        assert_eq!(opened["nonce"], json!(0));
        assert_eq!(opened["events"][0]["event"], json!("MintRequestAdd"));
        let hash = opened["requestHash"].as_str().unwrap().to_string();

        let confirmed = call(
            &mut factory,
            "factory_confirmMintRequest",
            json!({ "from": CUSTODIAN, "requestHash": hash, "externalRef": "cid1" }),
        );
        assert_eq!(confirmed["events"][0]["event"], json!("MintConfirmed"));
        assert_eq!(confirmed["events"][0]["data"]["external_ref"], json!("cid1"));

        let request = call(&mut factory, "factory_getMintRequest", json!({ "nonce": 0 }));
        assert_eq!(request["status"], json!("approved"));
        assert_eq!(request["requestHash"], json!(hash));

        let balance = call(&mut factory, "token_balanceOf", json!({ "account": MERCHANT }));
        assert_eq!(balance["balance"], json!("10"));
    }

    #[test]
    fn test_role_queries() {
        let mut factory = factory();

        let count = call(&mut factory, "factory_getRoleMemberCount", json!({ "role": "DEFAULT_ADMIN_ROLE" }));
        assert_eq!(count["count"], json!(1));

        let member = call(&mut factory, "factory_getRoleMember", json!({ "role": "pauser", "index": 0 }));
        assert_eq!(member["member"], json!(OWNER));

        let has = call(&mut factory, "factory_hasRole", json!({ "role": "custodian", "account": OWNER }));
        assert_eq!(has["hasRole"], json!(false));

        let result = FactoryRpcHandler::handle(
            &mut factory,
            200,
            "factory_getRoleMember",
            json!({ "role": "merchant", "index": 0 }),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_errors_are_reported() {
        let mut factory = factory();

        let result = FactoryRpcHandler::handle(
            &mut factory,
            200,
            "factory_addCustodian",
            json!({ "from": MERCHANT, "account": CUSTODIAN }),
        );
        assert_eq!(result.unwrap_err(), "caller is not the default admin");

        let result = FactoryRpcHandler::handle(&mut factory, 200, "factory_selfDestruct", json!({}));
        assert!(result.unwrap_err().starts_with("Unknown method"));

        let result = FactoryRpcHandler::handle(
            &mut factory,
            200,
            "factory_transfer",
            json!({ "from": MERCHANT, "amount": 1 }),
        );
        assert_eq!(result.unwrap_err(), "direct value transfers are not accepted");
    }
}
