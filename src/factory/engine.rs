use serde::{Deserialize, Serialize};
use primitive_types::{H160, H256, U256};
use tracing::{debug, info};
use super::{
    ensure_account, CallContext, DepositDirectory, EnumerableRoleRegistry, FactoryError,
    FactoryEvent, FactoryResult, Request, RequestKind, RequestLedger, RequestStatus, Role,
    RoleRegistry, Timestamp, TokenLedger, WrappedToken,
};

/// One entry of the audit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence: u64,
    pub timestamp: Timestamp,
    pub event: FactoryEvent,
}

/// Append-only event log
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn append(&mut self, timestamp: Timestamp, event: FactoryEvent) {
        let sequence = self.records.len() as u64;
        self.records.push(EventRecord {
            sequence,
            timestamp,
            event,
        });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records with `sequence >= from`
    pub fn since(&self, from: u64) -> &[EventRecord] {
        let start = usize::try_from(from)
            .unwrap_or(usize::MAX)
            .min(self.records.len());
        &self.records[start..]
    }

    pub fn last(&self) -> Option<&EventRecord> {
        self.records.last()
    }
}

/// State-changing factory operations, dispatched through [`Factory::execute`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactoryCall {
    AddCustodian { account: H160 },
    RemoveCustodian { account: H160 },
    AddMerchant { account: H160 },
    RemoveMerchant { account: H160 },
    SetOwner { new_owner: H160 },
    Pause,
    Unpause,
    SetCustodianDeposit { merchant: H160, deposit: String },
    SetMerchantDeposit { deposit: String },
    AddMintRequest { amount: U256, deposit: String },
    CancelMintRequest { request_hash: H256 },
    ConfirmMintRequest { request_hash: H256, external_ref: String },
    RejectMintRequest { request_hash: H256 },
    Burn { amount: U256 },
    ConfirmBurnRequest { request_hash: H256, external_ref: String },
    ReclaimToken { token: H160 },
    /// Bare value transfer with no matching operation
    Transfer { amount: U256 },
}

/// Custodial mint/burn factory.
///
/// Every operation validates fully before touching state, so a failed call
/// leaves roles, deposits, requests, balances and the event log unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Factory<R, T> {
    /// Identity of the factory itself (token minter and burn spender)
    address: H160,
    roles: R,
    token: T,
    deposits: DepositDirectory,
    mint_requests: RequestLedger,
    burn_requests: RequestLedger,
    paused: bool,
    /// Highest timestamp committed so far
    last_timestamp: Timestamp,
    events: EventLog,
}

pub type StandardFactory = Factory<EnumerableRoleRegistry, WrappedToken>;

impl<R: RoleRegistry, T: TokenLedger> Factory<R, T> {
    /// Deploy a factory; `owner` receives the admin and pauser roles.
    pub fn new(
        address: H160,
        owner: H160,
        roles: R,
        token: T,
        timestamp: Timestamp,
    ) -> FactoryResult<Self> {
        ensure_account(address)?;
        ensure_account(owner)?;

        let mut factory = Self {
            address,
            roles,
            token,
            deposits: DepositDirectory::new(),
            mint_requests: RequestLedger::new(RequestKind::Mint),
            burn_requests: RequestLedger::new(RequestKind::Burn),
            paused: false,
            last_timestamp: timestamp,
            events: EventLog::new(),
        };

        for role in [Role::Admin, Role::Pauser] {
            if factory.roles.grant(role, owner) {
                factory.emit(
                    timestamp,
                    FactoryEvent::RoleGranted {
                        role,
                        account: owner,
                        sender: owner,
                    },
                );
            }
        }

        info!("Factory {:?} deployed for token {:?}, owner {:?}", address, factory.token.address(), owner);
        Ok(factory)
    }

    // ---------------------------------------------------------------------
    // Internal helpers
    // ---------------------------------------------------------------------

    fn require_role(&self, role: Role, account: H160) -> FactoryResult<()> {
        if !self.roles.is_member(role, account) {
            return Err(FactoryError::NotAuthorized { role });
        }
        Ok(())
    }

    fn require_not_paused(&self) -> FactoryResult<()> {
        if self.paused {
            return Err(FactoryError::Paused);
        }
        Ok(())
    }

    /// Timestamp to record for this call; never behind what was committed
    fn observe(&self, ctx: &CallContext) -> Timestamp {
        ctx.timestamp.max(self.last_timestamp)
    }

    fn emit(&mut self, timestamp: Timestamp, event: FactoryEvent) {
        self.last_timestamp = self.last_timestamp.max(timestamp);
        self.events.append(timestamp, event);
    }

    fn grant_role(&mut self, ctx: &CallContext, role: Role, account: H160) -> FactoryResult<()> {
        self.require_role(Role::Admin, ctx.caller)?;
        ensure_account(account)?;

        if self.roles.grant(role, account) {
            info!("Granted {} to {:?}", role, account);
            let timestamp = self.observe(ctx);
            self.emit(
                timestamp,
                FactoryEvent::RoleGranted {
                    role,
                    account,
                    sender: ctx.caller,
                },
            );
        }
        Ok(())
    }

    fn revoke_role(&mut self, ctx: &CallContext, role: Role, account: H160) -> FactoryResult<()> {
        self.require_role(Role::Admin, ctx.caller)?;
        ensure_account(account)?;

        if self.roles.revoke(role, account) {
            info!("Revoked {} from {:?}", role, account);
            let timestamp = self.observe(ctx);
            self.emit(
                timestamp,
                FactoryEvent::RoleRevoked {
                    role,
                    account,
                    sender: ctx.caller,
                },
            );
        }
        Ok(())
    }

    fn require_external_ref(external_ref: &str) -> FactoryResult<()> {
        if external_ref.is_empty() {
            return Err(FactoryError::EmptyExternalRef);
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Admin operations
    // ---------------------------------------------------------------------

    pub fn add_custodian(&mut self, ctx: &CallContext, account: H160) -> FactoryResult<()> {
        self.grant_role(ctx, Role::Custodian, account)
    }

    pub fn remove_custodian(&mut self, ctx: &CallContext, account: H160) -> FactoryResult<()> {
        self.revoke_role(ctx, Role::Custodian, account)
    }

    pub fn add_merchant(&mut self, ctx: &CallContext, account: H160) -> FactoryResult<()> {
        self.grant_role(ctx, Role::Merchant, account)
    }

    pub fn remove_merchant(&mut self, ctx: &CallContext, account: H160) -> FactoryResult<()> {
        self.revoke_role(ctx, Role::Merchant, account)
    }

    /// Hand the admin role to `new_owner` and drop the caller's.
    ///
    /// The new owner also receives the pauser role. Exactly one admin remains.
    pub fn set_owner(&mut self, ctx: &CallContext, new_owner: H160) -> FactoryResult<()> {
        self.require_role(Role::Admin, ctx.caller)?;
        ensure_account(new_owner)?;
        if new_owner == ctx.caller {
            return Err(FactoryError::OwnerUnchanged);
        }

        let timestamp = self.observe(ctx);
        let previous_owner = ctx.caller;

        for role in [Role::Admin, Role::Pauser] {
            if self.roles.grant(role, new_owner) {
                self.emit(
                    timestamp,
                    FactoryEvent::RoleGranted {
                        role,
                        account: new_owner,
                        sender: previous_owner,
                    },
                );
            }
        }
        if self.roles.revoke(Role::Admin, previous_owner) {
            self.emit(
                timestamp,
                FactoryEvent::RoleRevoked {
                    role: Role::Admin,
                    account: previous_owner,
                    sender: previous_owner,
                },
            );
        }
        self.emit(
            timestamp,
            FactoryEvent::OwnerChanged {
                previous_owner,
                new_owner,
            },
        );

        info!("Ownership transferred from {:?} to {:?}", previous_owner, new_owner);
        Ok(())
    }

    pub fn pause(&mut self, ctx: &CallContext) -> FactoryResult<()> {
        self.require_role(Role::Pauser, ctx.caller)?;
        if self.paused {
            return Err(FactoryError::AlreadyPaused);
        }

        self.paused = true;
        let timestamp = self.observe(ctx);
        self.emit(timestamp, FactoryEvent::Paused { account: ctx.caller });
        info!("Factory paused by {:?}", ctx.caller);
        Ok(())
    }

    pub fn unpause(&mut self, ctx: &CallContext) -> FactoryResult<()> {
        self.require_role(Role::Pauser, ctx.caller)?;
        if !self.paused {
            return Err(FactoryError::NotPaused);
        }

        self.paused = false;
        let timestamp = self.observe(ctx);
        self.emit(timestamp, FactoryEvent::Unpaused { account: ctx.caller });
        info!("Factory unpaused by {:?}", ctx.caller);
        Ok(())
    }

    /// Sweep this factory's whole balance of `token` to the calling admin.
    pub fn reclaim_token<L: TokenLedger + ?Sized>(
        &mut self,
        ctx: &CallContext,
        token: &mut L,
    ) -> FactoryResult<U256> {
        self.require_role(Role::Admin, ctx.caller)?;

        let amount = token.balance_of(self.address);
        token.transfer(self.address, ctx.caller, amount)?;

        let timestamp = self.observe(ctx);
        self.emit(
            timestamp,
            FactoryEvent::TokenClaimed {
                token: token.address(),
                amount,
            },
        );
        info!("Reclaimed {} of token {:?} to {:?}", amount, token.address(), ctx.caller);
        Ok(amount)
    }

    /// Same as [`Factory::reclaim_token`] for wrapped tokens sent to the factory.
    pub fn reclaim_wrapped_token(&mut self, ctx: &CallContext) -> FactoryResult<U256> {
        self.require_role(Role::Admin, ctx.caller)?;

        let token_address = self.token.address();
        let amount = self.token.balance_of(self.address);
        self.token.transfer(self.address, ctx.caller, amount)?;

        let timestamp = self.observe(ctx);
        self.emit(
            timestamp,
            FactoryEvent::TokenClaimed {
                token: token_address,
                amount,
            },
        );
        info!("Reclaimed {} wrapped tokens to {:?}", amount, ctx.caller);
        Ok(amount)
    }

    /// Bare value transfers are never accepted.
    pub fn receive_value(&mut self, ctx: &CallContext, amount: U256) -> FactoryResult<()> {
        debug!("Rejected bare transfer of {} from {:?}", amount, ctx.caller);
        Err(FactoryError::ValueTransferRejected)
    }

    // ---------------------------------------------------------------------
    // Deposit directory
    // ---------------------------------------------------------------------

    pub fn set_custodian_deposit(
        &mut self,
        ctx: &CallContext,
        merchant: H160,
        deposit: String,
    ) -> FactoryResult<()> {
        self.require_not_paused()?;
        self.require_role(Role::Custodian, ctx.caller)?;
        ensure_account(merchant)?;
        if deposit.is_empty() {
            return Err(FactoryError::EmptyDeposit);
        }

        self.deposits.set_custodian_deposit(merchant, deposit.clone());
        debug!("Custodian {:?} bound deposit {} to merchant {:?}", ctx.caller, deposit, merchant);

        let timestamp = self.observe(ctx);
        self.emit(
            timestamp,
            FactoryEvent::CustodianDepositSet {
                merchant,
                custodian: ctx.caller,
                deposit,
            },
        );
        Ok(())
    }

    pub fn set_merchant_deposit(&mut self, ctx: &CallContext, deposit: String) -> FactoryResult<()> {
        self.require_not_paused()?;
        self.require_role(Role::Merchant, ctx.caller)?;
        if deposit.is_empty() {
            return Err(FactoryError::EmptyDeposit);
        }

        self.deposits.set_merchant_deposit(ctx.caller, deposit.clone());
        debug!("Merchant {:?} set deposit {}", ctx.caller, deposit);

        let timestamp = self.observe(ctx);
        self.emit(
            timestamp,
            FactoryEvent::MerchantDepositSet {
                merchant: ctx.caller,
                deposit,
            },
        );
        Ok(())
    }

    pub fn custodian_deposit(&self, merchant: H160) -> Option<&str> {
        self.deposits.custodian_deposit(merchant)
    }

    pub fn merchant_deposit(&self, merchant: H160) -> Option<&str> {
        self.deposits.merchant_deposit(merchant)
    }

    // ---------------------------------------------------------------------
    // Mint requests
    // ---------------------------------------------------------------------

    /// Open a mint request against the caller's custodian-assigned deposit.
    pub fn add_mint_request(
        &mut self,
        ctx: &CallContext,
        amount: U256,
        deposit: String,
    ) -> FactoryResult<Request> {
        self.require_not_paused()?;
        self.require_role(Role::Merchant, ctx.caller)?;
        if amount.is_zero() {
            return Err(FactoryError::InvalidAmount);
        }
        if self.deposits.custodian_deposit(ctx.caller) != Some(deposit.as_str()) {
            return Err(FactoryError::UnboundDeposit { deposit });
        }

        let timestamp = self.observe(ctx);
        let request = self
            .mint_requests
            .open(ctx.caller, amount, deposit, timestamp)
            .clone();

        info!(
            "Mint request {} opened by {:?} for {} (hash {:?})",
            request.nonce, request.requester, request.amount, request.request_hash
        );
        self.emit(
            timestamp,
            FactoryEvent::MintRequestAdd {
                nonce: request.nonce,
                requester: request.requester,
                amount: request.amount,
                deposit: request.deposit.clone(),
                external_ref: request.external_ref.clone(),
                timestamp: request.timestamp,
                request_hash: request.request_hash,
            },
        );
        Ok(request)
    }

    /// Withdraw a pending mint request; only its requester may do so.
    pub fn cancel_mint_request(&mut self, ctx: &CallContext, request_hash: H256) -> FactoryResult<()> {
        self.require_not_paused()?;
        if self.mint_requests.find_by_hash(request_hash)?.requester != ctx.caller {
            return Err(FactoryError::NotRequester);
        }
        let nonce = self.mint_requests.pending_by_hash(request_hash)?.nonce;

        let request = self
            .mint_requests
            .finalize(nonce, RequestStatus::Canceled, None)?
            .clone();

        info!("Mint request {} canceled by {:?}", nonce, ctx.caller);
        let timestamp = self.observe(ctx);
        self.emit(
            timestamp,
            FactoryEvent::MintRequestCancel {
                nonce,
                requester: request.requester,
                request_hash,
            },
        );
        Ok(())
    }

    /// Approve a pending mint request and mint to the requester.
    pub fn confirm_mint_request(
        &mut self,
        ctx: &CallContext,
        request_hash: H256,
        external_ref: String,
    ) -> FactoryResult<()> {
        self.require_not_paused()?;
        self.require_role(Role::Custodian, ctx.caller)?;
        Self::require_external_ref(&external_ref)?;

        let pending = self.mint_requests.pending_by_hash(request_hash)?;
        let (nonce, requester, amount) = (pending.nonce, pending.requester, pending.amount);

        // Token effect first: a failed mint leaves the request pending
        self.token.mint(self.address, requester, amount)?;

        let request = self
            .mint_requests
            .finalize(nonce, RequestStatus::Approved, Some(external_ref))?
            .clone();

        info!(
            "Mint request {} approved by {:?}: minted {} to {:?} ({})",
            nonce, ctx.caller, amount, requester, request.external_ref
        );
        let timestamp = self.observe(ctx);
        self.emit(
            timestamp,
            FactoryEvent::MintConfirmed {
                nonce,
                requester,
                amount,
                deposit: request.deposit,
                external_ref: request.external_ref,
                timestamp: request.timestamp,
                request_hash,
            },
        );
        Ok(())
    }

    pub fn reject_mint_request(&mut self, ctx: &CallContext, request_hash: H256) -> FactoryResult<()> {
        self.require_not_paused()?;
        self.require_role(Role::Custodian, ctx.caller)?;

        let nonce = self.mint_requests.pending_by_hash(request_hash)?.nonce;
        let request = self
            .mint_requests
            .finalize(nonce, RequestStatus::Rejected, None)?
            .clone();

        info!("Mint request {} rejected by {:?}", nonce, ctx.caller);
        let timestamp = self.observe(ctx);
        self.emit(
            timestamp,
            FactoryEvent::MintRejected {
                nonce,
                requester: request.requester,
                amount: request.amount,
                deposit: request.deposit,
                external_ref: request.external_ref,
                timestamp: request.timestamp,
                request_hash,
            },
        );
        Ok(())
    }

    pub fn get_mint_request(&self, nonce: u64) -> FactoryResult<&Request> {
        self.mint_requests.get(nonce)
    }

    pub fn mint_requests_len(&self) -> usize {
        self.mint_requests.len()
    }

    // ---------------------------------------------------------------------
    // Burn requests
    // ---------------------------------------------------------------------

    /// Burn the caller's tokens and open a burn request for redemption.
    ///
    /// The debit is final; burn requests can only be confirmed.
    pub fn burn(&mut self, ctx: &CallContext, amount: U256) -> FactoryResult<Request> {
        self.require_not_paused()?;
        self.require_role(Role::Merchant, ctx.caller)?;
        if amount.is_zero() {
            return Err(FactoryError::InvalidAmount);
        }
        let deposit = self
            .deposits
            .merchant_deposit(ctx.caller)
            .ok_or(FactoryError::NoDepositConfigured)?
            .to_string();

        self.token.burn_from(self.address, ctx.caller, amount)?;

        let timestamp = self.observe(ctx);
        let request = self
            .burn_requests
            .open(ctx.caller, amount, deposit, timestamp)
            .clone();

        info!(
            "Burned {} from {:?}, burn request {} (hash {:?})",
            amount, ctx.caller, request.nonce, request.request_hash
        );
        self.emit(
            timestamp,
            FactoryEvent::Burned {
                nonce: request.nonce,
                requester: request.requester,
                amount: request.amount,
                deposit: request.deposit.clone(),
                timestamp: request.timestamp,
                request_hash: request.request_hash,
            },
        );
        Ok(request)
    }

    pub fn confirm_burn_request(
        &mut self,
        ctx: &CallContext,
        request_hash: H256,
        external_ref: String,
    ) -> FactoryResult<()> {
        self.require_not_paused()?;
        self.require_role(Role::Custodian, ctx.caller)?;
        Self::require_external_ref(&external_ref)?;

        let nonce = self.burn_requests.pending_by_hash(request_hash)?.nonce;
        let request = self
            .burn_requests
            .finalize(nonce, RequestStatus::Approved, Some(external_ref))?
            .clone();

        info!("Burn request {} confirmed by {:?} ({})", nonce, ctx.caller, request.external_ref);
        let timestamp = self.observe(ctx);
        self.emit(
            timestamp,
            FactoryEvent::BurnConfirmed {
                nonce,
                requester: request.requester,
                amount: request.amount,
                deposit: request.deposit,
                external_ref: request.external_ref,
                timestamp: request.timestamp,
                input_request_hash: request_hash,
            },
        );
        Ok(())
    }

    pub fn get_burn_request(&self, nonce: u64) -> FactoryResult<&Request> {
        self.burn_requests.get(nonce)
    }

    pub fn burn_requests_len(&self) -> usize {
        self.burn_requests.len()
    }

    // ---------------------------------------------------------------------
    // Dispatch
    // ---------------------------------------------------------------------

    /// Run a state-changing call and return the events it emitted.
    pub fn execute(&mut self, ctx: &CallContext, call: FactoryCall) -> FactoryResult<Vec<FactoryEvent>> {
        let start = self.events.len() as u64;

        match call {
            FactoryCall::AddCustodian { account } => self.add_custodian(ctx, account)?,
            FactoryCall::RemoveCustodian { account } => self.remove_custodian(ctx, account)?,
            FactoryCall::AddMerchant { account } => self.add_merchant(ctx, account)?,
            FactoryCall::RemoveMerchant { account } => self.remove_merchant(ctx, account)?,
            FactoryCall::SetOwner { new_owner } => self.set_owner(ctx, new_owner)?,
            FactoryCall::Pause => self.pause(ctx)?,
            FactoryCall::Unpause => self.unpause(ctx)?,
            FactoryCall::SetCustodianDeposit { merchant, deposit } => {
                self.set_custodian_deposit(ctx, merchant, deposit)?
            }
            FactoryCall::SetMerchantDeposit { deposit } => self.set_merchant_deposit(ctx, deposit)?,
            FactoryCall::AddMintRequest { amount, deposit } => {
                self.add_mint_request(ctx, amount, deposit)?;
            }
            FactoryCall::CancelMintRequest { request_hash } => {
                self.cancel_mint_request(ctx, request_hash)?
            }
            FactoryCall::ConfirmMintRequest { request_hash, external_ref } => {
                self.confirm_mint_request(ctx, request_hash, external_ref)?
            }
            FactoryCall::RejectMintRequest { request_hash } => {
                self.reject_mint_request(ctx, request_hash)?
            }
            FactoryCall::Burn { amount } => {
                self.burn(ctx, amount)?;
            }
            FactoryCall::ConfirmBurnRequest { request_hash, external_ref } => {
                self.confirm_burn_request(ctx, request_hash, external_ref)?
            }
            FactoryCall::ReclaimToken { token } => {
                self.require_role(Role::Admin, ctx.caller)?;
                if token != self.token.address() {
                    return Err(FactoryError::UnknownToken { token });
                }
                self.reclaim_wrapped_token(ctx)?;
            }
            FactoryCall::Transfer { amount } => self.receive_value(ctx, amount)?,
        }

        Ok(self
            .events
            .since(start)
            .iter()
            .map(|record| record.event.clone())
            .collect())
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn address(&self) -> H160 {
        self.address
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn has_role(&self, role: Role, account: H160) -> bool {
        self.roles.is_member(role, account)
    }

    pub fn role_member_count(&self, role: Role) -> usize {
        self.roles.member_count(role)
    }

    pub fn role_member(&self, role: Role, index: usize) -> Option<H160> {
        self.roles.member_at(role, index)
    }

    pub fn token(&self) -> &T {
        &self.token
    }

    /// Direct access to the token ledger, for calls that do not go through
    /// the factory (approvals, transfers)
    pub fn token_mut(&mut self) -> &mut T {
        &mut self.token
    }

    pub fn mint_requests(&self) -> &RequestLedger {
        &self.mint_requests
    }

    pub fn burn_requests(&self) -> &RequestLedger {
        &self.burn_requests
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn last_timestamp(&self) -> Timestamp {
        self.last_timestamp
    }
}
