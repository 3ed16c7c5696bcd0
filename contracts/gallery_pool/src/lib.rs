#![cfg_attr(not(feature = "std"), no_std, no_main)]

/// # Gallery Pool — Escrow, Marketplace & Wind-Down Engine
///
/// **Role:** Ground-truth ledger for a fixed-size tokenized collection.
/// Every mint payment is escrowed in a Guarantee Pool that always covers the
/// refund of each asset's cost basis; every resale surcharge accumulates in
/// a Surplus Pool that is redistributed pro-rata to ticket balances once the
/// trigger fires.
///
/// ## Lifecycle
///
/// ```text
///   ┌──────────┐  initiate (deadline elapsed, OR price ≥ threshold  ┌───────────┐
///   │ Inactive │ ───────────── with fresh feed & sequencer up) ───► │ Initiated │
///   │ (trading)│ ◄── cancel (price-based only, inside cooldown, ─── │ (cooldown)│
///   └──────────┘        price fell back below threshold)            └─────┬─────┘
///                                                                         │ finalize
///                                                 (cooldown elapsed AND the│ same
///                                                  deadline-or-oracle check│ again)
///                                                                         ▼
///                                                                   ┌───────────┐
///                                                                   │ Finalized │
///                                                                   │ (payouts) │
///                                                                   └───────────┘
/// ```
///
/// Finalized is terminal.  It seals the collection through the Asset
/// Registry's `mark_all_destroyed`, freezes every cost basis, disables the
/// marketplace and opens the pull-based Distribution Engine.
///
/// ## Money flow (basis-point arithmetic, truncating division)
///
/// ```text
///   MINT  (exact tier price P):    guarantee_pool += P
///                                  tickets += ⌊(P × surcharge) / unit⌋   (notional)
///   BUY   (exact P' + ⌊P'×s⌋):     guarantee_pool += P' − old_basis
///                                  surplus_pool   += ⌊P' × s⌋
///                                  seller receives old_basis (or pending credit)
///                                  tickets(buyer) += ⌊⌊P'×s⌋ / unit⌋
///   DISTRIBUTE(p):  ⌊surplus × (10000 − fee) × tickets(p) / (10000 × total)⌋
///                   + Σ cost_basis of unclaimed assets owned by p
///   CREATOR:        ⌊surplus × fee / 10000⌋
/// ```
///
/// Every truncation loss stays inside the contract and is only recoverable
/// through `sweep_dust` after everything else has settled.
///
/// ## Re-entrancy stance
///
/// Each handler runs validate → mutate → emit → interact.  All ledger
/// mutations for an operation are committed before the first collaborator
/// call, and an `entered` storage lock rejects nested calls for the duration
/// of the interaction window.  A seller whose payout reverts cannot block a
/// trade: the amount degrades to a pending withdrawal, retried only through
/// the explicit `withdraw` message.
#[ink::contract]
mod gallery_pool {
    use ink::prelude::vec::Vec;
    use ink::storage::Mapping;

    // =========================================================================
    // CONSTANTS
    // =========================================================================

    /// Basis Points denominator.
    pub const BPS_DENOMINATOR: u128 = 10_000;

    // =========================================================================
    // TYPES
    // =========================================================================

    /// One pricing band of the mint schedule: every unminted id strictly
    /// below `upto` (and not covered by an earlier band) mints at `price`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, scale::Encode, scale::Decode)]
    #[cfg_attr(
        feature = "std",
        derive(scale_info::TypeInfo, ink::storage::traits::StorageLayout)
    )]
    pub struct MintTier {
        pub upto: u32,
        pub price: Balance,
    }

    /// Economic and trigger parameters, fixed at deployment.
    ///
    /// Deliberately configuration rather than constants: the collection
    /// size, surcharge, creator fee and cooldown have all varied across
    /// deployments of this design, and none of the historical sets is
    /// canonical.
    #[derive(Debug, Clone, PartialEq, Eq, scale::Encode, scale::Decode)]
    #[cfg_attr(
        feature = "std",
        derive(scale_info::TypeInfo, ink::storage::traits::StorageLayout)
    )]
    pub struct PoolParams {
        /// Collection size; valid asset ids are `[0, max_supply)`.
        pub max_supply: u32,
        /// Mint price bands, strictly ascending `upto`, covering the id space.
        pub mint_tiers: Vec<MintTier>,
        /// Resale surcharge in BPS, applied on top of the listing price.
        pub surcharge_bps: u128,
        /// Surcharge amount buying exactly one ticket.
        pub ticket_unit: Balance,
        /// Creator's share of the surplus pool in BPS.
        pub creator_fee_bps: u128,
        /// Recipient of the creator share.
        pub creator: AccountId,
        /// Oracle price at or above which the trigger may initiate.
        pub trigger_price: i128,
        /// Maximum accepted age of a price report (ms).
        pub price_max_age_ms: u64,
        /// Required "up" duration of the uptime feed before trusting prices (ms).
        pub uptime_grace_ms: u64,
        /// Initiate → finalize cooldown (ms).
        pub cooldown_ms: u64,
        /// Deployment-relative deadline that triggers unconditionally (ms).
        pub deadline_ms: u64,
    }

    /// Marketplace listing.  Deactivated rather than removed on delist/sale
    /// so the last asking price stays queryable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, scale::Encode, scale::Decode)]
    #[cfg_attr(
        feature = "std",
        derive(scale_info::TypeInfo, ink::storage::traits::StorageLayout)
    )]
    pub struct Listing {
        pub price: Balance,
        pub active: bool,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, scale::Encode, scale::Decode)]
    #[cfg_attr(
        feature = "std",
        derive(scale_info::TypeInfo, ink::storage::traits::StorageLayout)
    )]
    pub enum TriggerState {
        Inactive,
        Initiated,
        Finalized,
    }

    /// What satisfied the trigger check at initiation.  A deadline initiation
    /// is an unconditional fact and can never be cancelled; a price
    /// initiation stays revocable until the cooldown elapses.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, scale::Encode, scale::Decode)]
    #[cfg_attr(
        feature = "std",
        derive(scale_info::TypeInfo, ink::storage::traits::StorageLayout)
    )]
    pub enum TriggerCause {
        Price,
        Deadline,
    }

    // =========================================================================
    // STORAGE
    // =========================================================================

    #[ink(storage)]
    pub struct GalleryPool {
        /// Deployer; only relevant for `sweep_dust`.
        owner: AccountId,
        params: PoolParams,

        // ── Collaborators ─────────────────────────────────────────────────
        asset_registry: AccountId,
        price_feed: AccountId,
        /// Optional sequencer/uptime feed.  `None` means "assume always up".
        uptime_feed: Option<AccountId>,

        /// Creation timestamp; anchor of the unconditional deadline.
        deployed_at: Timestamp,

        // ── Ledger ────────────────────────────────────────────────────────
        /// Invariant: always equals Σ cost_basis over all minted assets.
        guarantee_pool: Balance,
        /// Monotonically non-decreasing until Finalized; funded only by
        /// surcharges.  Frozen afterwards as the base of every bonus share.
        surplus_pool: Balance,
        /// Asset id → amount its current owner paid.  Absent = unminted.
        cost_basis: Mapping<u32, Balance>,
        listings: Mapping<u32, Listing>,
        minted_count: u32,

        // ── Tickets ───────────────────────────────────────────────────────
        /// Never reduced by any operation, selling included.
        tickets: Mapping<AccountId, u128>,
        total_tickets: u128,
        /// Distinct accounts with a non-zero ticket balance.
        total_participants: u32,

        // ── Trigger ───────────────────────────────────────────────────────
        trigger_state: TriggerState,
        trigger_cause: Option<TriggerCause>,
        /// 0 while Inactive.
        initiated_at: Timestamp,

        // ── Distribution ──────────────────────────────────────────────────
        /// Ticket-bonus claim flags, one per participant.
        bonus_claimed: Mapping<AccountId, bool>,
        distributed_participants: u32,
        /// Cost-basis claim flags, one per asset.  Distinct from the bonus
        /// claim: the refund follows the asset's final holder, not the
        /// ticket history.
        basis_claimed: Mapping<u32, bool>,
        claimed_asset_count: u32,
        creator_distributed: bool,

        /// Amounts owed after a failed payout delivery, withdrawable at any
        /// time by the affected account.
        pending_withdrawals: Mapping<AccountId, Balance>,
        pending_total: Balance,

        /// Re-entrancy lock, held across collaborator interactions.
        entered: bool,
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    #[ink(event)]
    pub struct Minted {
        #[ink(topic)]
        asset_id: u32,
        minter: AccountId,
        price: Balance,
        tickets: u128,
    }

    #[ink(event)]
    pub struct Listed {
        #[ink(topic)]
        asset_id: u32,
        seller: AccountId,
        price: Balance,
    }

    #[ink(event)]
    pub struct Delisted {
        #[ink(topic)]
        asset_id: u32,
    }

    /// Emitted on every completed trade, after the ledger is re-based and
    /// before the registry transfer and the seller payout.
    #[ink(event)]
    pub struct Sold {
        #[ink(topic)]
        asset_id: u32,
        seller: AccountId,
        buyer: AccountId,
        price: Balance,
        surcharge: Balance,
        tickets: u128,
    }

    #[ink(event)]
    pub struct TicketsAwarded {
        #[ink(topic)]
        participant: AccountId,
        surcharge: Balance,
        tickets: u128,
    }

    #[ink(event)]
    pub struct TriggerInitiated {
        cause: TriggerCause,
        at: Timestamp,
    }

    #[ink(event)]
    pub struct TriggerFinalized {
        cause: TriggerCause,
        at: Timestamp,
    }

    #[ink(event)]
    pub struct TriggerCancelled {
        at: Timestamp,
        price: i128,
    }

    #[ink(event)]
    pub struct ParticipantDistributed {
        #[ink(topic)]
        participant: AccountId,
        bonus: Balance,
        cost_basis_refund: Balance,
        assets_refunded: u32,
    }

    #[ink(event)]
    pub struct CreatorDistributed {
        #[ink(topic)]
        creator: AccountId,
        amount: Balance,
    }

    /// A payout delivery failed and was parked instead of blocking the
    /// operation that produced it.
    #[ink(event)]
    pub struct PendingWithdrawalCreated {
        #[ink(topic)]
        account: AccountId,
        amount: Balance,
        total_owed: Balance,
    }

    #[ink(event)]
    pub struct WithdrawalCompleted {
        #[ink(topic)]
        account: AccountId,
        amount: Balance,
    }

    #[ink(event)]
    pub struct DustSwept {
        to: AccountId,
        amount: Balance,
    }

    // =========================================================================
    // ERRORS
    // =========================================================================

    #[derive(Debug, PartialEq, Eq, scale::Encode, scale::Decode)]
    #[cfg_attr(feature = "std", derive(scale_info::TypeInfo))]
    pub enum Error {
        /// Caller is not the required owner (of the asset, or of the
        /// contract for the owner-only recovery paths).
        NotOwner,
        /// Constructor parameters are inconsistent.
        InvalidConfiguration,

        // ── Marketplace preconditions ────────────────────────────────────
        /// Trading is closed: the trigger left the Inactive state.
        TriggerActive,
        /// Every asset of the collection has been minted.
        SoldOut,
        /// Asset id outside `[0, max_supply)` or without a cost basis.
        InvalidAsset,
        /// The asset already has a cost basis.
        AlreadyMinted,
        /// Mint payment differs from the asset's tier price.
        WrongPrice,
        /// Listings must carry a non-zero price.
        ZeroPrice,
        /// A listing may never undercut the guaranteed refund.
        PriceBelowCostBasis,
        /// No active listing for the asset.
        NotListed,
        /// Buy payment differs from price + surcharge.
        WrongPayment,
        /// Buyer already owns the asset.
        SelfTrade,

        // ── Trigger state machine ────────────────────────────────────────
        /// The trigger is already Initiated.
        AlreadyInitiated,
        /// The trigger is Finalized; no transition leaves that state.
        AlreadyFinalized,
        /// The operation needs an Initiated trigger.
        NotInitiated,
        /// The cooldown since initiation has not elapsed yet.
        CooldownActive,
        /// The cancel window closed when the cooldown elapsed.
        CooldownElapsed,
        /// Deadline initiations are unconditional facts, never revocable.
        DeadlineNotCancellable,
        /// Cancel requires the price to have fallen back below threshold.
        PriceStillAboveThreshold,

        // ── Oracle assessment ────────────────────────────────────────────
        /// The price feed reported a non-positive price.
        InvalidOraclePrice,
        /// The price report is older than the staleness window.
        StaleOraclePrice,
        /// The fresh, valid price is below the trigger threshold.
        PriceBelowThreshold,
        /// The uptime feed reports the sequencer down.
        SequencerDown,
        /// The sequencer came back up too recently; prices not trusted yet.
        SequencerGraceActive,
        /// The oracle call failed outright.  No fallback value is ever
        /// substituted for bad oracle data.
        OracleUnavailable,

        // ── Distribution ─────────────────────────────────────────────────
        /// Distribution opens only once the trigger is Finalized.
        NotFinalized,
        /// The participant has no ticket balance.
        NoTickets,
        /// The participant's bonus was already distributed.
        AlreadyDistributed,
        /// The creator share was already distributed.
        CreatorAlreadyPaid,
        /// Nothing parked in the caller's pending withdrawal balance.
        NothingPending,
        /// `sweep_dust` requires every claim and withdrawal settled.
        NotFullySettled,
        /// The residual balance is already zero.
        NothingToSweep,

        // ── Plumbing ─────────────────────────────────────────────────────
        /// An arithmetic operation overflowed.
        Overflow,
        /// A native value transfer failed.
        TransferFailed,
        /// The asset registry call failed.
        RegistryUnavailable,
        /// Nested call rejected while an interaction is in flight.
        ReentrantCall,
    }

    // =========================================================================
    // COLLABORATOR PLUMBING
    // =========================================================================

    /// Cross-contract calls to the asset registry and the two oracle feeds.
    /// Any failure collapses to one named error per collaborator.
    ///
    /// The off-chain test engine cannot dispatch contract-to-contract calls,
    /// so the unit tests compile an in-memory double of this module with
    /// identical signatures (below, under `#[cfg(test)]`).
    #[cfg(not(test))]
    mod collab {
        use super::{AccountId, Error, Timestamp};
        use ink::env::call::{build_call, ExecutionInput, Selector};
        use ink::env::DefaultEnvironment;

        pub fn owner_of(registry: AccountId, asset_id: u32) -> Result<AccountId, Error> {
            let call = build_call::<DefaultEnvironment>()
                .call(registry)
                .exec_input(
                    ExecutionInput::new(Selector::new(ink::selector_bytes!("owner_of")))
                        .push_arg(&asset_id),
                )
                .returns::<Result<AccountId, Error>>()
                .try_invoke();
            match call {
                Ok(Ok(Ok(owner))) => Ok(owner),
                _ => Err(Error::RegistryUnavailable),
            }
        }

        pub fn mint(registry: AccountId, to: AccountId, asset_id: u32) -> Result<(), Error> {
            let call = build_call::<DefaultEnvironment>()
                .call(registry)
                .exec_input(
                    ExecutionInput::new(Selector::new(ink::selector_bytes!("mint")))
                        .push_arg(&to)
                        .push_arg(&asset_id),
                )
                .returns::<Result<(), Error>>()
                .try_invoke();
            match call {
                Ok(Ok(Ok(()))) => Ok(()),
                _ => Err(Error::RegistryUnavailable),
            }
        }

        pub fn transfer(
            registry: AccountId,
            from: AccountId,
            to: AccountId,
            asset_id: u32,
        ) -> Result<(), Error> {
            let call = build_call::<DefaultEnvironment>()
                .call(registry)
                .exec_input(
                    ExecutionInput::new(Selector::new(ink::selector_bytes!("transfer")))
                        .push_arg(&from)
                        .push_arg(&to)
                        .push_arg(&asset_id),
                )
                .returns::<Result<(), Error>>()
                .try_invoke();
            match call {
                Ok(Ok(Ok(()))) => Ok(()),
                _ => Err(Error::RegistryUnavailable),
            }
        }

        pub fn mark_all_destroyed(registry: AccountId) -> Result<(), Error> {
            let call = build_call::<DefaultEnvironment>()
                .call(registry)
                .exec_input(ExecutionInput::new(Selector::new(ink::selector_bytes!(
                    "mark_all_destroyed"
                ))))
                .returns::<Result<(), Error>>()
                .try_invoke();
            match call {
                Ok(Ok(Ok(()))) => Ok(()),
                _ => Err(Error::RegistryUnavailable),
            }
        }

        pub fn latest_price(feed: AccountId) -> Result<(i128, Timestamp), Error> {
            let call = build_call::<DefaultEnvironment>()
                .call(feed)
                .exec_input(ExecutionInput::new(Selector::new(ink::selector_bytes!(
                    "latest_price"
                ))))
                .returns::<(i128, Timestamp)>()
                .try_invoke();
            match call {
                Ok(Ok(report)) => Ok(report),
                _ => Err(Error::OracleUnavailable),
            }
        }

        pub fn latest_status(feed: AccountId) -> Result<(u8, Timestamp), Error> {
            let call = build_call::<DefaultEnvironment>()
                .call(feed)
                .exec_input(ExecutionInput::new(Selector::new(ink::selector_bytes!(
                    "latest_status"
                ))))
                .returns::<(u8, Timestamp)>()
                .try_invoke();
            match call {
                Ok(Ok(report)) => Ok(report),
                _ => Err(Error::OracleUnavailable),
            }
        }
    }

    /// In-memory collaborator doubles for the unit tests, signature-identical
    /// to the production plumbing above.
    #[cfg(test)]
    mod collab {
        use super::{AccountId, Error, Timestamp};
        use std::cell::RefCell;
        use std::collections::{BTreeMap, BTreeSet};

        thread_local! {
            static OWNERS: RefCell<BTreeMap<u32, AccountId>> = RefCell::new(BTreeMap::new());
            static DESTROY_CALLS: RefCell<u32> = RefCell::new(0);
            static REGISTRY_DOWN: RefCell<bool> = RefCell::new(false);
            static PRICE: RefCell<Option<(i128, Timestamp)>> = RefCell::new(None);
            static STATUS: RefCell<Option<(u8, Timestamp)>> = RefCell::new(None);
            static REJECTED_PAYMENTS: RefCell<BTreeSet<AccountId>> = RefCell::new(BTreeSet::new());
        }

        pub fn owner_of(_registry: AccountId, asset_id: u32) -> Result<AccountId, Error> {
            check_registry()?;
            OWNERS
                .with(|owners| owners.borrow().get(&asset_id).copied())
                .ok_or(Error::RegistryUnavailable)
        }

        pub fn mint(_registry: AccountId, to: AccountId, asset_id: u32) -> Result<(), Error> {
            check_registry()?;
            OWNERS.with(|owners| owners.borrow_mut().insert(asset_id, to));
            Ok(())
        }

        pub fn transfer(
            _registry: AccountId,
            from: AccountId,
            to: AccountId,
            asset_id: u32,
        ) -> Result<(), Error> {
            check_registry()?;
            OWNERS.with(|owners| {
                let mut owners = owners.borrow_mut();
                match owners.get(&asset_id) {
                    Some(owner) if *owner == from => {
                        owners.insert(asset_id, to);
                        Ok(())
                    }
                    _ => Err(Error::RegistryUnavailable),
                }
            })
        }

        pub fn mark_all_destroyed(_registry: AccountId) -> Result<(), Error> {
            check_registry()?;
            DESTROY_CALLS.with(|count| *count.borrow_mut() += 1);
            Ok(())
        }

        pub fn latest_price(_feed: AccountId) -> Result<(i128, Timestamp), Error> {
            PRICE
                .with(|price| *price.borrow())
                .ok_or(Error::OracleUnavailable)
        }

        pub fn latest_status(_feed: AccountId) -> Result<(u8, Timestamp), Error> {
            STATUS
                .with(|status| *status.borrow())
                .ok_or(Error::OracleUnavailable)
        }

        fn check_registry() -> Result<(), Error> {
            if REGISTRY_DOWN.with(|down| *down.borrow()) {
                return Err(Error::RegistryUnavailable);
            }
            Ok(())
        }

        // ── Test knobs ────────────────────────────────────────────────────

        pub fn reset() {
            OWNERS.with(|owners| owners.borrow_mut().clear());
            DESTROY_CALLS.with(|count| *count.borrow_mut() = 0);
            REGISTRY_DOWN.with(|down| *down.borrow_mut() = false);
            PRICE.with(|price| *price.borrow_mut() = None);
            STATUS.with(|status| *status.borrow_mut() = None);
            REJECTED_PAYMENTS.with(|rejected| rejected.borrow_mut().clear());
        }

        pub fn set_price(price: i128, updated_at: Timestamp) {
            PRICE.with(|slot| *slot.borrow_mut() = Some((price, updated_at)));
        }

        pub fn set_status(code: u8, changed_at: Timestamp) {
            STATUS.with(|slot| *slot.borrow_mut() = Some((code, changed_at)));
        }

        pub fn set_registry_down(down: bool) {
            REGISTRY_DOWN.with(|slot| *slot.borrow_mut() = down);
        }

        pub fn destroy_calls() -> u32 {
            DESTROY_CALLS.with(|count| *count.borrow())
        }

        pub fn holder_of(asset_id: u32) -> Option<AccountId> {
            OWNERS.with(|owners| owners.borrow().get(&asset_id).copied())
        }

        /// Mark `account` as refusing (or accepting again) native payouts.
        pub fn set_payment_rejected(account: AccountId, rejected: bool) {
            REJECTED_PAYMENTS.with(|set| {
                if rejected {
                    set.borrow_mut().insert(account);
                } else {
                    set.borrow_mut().remove(&account);
                }
            });
        }

        pub fn payment_rejected(account: AccountId) -> bool {
            REJECTED_PAYMENTS.with(|set| set.borrow().contains(&account))
        }
    }

    // =========================================================================
    // IMPLEMENTATION
    // =========================================================================

    impl GalleryPool {
        // ---------------------------------------------------------------------
        // Constructor
        // ---------------------------------------------------------------------

        /// Deploy the pool against its collaborators.
        ///
        /// `uptime_feed = None` disables the sequencer check entirely
        /// ("assume always up").  Economic parameters are immutable after
        /// deployment; there are no setters.
        #[ink(constructor)]
        pub fn new(
            params: PoolParams,
            asset_registry: AccountId,
            price_feed: AccountId,
            uptime_feed: Option<AccountId>,
        ) -> Result<Self, Error> {
            Self::validate_params(&params)?;
            Ok(Self {
                owner: Self::env().caller(),
                params,
                asset_registry,
                price_feed,
                uptime_feed,
                deployed_at: Self::env().block_timestamp(),
                guarantee_pool: 0,
                surplus_pool: 0,
                cost_basis: Mapping::default(),
                listings: Mapping::default(),
                minted_count: 0,
                tickets: Mapping::default(),
                total_tickets: 0,
                total_participants: 0,
                trigger_state: TriggerState::Inactive,
                trigger_cause: None,
                initiated_at: 0,
                bonus_claimed: Mapping::default(),
                distributed_participants: 0,
                basis_claimed: Mapping::default(),
                claimed_asset_count: 0,
                creator_distributed: false,
                pending_withdrawals: Mapping::default(),
                pending_total: 0,
                entered: false,
            })
        }

        fn validate_params(params: &PoolParams) -> Result<(), Error> {
            if params.max_supply == 0
                || params.ticket_unit == 0
                || params.surcharge_bps > BPS_DENOMINATOR
                || params.creator_fee_bps > BPS_DENOMINATOR
                || params.mint_tiers.is_empty()
            {
                return Err(Error::InvalidConfiguration);
            }
            let mut prev_upto = 0u32;
            for tier in params.mint_tiers.iter() {
                if tier.price == 0 || tier.upto <= prev_upto {
                    return Err(Error::InvalidConfiguration);
                }
                prev_upto = tier.upto;
            }
            if prev_upto < params.max_supply {
                return Err(Error::InvalidConfiguration);
            }
            Ok(())
        }

        // =====================================================================
        // MARKETPLACE ENGINE
        // =====================================================================

        /// Mint `asset_id` to the caller for its exact tier price.
        ///
        /// The full payment escrows into the guarantee pool.  Mint carries no
        /// real surcharge, but tickets are still awarded on the notional
        /// surcharge (price × rate) to bootstrap participation.
        #[ink(message, payable)]
        pub fn mint(&mut self, asset_id: u32) -> Result<(), Error> {
            self.assert_trading_open()?;
            let minter = self.env().caller();
            let paid = self.env().transferred_value();

            if self.minted_count >= self.params.max_supply {
                return Err(Error::SoldOut);
            }
            if asset_id >= self.params.max_supply {
                return Err(Error::InvalidAsset);
            }
            if self.cost_basis.contains(asset_id) {
                return Err(Error::AlreadyMinted);
            }
            let tier_price = self.get_mint_price(asset_id).ok_or(Error::InvalidAsset)?;
            if paid != tier_price {
                return Err(Error::WrongPrice);
            }

            let new_guarantee = self
                .guarantee_pool
                .checked_add(paid)
                .ok_or(Error::Overflow)?;
            let notional_surcharge = self.surcharge_on(paid)?;

            self.lock()?;
            self.cost_basis.insert(asset_id, &paid);
            self.guarantee_pool = new_guarantee;
            self.minted_count += 1;
            let tickets = self.accrue_tickets(minter, notional_surcharge);
            self.env().emit_event(Minted {
                asset_id,
                minter,
                price: paid,
                tickets,
            });

            if collab::mint(self.asset_registry, minter, asset_id).is_err() {
                self.unlock();
                return Err(Error::RegistryUnavailable);
            }
            self.unlock();
            Ok(())
        }

        /// List an owned asset.  The price can never undercut the cost
        /// basis: the guaranteed refund must stay covered by any sale.
        #[ink(message)]
        pub fn list(&mut self, asset_id: u32, price: Balance) -> Result<(), Error> {
            self.assert_trading_open()?;
            if self.entered {
                return Err(Error::ReentrantCall);
            }
            let caller = self.env().caller();
            let basis = self.cost_basis.get(asset_id).ok_or(Error::InvalidAsset)?;
            let owner = collab::owner_of(self.asset_registry, asset_id)?;
            if owner != caller {
                return Err(Error::NotOwner);
            }
            if price == 0 {
                return Err(Error::ZeroPrice);
            }
            if price < basis {
                return Err(Error::PriceBelowCostBasis);
            }
            self.listings.insert(
                asset_id,
                &Listing {
                    price,
                    active: true,
                },
            );
            self.env().emit_event(Listed {
                asset_id,
                seller: caller,
                price,
            });
            Ok(())
        }

        /// Deactivate a listing.  Allowed in any trigger state; withdrawing
        /// an offer is always safe.
        #[ink(message)]
        pub fn delist(&mut self, asset_id: u32) -> Result<(), Error> {
            if self.entered {
                return Err(Error::ReentrantCall);
            }
            let caller = self.env().caller();
            let listing = self
                .listings
                .get(asset_id)
                .filter(|listing| listing.active)
                .ok_or(Error::NotListed)?;
            let owner = collab::owner_of(self.asset_registry, asset_id)?;
            if owner != caller {
                return Err(Error::NotOwner);
            }
            self.listings.insert(
                asset_id,
                &Listing {
                    price: listing.price,
                    active: false,
                },
            );
            self.env().emit_event(Delisted { asset_id });
            Ok(())
        }

        /// Buy a listed asset for exactly `price + ⌊price × surcharge⌋`.
        ///
        /// The ledger is fully re-based — listing off, guarantee pool moved
        /// to the new basis, surplus grown, buyer tickets credited — before
        /// the registry transfer and the seller payout run.  A seller that
        /// rejects the payout gets a pending withdrawal instead of a veto.
        #[ink(message, payable)]
        pub fn buy(&mut self, asset_id: u32) -> Result<(), Error> {
            self.assert_trading_open()?;
            let buyer = self.env().caller();
            let paid = self.env().transferred_value();

            let listing = self
                .listings
                .get(asset_id)
                .filter(|listing| listing.active)
                .ok_or(Error::NotListed)?;
            let seller = collab::owner_of(self.asset_registry, asset_id)?;
            if buyer == seller {
                return Err(Error::SelfTrade);
            }

            let surcharge = self.surcharge_on(listing.price)?;
            let expected = listing
                .price
                .checked_add(surcharge)
                .ok_or(Error::Overflow)?;
            if paid != expected {
                return Err(Error::WrongPayment);
            }

            let old_basis = self.cost_basis.get(asset_id).ok_or(Error::InvalidAsset)?;
            let new_guarantee = self
                .guarantee_pool
                .checked_sub(old_basis)
                .ok_or(Error::Overflow)?
                .checked_add(listing.price)
                .ok_or(Error::Overflow)?;
            let new_surplus = self
                .surplus_pool
                .checked_add(surcharge)
                .ok_or(Error::Overflow)?;

            self.lock()?;
            self.listings.insert(
                asset_id,
                &Listing {
                    price: listing.price,
                    active: false,
                },
            );
            self.guarantee_pool = new_guarantee;
            self.cost_basis.insert(asset_id, &listing.price);
            self.surplus_pool = new_surplus;
            let tickets = self.accrue_tickets(buyer, surcharge);
            self.env().emit_event(Sold {
                asset_id,
                seller,
                buyer,
                price: listing.price,
                surcharge,
                tickets,
            });

            if collab::transfer(self.asset_registry, seller, buyer, asset_id).is_err() {
                self.unlock();
                return Err(Error::RegistryUnavailable);
            }
            // Cost-basis refund to the seller; failure parks the amount.
            self.pay_or_credit(seller, old_basis);
            self.unlock();
            Ok(())
        }

        // =====================================================================
        // TICKET ACCRUAL
        // =====================================================================

        /// Convert a surcharge into whole tickets and credit them.
        ///
        /// A surcharge below one ticket unit is a silent no-op: no event, no
        /// participant count change.  Tickets are permanent once earned.
        fn accrue_tickets(&mut self, participant: AccountId, surcharge: Balance) -> u128 {
            let tickets = surcharge / self.params.ticket_unit;
            if tickets == 0 {
                return 0;
            }
            let current = self.tickets.get(participant).unwrap_or(0);
            if current == 0 {
                self.total_participants = self.total_participants.saturating_add(1);
            }
            self.tickets
                .insert(participant, &(current.saturating_add(tickets)));
            self.total_tickets = self.total_tickets.saturating_add(tickets);
            self.env().emit_event(TicketsAwarded {
                participant,
                surcharge,
                tickets,
            });
            tickets
        }

        // =====================================================================
        // TRIGGER STATE MACHINE
        // =====================================================================

        /// Arm the trigger: deadline elapsed, or a fresh, valid oracle price
        /// at/above threshold with the sequencer up past its grace period.
        #[ink(message)]
        pub fn initiate_trigger(&mut self) -> Result<(), Error> {
            match self.trigger_state {
                TriggerState::Inactive => {}
                TriggerState::Initiated => return Err(Error::AlreadyInitiated),
                TriggerState::Finalized => return Err(Error::AlreadyFinalized),
            }
            let now = self.env().block_timestamp();
            let cause = self.check_trigger_condition(now)?;
            self.trigger_state = TriggerState::Initiated;
            self.trigger_cause = Some(cause);
            self.initiated_at = now;
            self.env().emit_event(TriggerInitiated { cause, at: now });
            Ok(())
        }

        /// Make the trigger irreversible once the cooldown has elapsed.
        ///
        /// Re-runs the same deadline-or-oracle check as initiation: a price
        /// that spiked into the threshold and fell back during the cooldown
        /// must not turn a market event into a destruction event.
        #[ink(message)]
        pub fn finalize_trigger(&mut self) -> Result<(), Error> {
            match self.trigger_state {
                TriggerState::Initiated => {}
                TriggerState::Inactive => return Err(Error::NotInitiated),
                TriggerState::Finalized => return Err(Error::AlreadyFinalized),
            }
            let now = self.env().block_timestamp();
            if now < self.initiated_at.saturating_add(self.params.cooldown_ms) {
                return Err(Error::CooldownActive);
            }
            let cause = self.check_trigger_condition(now)?;
            self.trigger_state = TriggerState::Finalized;
            self.env().emit_event(TriggerFinalized { cause, at: now });
            if collab::mark_all_destroyed(self.asset_registry).is_err() {
                return Err(Error::RegistryUnavailable);
            }
            Ok(())
        }

        /// Disarm a price-based trigger whose price fell back below the
        /// threshold inside the cooldown window.  Fails loudly when the
        /// price still holds; never applies to deadline initiations.
        #[ink(message)]
        pub fn cancel_trigger(&mut self) -> Result<(), Error> {
            match self.trigger_state {
                TriggerState::Initiated => {}
                TriggerState::Inactive => return Err(Error::NotInitiated),
                TriggerState::Finalized => return Err(Error::AlreadyFinalized),
            }
            let now = self.env().block_timestamp();
            if now >= self.initiated_at.saturating_add(self.params.cooldown_ms) {
                return Err(Error::CooldownElapsed);
            }
            if self.trigger_cause == Some(TriggerCause::Deadline) {
                return Err(Error::DeadlineNotCancellable);
            }
            let (price, updated_at) = collab::latest_price(self.price_feed)?;
            if price <= 0 {
                return Err(Error::InvalidOraclePrice);
            }
            if now.saturating_sub(updated_at) > self.params.price_max_age_ms {
                return Err(Error::StaleOraclePrice);
            }
            if price >= self.params.trigger_price {
                return Err(Error::PriceStillAboveThreshold);
            }
            self.trigger_state = TriggerState::Inactive;
            self.trigger_cause = None;
            self.initiated_at = 0;
            self.env().emit_event(TriggerCancelled { at: now, price });
            Ok(())
        }

        /// The shared initiate/finalize condition.
        fn check_trigger_condition(&self, now: Timestamp) -> Result<TriggerCause, Error> {
            // The deadline is an unconditional fact; oracles are not
            // consulted and cannot second-guess it.
            if now >= self.deployed_at.saturating_add(self.params.deadline_ms) {
                return Ok(TriggerCause::Deadline);
            }
            if let Some(feed) = self.uptime_feed {
                let (status, changed_at) = collab::latest_status(feed)?;
                Self::assess_uptime_report(status, changed_at, now, self.params.uptime_grace_ms)?;
            }
            let (price, updated_at) = collab::latest_price(self.price_feed)?;
            Self::assess_price_report(
                price,
                updated_at,
                now,
                self.params.price_max_age_ms,
                self.params.trigger_price,
            )?;
            Ok(TriggerCause::Price)
        }

        fn assess_price_report(
            price: i128,
            updated_at: Timestamp,
            now: Timestamp,
            max_age: u64,
            threshold: i128,
        ) -> Result<(), Error> {
            if price <= 0 {
                return Err(Error::InvalidOraclePrice);
            }
            if now.saturating_sub(updated_at) > max_age {
                return Err(Error::StaleOraclePrice);
            }
            if price < threshold {
                return Err(Error::PriceBelowThreshold);
            }
            Ok(())
        }

        /// Status code 0 = up.  A feed that only just came back up is not
        /// trusted until the grace period has fully elapsed.
        fn assess_uptime_report(
            status: u8,
            changed_at: Timestamp,
            now: Timestamp,
            grace: u64,
        ) -> Result<(), Error> {
            if status != 0 {
                return Err(Error::SequencerDown);
            }
            if now.saturating_sub(changed_at) < grace {
                return Err(Error::SequencerGraceActive);
            }
            Ok(())
        }

        // =====================================================================
        // DISTRIBUTION ENGINE
        // =====================================================================

        /// Distribute the surplus-pool bonus and all owed cost-basis refunds
        /// to `participant`.  Callable by anyone on any participant's behalf.
        ///
        /// The bonus claim is per participant; cost-basis claims are per
        /// asset and follow whoever held the asset at finalization, however
        /// many times it changed hands before the trigger.
        #[ink(message)]
        pub fn distribute_for(&mut self, participant: AccountId) -> Result<(), Error> {
            if self.trigger_state != TriggerState::Finalized {
                return Err(Error::NotFinalized);
            }
            let ticket_balance = self.tickets.get(participant).unwrap_or(0);
            if ticket_balance == 0 {
                return Err(Error::NoTickets);
            }
            if self.bonus_claimed.get(participant).unwrap_or(false) {
                return Err(Error::AlreadyDistributed);
            }
            let bonus = self.bonus_share(ticket_balance)?;

            self.lock()?;
            self.bonus_claimed.insert(participant, &true);
            self.distributed_participants = self.distributed_participants.saturating_add(1);

            let mut basis_total: Balance = 0;
            let mut assets_refunded: u32 = 0;
            for asset_id in 0..self.params.max_supply {
                let Some(basis) = self.cost_basis.get(asset_id) else {
                    continue;
                };
                if self.basis_claimed.get(asset_id).unwrap_or(false) {
                    continue;
                }
                let holder = match collab::owner_of(self.asset_registry, asset_id) {
                    Ok(holder) => holder,
                    Err(err) => {
                        self.unlock();
                        return Err(err);
                    }
                };
                if holder != participant {
                    continue;
                }
                self.basis_claimed.insert(asset_id, &true);
                self.claimed_asset_count = self.claimed_asset_count.saturating_add(1);
                basis_total = basis_total.saturating_add(basis);
                assets_refunded += 1;
            }

            self.env().emit_event(ParticipantDistributed {
                participant,
                bonus,
                cost_basis_refund: basis_total,
                assets_refunded,
            });
            self.pay_or_credit(participant, bonus.saturating_add(basis_total));
            self.unlock();
            Ok(())
        }

        /// Pay the creator's fixed share of the surplus pool, once.
        #[ink(message)]
        pub fn distribute_creator(&mut self) -> Result<(), Error> {
            if self.trigger_state != TriggerState::Finalized {
                return Err(Error::NotFinalized);
            }
            if self.creator_distributed {
                return Err(Error::CreatorAlreadyPaid);
            }
            let amount = self
                .surplus_pool
                .checked_mul(self.params.creator_fee_bps)
                .ok_or(Error::Overflow)?
                / BPS_DENOMINATOR;

            self.lock()?;
            self.creator_distributed = true;
            self.env().emit_event(CreatorDistributed {
                creator: self.params.creator,
                amount,
            });
            self.pay_or_credit(self.params.creator, amount);
            self.unlock();
            Ok(())
        }

        /// Manual recovery path for failed payout deliveries — the only
        /// retry mechanism in the system, initiated by the affected party.
        #[ink(message)]
        pub fn withdraw(&mut self) -> Result<(), Error> {
            let caller = self.env().caller();
            let amount = self.pending_withdrawals.get(caller).unwrap_or(0);
            if amount == 0 {
                return Err(Error::NothingPending);
            }
            self.lock()?;
            self.pending_withdrawals.remove(caller);
            self.pending_total = self.pending_total.saturating_sub(amount);
            if self.deliver(caller, amount).is_err() {
                self.pending_withdrawals.insert(caller, &amount);
                self.pending_total = self.pending_total.saturating_add(amount);
                self.unlock();
                return Err(Error::TransferFailed);
            }
            self.env().emit_event(WithdrawalCompleted {
                account: caller,
                amount,
            });
            self.unlock();
            Ok(())
        }

        /// Owner-only recovery of the rounding residue, gated on everything
        /// being settled: creator paid, every ticket holder distributed, no
        /// outstanding pending withdrawal, every minted asset's cost basis
        /// claimed.
        #[ink(message)]
        pub fn sweep_dust(&mut self) -> Result<(), Error> {
            self.only_owner()?;
            if self.trigger_state != TriggerState::Finalized {
                return Err(Error::NotFinalized);
            }
            if !self.creator_distributed
                || self.distributed_participants != self.total_participants
                || self.pending_total != 0
                || self.claimed_asset_count != self.minted_count
            {
                return Err(Error::NotFullySettled);
            }
            let residual = self.env().balance();
            if residual == 0 {
                return Err(Error::NothingToSweep);
            }
            self.lock()?;
            if self.deliver(self.owner, residual).is_err() {
                self.unlock();
                return Err(Error::TransferFailed);
            }
            self.env().emit_event(DustSwept {
                to: self.owner,
                amount: residual,
            });
            self.unlock();
            Ok(())
        }

        /// `⌊surplus × (10000 − fee) × tickets / (10000 × total)⌋`.
        /// Multiplication strictly before division; the truncated remainder
        /// stays in the contract.
        fn bonus_share(&self, ticket_balance: u128) -> Result<Balance, Error> {
            if self.total_tickets == 0 {
                return Ok(0);
            }
            let participant_bps = BPS_DENOMINATOR - self.params.creator_fee_bps;
            let numerator = self
                .surplus_pool
                .checked_mul(participant_bps)
                .ok_or(Error::Overflow)?
                .checked_mul(ticket_balance)
                .ok_or(Error::Overflow)?;
            let denominator = BPS_DENOMINATOR
                .checked_mul(self.total_tickets)
                .ok_or(Error::Overflow)?;
            Ok(numerator / denominator)
        }

        /// Native value delivery.  Every outbound payment funnels through
        /// here so there is exactly one failure surface.
        #[cfg(not(test))]
        fn deliver(&self, to: AccountId, amount: Balance) -> Result<(), Error> {
            self.env().transfer(to, amount).map_err(|_| Error::TransferFailed)
        }

        /// Test build of the delivery funnel.  The off-chain engine aborts
        /// outright on an underfunded transfer instead of reporting it, so
        /// delivery failure is injected per account through the same
        /// double seam the collaborators use.
        #[cfg(test)]
        fn deliver(&self, to: AccountId, amount: Balance) -> Result<(), Error> {
            if collab::payment_rejected(to) {
                return Err(Error::TransferFailed);
            }
            self.env().transfer(to, amount).map_err(|_| Error::TransferFailed)
        }

        /// Deliver `amount` or park it as a pending withdrawal.  Never fails
        /// the surrounding operation.
        fn pay_or_credit(&mut self, to: AccountId, amount: Balance) {
            if amount == 0 {
                return;
            }
            if self.deliver(to, amount).is_err() {
                let total_owed = self
                    .pending_withdrawals
                    .get(to)
                    .unwrap_or(0)
                    .saturating_add(amount);
                self.pending_withdrawals.insert(to, &total_owed);
                self.pending_total = self.pending_total.saturating_add(amount);
                self.env().emit_event(PendingWithdrawalCreated {
                    account: to,
                    amount,
                    total_owed,
                });
            }
        }

        // =====================================================================
        // VIEW FUNCTIONS
        // =====================================================================

        #[ink(message)]
        pub fn get_guarantee_pool(&self) -> Balance {
            self.guarantee_pool
        }

        #[ink(message)]
        pub fn get_surplus_pool(&self) -> Balance {
            self.surplus_pool
        }

        #[ink(message)]
        pub fn get_cost_basis(&self, asset_id: u32) -> Option<Balance> {
            self.cost_basis.get(asset_id)
        }

        #[ink(message)]
        pub fn get_listing(&self, asset_id: u32) -> Option<Listing> {
            self.listings.get(asset_id)
        }

        #[ink(message)]
        pub fn get_mint_price(&self, asset_id: u32) -> Option<Balance> {
            if asset_id >= self.params.max_supply {
                return None;
            }
            self.params
                .mint_tiers
                .iter()
                .find(|tier| asset_id < tier.upto)
                .map(|tier| tier.price)
        }

        #[ink(message)]
        pub fn get_tickets(&self, participant: AccountId) -> u128 {
            self.tickets.get(participant).unwrap_or(0)
        }

        #[ink(message)]
        pub fn get_total_tickets(&self) -> u128 {
            self.total_tickets
        }

        #[ink(message)]
        pub fn get_total_participants(&self) -> u32 {
            self.total_participants
        }

        #[ink(message)]
        pub fn get_minted_count(&self) -> u32 {
            self.minted_count
        }

        #[ink(message)]
        pub fn get_pending(&self, account: AccountId) -> Balance {
            self.pending_withdrawals.get(account).unwrap_or(0)
        }

        /// Returns: (state, cause, initiated_at, deployed_at).
        #[ink(message)]
        pub fn get_trigger_status(
            &self,
        ) -> (TriggerState, Option<TriggerCause>, Timestamp, Timestamp) {
            (
                self.trigger_state,
                self.trigger_cause,
                self.initiated_at,
                self.deployed_at,
            )
        }

        #[ink(message)]
        pub fn get_params(&self) -> PoolParams {
            self.params.clone()
        }

        /// Estimate what `distribute_for` would deliver right now, without
        /// mutating: (bonus share, cost-basis refund).  Already-claimed
        /// portions report as zero.
        #[ink(message)]
        pub fn preview_payout(&self, participant: AccountId) -> (Balance, Balance) {
            let ticket_balance = self.tickets.get(participant).unwrap_or(0);
            let bonus = if ticket_balance == 0
                || self.bonus_claimed.get(participant).unwrap_or(false)
            {
                0
            } else {
                self.bonus_share(ticket_balance).unwrap_or(0)
            };
            let mut basis_total: Balance = 0;
            for asset_id in 0..self.params.max_supply {
                let Some(basis) = self.cost_basis.get(asset_id) else {
                    continue;
                };
                if self.basis_claimed.get(asset_id).unwrap_or(false) {
                    continue;
                }
                if collab::owner_of(self.asset_registry, asset_id) == Ok(participant) {
                    basis_total = basis_total.saturating_add(basis);
                }
            }
            (bonus, basis_total)
        }

        // =====================================================================
        // INTERNAL — guards & arithmetic
        // =====================================================================

        /// Truncating surcharge: `⌊price × rate⌋` in basis points.
        fn surcharge_on(&self, price: Balance) -> Result<Balance, Error> {
            Ok(price
                .checked_mul(self.params.surcharge_bps)
                .ok_or(Error::Overflow)?
                / BPS_DENOMINATOR)
        }

        fn assert_trading_open(&self) -> Result<(), Error> {
            match self.trigger_state {
                TriggerState::Inactive => Ok(()),
                _ => Err(Error::TriggerActive),
            }
        }

        fn only_owner(&self) -> Result<(), Error> {
            if self.env().caller() != self.owner {
                return Err(Error::NotOwner);
            }
            Ok(())
        }

        fn lock(&mut self) -> Result<(), Error> {
            if self.entered {
                return Err(Error::ReentrantCall);
            }
            self.entered = true;
            Ok(())
        }

        fn unlock(&mut self) {
            self.entered = false;
        }
    }

    // =========================================================================
    // UNIT TESTS
    // =========================================================================

}
