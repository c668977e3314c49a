//! Roundpool VRF Coordinator Contract
//!
//! The randomness collaborator seen by the prediction pool. It does not
//! produce randomness itself; it correlates requests with callbacks:
//!
//! 1. A registered consumer contract calls `request_randomness` for one of
//!    its rounds and receives a fresh `request_id`.
//! 2. The off-chain operator later calls `fulfill` with the random value it
//!    obtained for that request. The coordinator invokes
//!    `on_randomness(coordinator, request_id, random_value)` on the consumer
//!    and records whether the consumer accepted the delivery.
//!
//! A request can be fulfilled exactly once. Consumer rejection does not
//! unwind the fulfillment: the value is recorded and the outcome is
//! published, so a misbehaving consumer cannot force the operator to retry
//! with a different value.
//!
//! ## Storage Strategy
//! - `instance()`: Admin, Operator, NextRequestId.
//! - `persistent()`: Consumer registrations, pending Request entries and
//!   Fulfillment records, TTL bumped on every write.
#![no_std]
#![allow(unexpected_cfgs)]

use soroban_sdk::{
    contract, contractclient, contracterror, contractevent, contractimpl, contracttype, Address,
    Env, U256,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Persistent storage TTL in ledgers (~30 days at 5 s/ledger).
pub const PERSISTENT_BUMP_LEDGERS: u32 = 518_400;

// ---------------------------------------------------------------------------
// Error Types
// ---------------------------------------------------------------------------

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized     = 2,
    NotAuthorized      = 3,
    /// The `consumer` passed to `request_randomness` is not registered.
    UnknownConsumer    = 4,
    RequestNotFound    = 5,
    /// `fulfill` was called a second time for the same `request_id`.
    AlreadyFulfilled   = 6,
    Overflow           = 7,
}

// ---------------------------------------------------------------------------
// Consumer interface
// ---------------------------------------------------------------------------

/// Callback every consumer contract exposes. The coordinator passes its own
/// address as `oracle` so the consumer can match it against its configured
/// trusted source.
#[contractclient(name = "RandomnessConsumerClient")]
pub trait RandomnessConsumer {
    fn on_randomness(env: Env, oracle: Address, request_id: u64, random_value: U256);
}

// ---------------------------------------------------------------------------
// Storage Types
// ---------------------------------------------------------------------------

#[contracttype]
pub enum DataKey {
    // --- instance() ---
    Admin,
    Operator,
    NextRequestId,
    // --- persistent() ---
    Consumer(Address),
    /// Outstanding request awaiting the operator.
    Request(u64),
    /// Terminal record for a request, kept for replay rejection and audit.
    Fulfillment(u64),
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestEntry {
    pub consumer: Address,
    /// Consumer-side correlation context (the prediction pool's round id).
    pub round_id: u64,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FulfillmentEntry {
    pub consumer: Address,
    pub round_id: u64,
    pub random_value: U256,
    /// `true` when the consumer's `on_randomness` returned successfully.
    pub delivered: bool,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[contractevent]
pub struct ConsumerAdded {
    #[topic]
    pub consumer: Address,
}

#[contractevent]
pub struct ConsumerRemoved {
    #[topic]
    pub consumer: Address,
}

#[contractevent]
pub struct RandomnessRequested {
    #[topic]
    pub request_id: u64,
    #[topic]
    pub consumer: Address,
    pub round_id: u64,
}

#[contractevent]
pub struct RandomnessFulfilled {
    #[topic]
    pub request_id: u64,
    pub random_value: U256,
    pub delivered: bool,
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[contract]
pub struct VrfCoordinator;

#[contractimpl]
impl VrfCoordinator {
    /// Initialize the coordinator. May only be called once.
    ///
    /// `operator` is the sole address permitted to call `fulfill`.
    pub fn init(env: Env, admin: Address, operator: Address) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Admin) {
            return Err(Error::AlreadyInitialized);
        }

        admin.require_auth();

        env.storage().instance().set(&DataKey::Admin, &admin);
        env.storage().instance().set(&DataKey::Operator, &operator);
        env.storage().instance().set(&DataKey::NextRequestId, &1u64);
        extend_instance_ttl(&env);

        Ok(())
    }

    /// Register a consumer contract. Admin only.
    pub fn add_consumer(env: Env, admin: Address, consumer: Address) -> Result<(), Error> {
        require_initialized(&env)?;
        require_admin(&env, &admin)?;

        let key = DataKey::Consumer(consumer.clone());
        env.storage().persistent().set(&key, &());
        env.storage()
            .persistent()
            .extend_ttl(&key, PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);

        ConsumerAdded { consumer }.publish(&env);

        Ok(())
    }

    /// Deregister a consumer. Outstanding requests stay fulfillable.
    pub fn remove_consumer(env: Env, admin: Address, consumer: Address) -> Result<(), Error> {
        require_initialized(&env)?;
        require_admin(&env, &admin)?;

        env.storage()
            .persistent()
            .remove(&DataKey::Consumer(consumer.clone()));

        ConsumerRemoved { consumer }.publish(&env);

        Ok(())
    }

    pub fn is_consumer(env: Env, consumer: Address) -> bool {
        env.storage().persistent().has(&DataKey::Consumer(consumer))
    }

    /// Open a randomness request on behalf of `consumer` and return its id.
    ///
    /// Ids are allocated sequentially from 1 and never reused, so a consumer
    /// can key its own bookkeeping on them without collision checks.
    pub fn request_randomness(env: Env, consumer: Address, round_id: u64) -> Result<u64, Error> {
        require_initialized(&env)?;

        consumer.require_auth();

        if !env
            .storage()
            .persistent()
            .has(&DataKey::Consumer(consumer.clone()))
        {
            return Err(Error::UnknownConsumer);
        }

        let request_id: u64 = env
            .storage()
            .instance()
            .get(&DataKey::NextRequestId)
            .ok_or(Error::NotInitialized)?;
        let next = request_id.checked_add(1).ok_or(Error::Overflow)?;
        env.storage().instance().set(&DataKey::NextRequestId, &next);
        extend_instance_ttl(&env);

        let key = DataKey::Request(request_id);
        let entry = RequestEntry { consumer: consumer.clone(), round_id };
        env.storage().persistent().set(&key, &entry);
        env.storage()
            .persistent()
            .extend_ttl(&key, PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);

        RandomnessRequested { request_id, consumer, round_id }.publish(&env);

        Ok(request_id)
    }

    /// Deliver `random_value` for `request_id`. Operator only.
    ///
    /// The fulfillment record is written before the consumer is called. A
    /// failing consumer callback is caught and recorded as
    /// `delivered = false`; the request is consumed either way.
    pub fn fulfill(
        env: Env,
        operator: Address,
        request_id: u64,
        random_value: U256,
    ) -> Result<bool, Error> {
        require_initialized(&env)?;
        require_operator(&env, &operator)?;

        let fulfilled_key = DataKey::Fulfillment(request_id);
        if env.storage().persistent().has(&fulfilled_key) {
            return Err(Error::AlreadyFulfilled);
        }

        let pending_key = DataKey::Request(request_id);
        let pending: RequestEntry = env
            .storage()
            .persistent()
            .get(&pending_key)
            .ok_or(Error::RequestNotFound)?;

        env.storage().persistent().remove(&pending_key);

        let mut record = FulfillmentEntry {
            consumer: pending.consumer.clone(),
            round_id: pending.round_id,
            random_value: random_value.clone(),
            delivered: false,
        };
        write_fulfillment(&env, &fulfilled_key, &record);

        let outcome = RandomnessConsumerClient::new(&env, &pending.consumer).try_on_randomness(
            &env.current_contract_address(),
            &request_id,
            &random_value,
        );
        let delivered = matches!(outcome, Ok(Ok(())));

        if delivered {
            record.delivered = true;
            write_fulfillment(&env, &fulfilled_key, &record);
        }

        RandomnessFulfilled { request_id, random_value, delivered }.publish(&env);

        Ok(delivered)
    }

    /// Return the outstanding request for `request_id`.
    pub fn get_request(env: Env, request_id: u64) -> Result<RequestEntry, Error> {
        env.storage()
            .persistent()
            .get(&DataKey::Request(request_id))
            .ok_or(Error::RequestNotFound)
    }

    /// Return the fulfillment record for `request_id`.
    ///
    /// Returns `RequestNotFound` while the request is still pending.
    pub fn get_fulfillment(env: Env, request_id: u64) -> Result<FulfillmentEntry, Error> {
        env.storage()
            .persistent()
            .get(&DataKey::Fulfillment(request_id))
            .ok_or(Error::RequestNotFound)
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn require_initialized(env: &Env) -> Result<(), Error> {
    if !env.storage().instance().has(&DataKey::Admin) {
        return Err(Error::NotInitialized);
    }
    Ok(())
}

fn require_admin(env: &Env, caller: &Address) -> Result<(), Error> {
    let admin: Address = env
        .storage()
        .instance()
        .get(&DataKey::Admin)
        .ok_or(Error::NotInitialized)?;
    caller.require_auth();
    if caller != &admin {
        return Err(Error::NotAuthorized);
    }
    Ok(())
}

fn require_operator(env: &Env, caller: &Address) -> Result<(), Error> {
    let operator: Address = env
        .storage()
        .instance()
        .get(&DataKey::Operator)
        .ok_or(Error::NotInitialized)?;
    caller.require_auth();
    if caller != &operator {
        return Err(Error::NotAuthorized);
    }
    Ok(())
}

fn extend_instance_ttl(env: &Env) {
    env.storage()
        .instance()
        .extend_ttl(PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);
}

fn write_fulfillment(env: &Env, key: &DataKey, record: &FulfillmentEntry) {
    env.storage().persistent().set(key, record);
    env.storage()
        .persistent()
        .extend_ttl(key, PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
