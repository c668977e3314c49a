//! Round store and contract configuration.
//!
//! Rounds are keyed by id in `persistent()` storage and are never removed.
//! `CurrentRoundId` in `instance()` storage is the only pointer to the
//! active round; ids are allocated by `create_round` and nothing else.

use soroban_sdk::{contracttype, Address, Env, IntoVal, Val};

use crate::{Error, Round, PERSISTENT_BUMP_LEDGERS};

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    // --- instance() ---
    Admin,
    Oracle,
    Token,
    EntryFee,
    MaxPlayers,
    CurrentRoundId,
    // --- persistent() ---
    Round(u64),
    /// Pending randomness request id -> round id. Removed when consumed.
    RequestRound(u64),
    /// Consumed request id -> round id, kept to tell replays from strangers.
    ConsumedRequest(u64),
    /// Prize value owed to a winner whose payout transfer failed.
    Unpaid(Address),
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub fn is_initialized(env: &Env) -> bool {
    env.storage().instance().has(&DataKey::Admin)
}

pub fn write_config(
    env: &Env,
    admin: &Address,
    oracle: &Address,
    token: &Address,
    entry_fee: i128,
    max_players: u32,
) {
    let instance = env.storage().instance();
    instance.set(&DataKey::Admin, admin);
    instance.set(&DataKey::Oracle, oracle);
    instance.set(&DataKey::Token, token);
    instance.set(&DataKey::EntryFee, &entry_fee);
    instance.set(&DataKey::MaxPlayers, &max_players);
}

pub fn admin(env: &Env) -> Result<Address, Error> {
    read_instance(env, &DataKey::Admin)
}

pub fn oracle(env: &Env) -> Result<Address, Error> {
    read_instance(env, &DataKey::Oracle)
}

pub fn token(env: &Env) -> Result<Address, Error> {
    read_instance(env, &DataKey::Token)
}

pub fn entry_fee(env: &Env) -> Result<i128, Error> {
    read_instance(env, &DataKey::EntryFee)
}

pub fn max_players(env: &Env) -> Result<u32, Error> {
    read_instance(env, &DataKey::MaxPlayers)
}

fn read_instance<T>(env: &Env, key: &DataKey) -> Result<T, Error>
where
    T: soroban_sdk::TryFromVal<Env, Val>,
{
    env.storage().instance().get(key).ok_or(Error::NotInitialized)
}

// ---------------------------------------------------------------------------
// Rounds
// ---------------------------------------------------------------------------

/// Id of the active or most recent round; 0 before `init`.
pub fn current_round_id(env: &Env) -> u64 {
    env.storage()
        .instance()
        .get(&DataKey::CurrentRoundId)
        .unwrap_or(0)
}

/// Allocate the next round id, persist an empty open round under it and
/// make it current.
pub fn create_round(env: &Env) -> Result<u64, Error> {
    let round_id = current_round_id(env)
        .checked_add(1)
        .ok_or(Error::Overflow)?;

    save_round(env, &Round::open(env, round_id));
    env.storage()
        .instance()
        .set(&DataKey::CurrentRoundId, &round_id);
    extend_instance_ttl(env);

    Ok(round_id)
}

pub fn load_round(env: &Env, round_id: u64) -> Result<Round, Error> {
    if round_id == 0 || round_id > current_round_id(env) {
        return Err(Error::NotFound);
    }

    env.storage()
        .persistent()
        .get(&DataKey::Round(round_id))
        .ok_or(Error::NotFound)
}

pub fn current_round(env: &Env) -> Result<Round, Error> {
    load_round(env, current_round_id(env))
}

pub fn save_round(env: &Env, round: &Round) {
    set_persistent(env, DataKey::Round(round.id), round);
}

// ---------------------------------------------------------------------------
// Request correlation
// ---------------------------------------------------------------------------

pub fn pending_round(env: &Env, request_id: u64) -> Option<u64> {
    env.storage()
        .persistent()
        .get(&DataKey::RequestRound(request_id))
}

pub fn consumed_round(env: &Env, request_id: u64) -> Option<u64> {
    env.storage()
        .persistent()
        .get(&DataKey::ConsumedRequest(request_id))
}

pub fn is_known_request(env: &Env, request_id: u64) -> bool {
    pending_round(env, request_id).is_some() || consumed_round(env, request_id).is_some()
}

pub fn set_pending_request(env: &Env, request_id: u64, round_id: u64) {
    set_persistent(env, DataKey::RequestRound(request_id), &round_id);
}

/// Move `request_id` from the pending map to the consumed set.
pub fn consume_request(env: &Env, request_id: u64, round_id: u64) {
    env.storage()
        .persistent()
        .remove(&DataKey::RequestRound(request_id));
    set_persistent(env, DataKey::ConsumedRequest(request_id), &round_id);
}

// ---------------------------------------------------------------------------
// Unpaid prizes
// ---------------------------------------------------------------------------

pub fn unpaid(env: &Env, winner: &Address) -> i128 {
    env.storage()
        .persistent()
        .get(&DataKey::Unpaid(winner.clone()))
        .unwrap_or(0)
}

pub fn credit_unpaid(env: &Env, winner: &Address, amount: i128) -> Result<i128, Error> {
    let owed = unpaid(env, winner)
        .checked_add(amount)
        .ok_or(Error::Overflow)?;
    set_persistent(env, DataKey::Unpaid(winner.clone()), &owed);
    Ok(owed)
}

pub fn clear_unpaid(env: &Env, winner: &Address) {
    env.storage()
        .persistent()
        .remove(&DataKey::Unpaid(winner.clone()));
}

// ---------------------------------------------------------------------------
// TTL
// ---------------------------------------------------------------------------

/// Config and the current-round pointer live in instance storage and must
/// outlive every round record that refers to them.
pub fn extend_instance_ttl(env: &Env) {
    env.storage()
        .instance()
        .extend_ttl(PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);
}

fn set_persistent<T>(env: &Env, key: DataKey, value: &T)
where
    T: IntoVal<Env, Val>,
{
    env.storage().persistent().set(&key, value);
    env.storage()
        .persistent()
        .extend_ttl(&key, PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);
}
