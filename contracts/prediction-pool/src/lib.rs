//! Roundpool Prediction Pool Contract
//!
//! A fixed-capacity pooled lottery run in sequential rounds. Players pay
//! exactly `entry_fee` to join the open round; the entry that fills the
//! round closes it and asks the randomness oracle for a value. When the
//! oracle calls back, the winner is `players[random_value mod player_count]`
//! and the whole pool is paid to them.
//!
//! ## Round Lifecycle
//! 1. `init` creates round 1, open for entries.
//! 2. `enter` admits players in submission order. The entry that reaches
//!    `max_players` closes the round and issues the oracle request in the
//!    same invocation.
//! 3. The oracle calls `on_randomness`. The request is consumed, the winner
//!    recorded, and the round marked fulfilled before the prize transfer.
//! 4. The admin calls `open_new_round` once the current round is fulfilled.
//!
//! ## Custody
//! Entry fees are held by this contract until the round's payout. If the
//! prize transfer to the winner fails, the round stays fulfilled, the prize
//! is credited to the winner's unpaid balance and `PayoutFailed` is
//! published. The winner recovers it with `claim_unpaid`.
//!
//! If an oracle request is rejected at closing time the round stays closed
//! with no pending request until the admin calls `rerequest_randomness`.
//! There is no timeout for an oracle that never answers.
//!
//! ## Storage Strategy
//! - `instance()`: Admin, Oracle, Token, EntryFee, MaxPlayers, CurrentRoundId.
//! - `persistent()`: Round records, pending/consumed request mappings and
//!   unpaid balances, TTL bumped on every write.
#![no_std]
#![allow(unexpected_cfgs)]

mod oracle;
mod storage;

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, token::TokenClient,
    Address, Env, Vec, U256,
};

pub use oracle::{winner_index, RandomnessOracle, RandomnessOracleClient};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Persistent storage TTL in ledgers (~30 days at 5 s/ledger).
/// Bumped on every write so a closed round outlives a slow oracle.
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
    /// Caller is not the configured admin or oracle.
    Unauthorized       = 3,
    /// `entry_fee <= 0` or `max_players == 0`.
    InvalidConfig      = 4,
    /// The current round is not accepting entries.
    RoundClosed        = 5,
    /// Attached value differs from `entry_fee`.
    InvalidEntryFee    = 6,
    /// The current round already holds `max_players` entries.
    RoundFull          = 7,
    /// Round id outside `1..=current_round_id`.
    NotFound           = 8,
    /// Callback for a request id this contract never issued.
    UnknownRequest     = 9,
    /// Callback for a request whose round was already paid.
    AlreadyFulfilled   = 10,
    TransferFailed     = 11,
    /// The current round is still open or awaiting its callback.
    RoundNotSettled    = 12,
    /// The round is not closed, unfulfilled and without a pending request.
    InvalidRoundState  = 13,
    /// The oracle rejected a randomness request.
    RequestFailed      = 14,
    NothingOwed        = 15,
    Overflow           = 16,
}

// ---------------------------------------------------------------------------
// Storage Types
// ---------------------------------------------------------------------------

/// Whether the prize transfer of a fulfilled round reached the winner.
#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PayoutStatus {
    /// Round not fulfilled yet.
    Pending = 0,
    Paid    = 1,
    /// Transfer failed; the prize sits in the winner's unpaid balance.
    Owed    = 2,
}

/// One round of the lottery. Mutated only while open or awaiting its
/// callback; frozen once `fulfilled` is set.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Round {
    pub id: u64,
    pub is_open: bool,
    pub fulfilled: bool,
    /// Entries in admission order. The same address may hold several slots.
    pub players: Vec<Address>,
    /// Always `players.len() * entry_fee`.
    pub pool: i128,
    pub winner: Option<Address>,
    pub prize: Option<i128>,
    /// Set while the oracle request for this round is outstanding.
    pub pending_request_id: Option<u64>,
    pub payout: PayoutStatus,
}

impl Round {
    fn open(env: &Env, id: u64) -> Self {
        Round {
            id,
            is_open: true,
            fulfilled: false,
            players: Vec::new(env),
            pool: 0,
            winner: None,
            prize: None,
            pending_request_id: None,
            payout: PayoutStatus::Pending,
        }
    }

    fn awaits_payout(&self) -> bool {
        !self.is_open && !self.fulfilled && self.pending_request_id.is_none()
    }
}

/// Summary returned by `get_round_info`.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RoundInfo {
    pub is_open: bool,
    pub fulfilled: bool,
    pub player_count: u32,
    pub pool: i128,
    pub winner: Option<Address>,
    pub prize: Option<i128>,
}

/// Summary returned by `get_current_round_info`.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CurrentRoundInfo {
    pub round_id: u64,
    pub is_open: bool,
    pub player_count: u32,
    pub pool: i128,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[contractevent]
pub struct Initialized {
    #[topic]
    pub admin: Address,
    pub oracle: Address,
    pub token: Address,
    pub entry_fee: i128,
    pub max_players: u32,
}

#[contractevent]
pub struct RoundOpened {
    #[topic]
    pub round_id: u64,
}

#[contractevent]
pub struct EntryAdmitted {
    #[topic]
    pub round_id: u64,
    #[topic]
    pub player: Address,
    pub player_count: u32,
    pub pool: i128,
}

#[contractevent]
pub struct RoundClosed {
    #[topic]
    pub round_id: u64,
    pub player_count: u32,
    pub pool: i128,
}

#[contractevent]
pub struct RandomnessRequested {
    #[topic]
    pub round_id: u64,
    #[topic]
    pub request_id: u64,
}

/// The round is closed without a pending request; needs `rerequest_randomness`.
#[contractevent]
pub struct RandomnessRequestFailed {
    #[topic]
    pub round_id: u64,
}

#[contractevent]
pub struct WinnerSelected {
    #[topic]
    pub round_id: u64,
    #[topic]
    pub request_id: u64,
    pub winner: Address,
    pub index: u32,
}

#[contractevent]
pub struct PrizePaid {
    #[topic]
    pub round_id: u64,
    #[topic]
    pub winner: Address,
    pub amount: i128,
}

#[contractevent]
pub struct PayoutFailed {
    #[topic]
    pub round_id: u64,
    #[topic]
    pub winner: Address,
    pub amount: i128,
    pub total_owed: i128,
}

#[contractevent]
pub struct UnpaidClaimed {
    #[topic]
    pub winner: Address,
    pub amount: i128,
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[contract]
pub struct PredictionPool;

#[contractimpl]
impl PredictionPool {
    // -----------------------------------------------------------------------
    // init
    // -----------------------------------------------------------------------

    /// Initialize the pool and open the genesis round. May only be called once.
    ///
    /// `oracle` is both the contract that receives `request_randomness` and
    /// the only address allowed to deliver `on_randomness`. `token` is the
    /// SEP-41 asset entry fees and prizes are paid in.
    pub fn init(
        env: Env,
        admin: Address,
        oracle: Address,
        token: Address,
        entry_fee: i128,
        max_players: u32,
    ) -> Result<(), Error> {
        if storage::is_initialized(&env) {
            return Err(Error::AlreadyInitialized);
        }

        admin.require_auth();

        if entry_fee <= 0 || max_players == 0 {
            return Err(Error::InvalidConfig);
        }

        storage::write_config(&env, &admin, &oracle, &token, entry_fee, max_players);
        let round_id = storage::create_round(&env)?;

        Initialized { admin, oracle, token, entry_fee, max_players }.publish(&env);
        RoundOpened { round_id }.publish(&env);

        Ok(())
    }

    // -----------------------------------------------------------------------
    // enter
    // -----------------------------------------------------------------------

    /// Join the current round by paying exactly `entry_fee`.
    ///
    /// The entry that brings the round to `max_players` also closes it and
    /// issues the oracle request. A rejected oracle request does not undo the
    /// entry; the round is left closed without a pending request.
    pub fn enter(env: Env, player: Address, amount: i128) -> Result<(), Error> {
        require_initialized(&env)?;
        player.require_auth();
        storage::extend_instance_ttl(&env);

        let entry_fee = storage::entry_fee(&env)?;
        let max_players = storage::max_players(&env)?;
        let mut round = storage::current_round(&env)?;

        if !round.is_open {
            return Err(Error::RoundClosed);
        }
        if amount != entry_fee {
            return Err(Error::InvalidEntryFee);
        }
        if round.players.len() >= max_players {
            return Err(Error::RoundFull);
        }

        let token = storage::token(&env)?;
        TokenClient::new(&env, &token).transfer(&player, env.current_contract_address(), &amount);

        round.players.push_back(player.clone());
        round.pool = round.pool.checked_add(amount).ok_or(Error::Overflow)?;
        let player_count = round.players.len();

        EntryAdmitted {
            round_id: round.id,
            player,
            player_count,
            pool: round.pool,
        }
        .publish(&env);

        if player_count == max_players {
            round.is_open = false;
            storage::save_round(&env, &round);

            RoundClosed {
                round_id: round.id,
                player_count,
                pool: round.pool,
            }
            .publish(&env);

            issue_randomness_request(&env, &mut round)?;
        }

        storage::save_round(&env, &round);

        Ok(())
    }

    // -----------------------------------------------------------------------
    // on_randomness
    // -----------------------------------------------------------------------

    /// Oracle callback. Oracle only.
    ///
    /// Consumes the pending request, picks `players[random_value mod
    /// player_count]` and pays out the pool. Redelivery of a consumed
    /// request fails with `AlreadyFulfilled`; an id never issued fails with
    /// `UnknownRequest`. Neither touches any round.
    pub fn on_randomness(
        env: Env,
        oracle: Address,
        request_id: u64,
        random_value: U256,
    ) -> Result<(), Error> {
        require_initialized(&env)?;
        require_oracle(&env, &oracle)?;

        let round_id = match storage::pending_round(&env, request_id) {
            Some(round_id) => round_id,
            None if storage::consumed_round(&env, request_id).is_some() => {
                return Err(Error::AlreadyFulfilled)
            }
            None => return Err(Error::UnknownRequest),
        };

        let mut round = storage::load_round(&env, round_id)?;
        if round.fulfilled {
            return Err(Error::AlreadyFulfilled);
        }

        let index = winner_index(&env, &random_value, round.players.len())
            .ok_or(Error::InvalidRoundState)?;
        let winner = round.players.get(index).ok_or(Error::InvalidRoundState)?;

        // Consume before paying so the same request can never reach payout twice.
        storage::consume_request(&env, request_id, round_id);
        round.pending_request_id = None;

        WinnerSelected {
            round_id,
            request_id,
            winner: winner.clone(),
            index,
        }
        .publish(&env);

        let amount = round.pool;
        execute_payout(&env, round, winner, amount)?;

        Ok(())
    }

    // -----------------------------------------------------------------------
    // open_new_round
    // -----------------------------------------------------------------------

    /// Open the next round. Admin only.
    ///
    /// Rejected with `RoundNotSettled` unless the current round is fulfilled.
    pub fn open_new_round(env: Env, admin: Address) -> Result<u64, Error> {
        require_initialized(&env)?;
        require_admin(&env, &admin)?;

        let current = storage::current_round(&env)?;
        if current.is_open || !current.fulfilled {
            return Err(Error::RoundNotSettled);
        }

        let round_id = storage::create_round(&env)?;
        RoundOpened { round_id }.publish(&env);

        Ok(round_id)
    }

    // -----------------------------------------------------------------------
    // rerequest_randomness
    // -----------------------------------------------------------------------

    /// Issue the oracle request again for a closed round whose request was
    /// rejected at closing time. Admin only.
    pub fn rerequest_randomness(env: Env, admin: Address, round_id: u64) -> Result<u64, Error> {
        require_initialized(&env)?;
        require_admin(&env, &admin)?;

        let mut round = storage::load_round(&env, round_id)?;
        if !round.awaits_payout() {
            return Err(Error::InvalidRoundState);
        }

        let request_id = issue_randomness_request(&env, &mut round)?.ok_or(Error::RequestFailed)?;
        storage::save_round(&env, &round);

        Ok(request_id)
    }

    // -----------------------------------------------------------------------
    // claim_unpaid
    // -----------------------------------------------------------------------

    /// Withdraw prizes whose payout transfer failed.
    ///
    /// The balance is cleared before the transfer; a failing transfer
    /// returns `TransferFailed` and the whole claim is rolled back.
    pub fn claim_unpaid(env: Env, winner: Address) -> Result<i128, Error> {
        require_initialized(&env)?;
        winner.require_auth();

        let amount = storage::unpaid(&env, &winner);
        if amount <= 0 {
            return Err(Error::NothingOwed);
        }

        storage::clear_unpaid(&env, &winner);

        let token = storage::token(&env)?;
        let transfer = TokenClient::new(&env, &token).try_transfer(
            &env.current_contract_address(),
            &winner,
            &amount,
        );
        if !matches!(transfer, Ok(Ok(()))) {
            return Err(Error::TransferFailed);
        }

        UnpaidClaimed { winner, amount }.publish(&env);

        Ok(amount)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn current_round_id(env: Env) -> u64 {
        storage::current_round_id(&env)
    }

    pub fn get_current_round_info(env: Env) -> Result<CurrentRoundInfo, Error> {
        require_initialized(&env)?;
        let round = storage::current_round(&env)?;
        Ok(CurrentRoundInfo {
            round_id: round.id,
            is_open: round.is_open,
            player_count: round.players.len(),
            pool: round.pool,
        })
    }

    /// `(is_open, fulfilled, player_count, pool, winner, prize)` for any
    /// created round.
    pub fn get_round_info(env: Env, round_id: u64) -> Result<RoundInfo, Error> {
        let round = storage::load_round(&env, round_id)?;
        Ok(RoundInfo {
            is_open: round.is_open,
            fulfilled: round.fulfilled,
            player_count: round.players.len(),
            pool: round.pool,
            winner: round.winner,
            prize: round.prize,
        })
    }

    pub fn get_round(env: Env, round_id: u64) -> Result<Round, Error> {
        storage::load_round(&env, round_id)
    }

    pub fn get_players(env: Env, round_id: u64) -> Result<Vec<Address>, Error> {
        Ok(storage::load_round(&env, round_id)?.players)
    }

    pub fn is_open(env: Env) -> Result<bool, Error> {
        Ok(storage::current_round(&env)?.is_open)
    }

    pub fn player_count(env: Env) -> Result<u32, Error> {
        Ok(storage::current_round(&env)?.players.len())
    }

    pub fn pool(env: Env) -> Result<i128, Error> {
        Ok(storage::current_round(&env)?.pool)
    }

    pub fn entry_fee(env: Env) -> Result<i128, Error> {
        storage::entry_fee(&env)
    }

    pub fn max_players(env: Env) -> Result<u32, Error> {
        storage::max_players(&env)
    }

    pub fn admin(env: Env) -> Result<Address, Error> {
        storage::admin(&env)
    }

    pub fn oracle(env: Env) -> Result<Address, Error> {
        storage::oracle(&env)
    }

    pub fn token(env: Env) -> Result<Address, Error> {
        storage::token(&env)
    }

    /// Round awaiting the callback for `request_id`.
    pub fn round_for_request(env: Env, request_id: u64) -> Result<u64, Error> {
        storage::pending_round(&env, request_id).ok_or(Error::UnknownRequest)
    }

    pub fn unpaid_balance(env: Env, winner: Address) -> i128 {
        storage::unpaid(&env, &winner)
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn require_initialized(env: &Env) -> Result<(), Error> {
    if !storage::is_initialized(env) {
        return Err(Error::NotInitialized);
    }
    Ok(())
}

fn require_admin(env: &Env, caller: &Address) -> Result<(), Error> {
    let admin = storage::admin(env)?;
    caller.require_auth();
    if caller != &admin {
        return Err(Error::Unauthorized);
    }
    Ok(())
}

fn require_oracle(env: &Env, caller: &Address) -> Result<(), Error> {
    let oracle = storage::oracle(env)?;
    caller.require_auth();
    if caller != &oracle {
        return Err(Error::Unauthorized);
    }
    Ok(())
}

/// Ask the oracle for randomness scoped to `round` and record the pending
/// request on success.
///
/// Only called on a round that has just closed (or for an admin re-request).
/// Oracle failure is caught: it publishes `RandomnessRequestFailed` and
/// returns `None`, leaving the round closed with no pending request. An id
/// already known to this contract is treated the same way.
fn issue_randomness_request(env: &Env, round: &mut Round) -> Result<Option<u64>, Error> {
    let oracle = storage::oracle(env)?;
    let outcome = RandomnessOracleClient::new(env, &oracle)
        .try_request_randomness(&env.current_contract_address(), &round.id);

    let request_id = match outcome {
        Ok(Ok(request_id)) if !storage::is_known_request(env, request_id) => request_id,
        _ => {
            RandomnessRequestFailed { round_id: round.id }.publish(env);
            return Ok(None);
        }
    };

    storage::set_pending_request(env, request_id, round.id);
    round.pending_request_id = Some(request_id);

    RandomnessRequested { round_id: round.id, request_id }.publish(env);

    Ok(Some(request_id))
}

/// Finalize `round` for `winner` and transfer `amount` to them.
///
/// The round is written as fulfilled before the token call. A failed
/// transfer leaves it fulfilled with `PayoutStatus::Owed` and credits the
/// winner's unpaid balance.
fn execute_payout(
    env: &Env,
    mut round: Round,
    winner: Address,
    amount: i128,
) -> Result<PayoutStatus, Error> {
    if !round.awaits_payout() {
        return Err(Error::InvalidRoundState);
    }

    round.fulfilled = true;
    round.winner = Some(winner.clone());
    round.prize = Some(amount);
    storage::save_round(env, &round);

    let token = storage::token(env)?;
    let transfer = TokenClient::new(env, &token).try_transfer(
        &env.current_contract_address(),
        &winner,
        &amount,
    );

    let status = if matches!(transfer, Ok(Ok(()))) {
        PrizePaid { round_id: round.id, winner, amount }.publish(env);
        PayoutStatus::Paid
    } else {
        let total_owed = storage::credit_unpaid(env, &winner, amount)?;
        PayoutFailed {
            round_id: round.id,
            winner,
            amount,
            total_owed,
        }
        .publish(env);
        PayoutStatus::Owed
    };

    round.payout = status;
    storage::save_round(env, &round);

    Ok(status)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
