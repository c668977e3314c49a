//! Outbound seam to the randomness oracle and the winner-index mapping.

use soroban_sdk::{contractclient, Address, Env, U256};

/// The request half of the oracle interface. The oracle answers later by
/// invoking `on_randomness` on the consumer.
#[contractclient(name = "RandomnessOracleClient")]
pub trait RandomnessOracle {
    /// Opens a request scoped to `round_id` and returns its correlation id.
    fn request_randomness(env: Env, consumer: Address, round_id: u64) -> u64;
}

/// Map `random_value` onto a slot in a round of `player_count` entries:
/// `random_value mod player_count`.
///
/// Returns `None` for an empty round.
pub fn winner_index(env: &Env, random_value: &U256, player_count: u32) -> Option<u32> {
    if player_count == 0 {
        return None;
    }

    let modulus = U256::from_u32(env, player_count);
    let index = random_value.rem_euclid(&modulus).to_u128()?;
    u32::try_from(index).ok()
}
