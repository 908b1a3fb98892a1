// Difficulty retargeting

use crate::core::{
    BLOCK_GENERATION_INTERVAL_SECONDS, Block, DIFFICULTY_ADJUSTMENT_INTERVAL, GENESIS_DIFFICULTY,
};

/// Difficulty required for the block that will extend `chain`.
///
/// Every `DIFFICULTY_ADJUSTMENT_INTERVAL` blocks (never at genesis) the
/// difficulty is retargeted; in between it carries over from the tip.
pub fn next_difficulty(chain: &[Block]) -> u32 {
    let Some(latest) = chain.last() else {
        return GENESIS_DIFFICULTY;
    };

    if latest.index != 0 && latest.index % DIFFICULTY_ADJUSTMENT_INTERVAL == 0 {
        adjusted_difficulty(chain, latest)
    } else {
        latest.difficulty
    }
}

/// Compare the time the last interval took with the expected time and move
/// the interval-start difficulty by one step when it is off by more than 2x.
fn adjusted_difficulty(chain: &[Block], latest: &Block) -> u32 {
    let interval = DIFFICULTY_ADJUSTMENT_INTERVAL as usize;
    if chain.len() < interval {
        return latest.difficulty;
    }

    let interval_start = &chain[chain.len() - interval];
    let expected = BLOCK_GENERATION_INTERVAL_SECONDS * DIFFICULTY_ADJUSTMENT_INTERVAL as i64;
    let taken = latest.timestamp - interval_start.timestamp;

    let adjusted = if taken < expected / 2 {
        interval_start.difficulty.saturating_add(1)
    } else if taken > expected * 2 {
        interval_start.difficulty.saturating_sub(1)
    } else {
        interval_start.difficulty
    };

    if adjusted != interval_start.difficulty {
        log::info!(
            "Difficulty adjustment at block {}: {} -> {} (took {}s, expected {}s)",
            latest.index, interval_start.difficulty, adjusted, taken, expected
        );
    }

    adjusted
}
