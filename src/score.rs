/*
 *  gomoku-core, a Gomoku/Ninuki-style search engine core.
 *  Copyright (C) 2024 ToTheAnd
 *
 *  gomoku-core is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  gomoku-core is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with gomoku-core. If not, see <https://www.gnu.org/licenses/>.
 */

//! Sentinel scores and the f64-to-i32 conversion the TT needs, shared by
//! the evaluator and the search driver. Kept in one place so the two
//! sentinels can never drift out of the "never collide with a real
//! evaluation" relationship the scoring design requires.

/// A won position, signed for whichever side is winning. Kept well under
/// `i32::MAX` (about 2.1e9) so the TT's rounding never saturates into it.
pub const WIN_SCORE: f64 = 1.0e9;

/// "No legal score here" sentinel for illegal moves in a `score_board`
/// result array. Never produced by real evaluation: every heuristic
/// weight is kept well below this magnitude by construction.
pub const ILLEGAL_SCORE: f64 = -1.0e9;

/// Rounds `value` to `i32` with round-half-to-even, saturating at the
/// platform int bounds instead of panicking or wrapping.
#[must_use]
pub fn round_to_i32(value: f64) -> i32 {
    if value.is_nan() {
        return 0;
    }
    let rounded = round_half_to_even(value);
    if rounded >= i32::MAX as f64 {
        i32::MAX
    } else if rounded <= i32::MIN as f64 {
        i32::MIN
    } else {
        rounded as i32
    }
}

fn round_half_to_even(value: f64) -> f64 {
    let floor = value.floor();
    let diff = value - floor;
    if diff < 0.5 {
        floor
    } else if diff > 0.5 {
        floor + 1.0
    } else if (floor as i64) % 2 == 0 {
        floor
    } else {
        floor + 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_half_to_even_ties() {
        assert_eq!(round_to_i32(2.5), 2);
        assert_eq!(round_to_i32(3.5), 4);
        assert_eq!(round_to_i32(-2.5), -2);
    }

    #[test]
    fn saturates_at_bounds() {
        assert_eq!(round_to_i32(1.0e15), i32::MAX);
        assert_eq!(round_to_i32(-1.0e15), i32::MIN);
    }

    #[test]
    fn sentinels_never_collide_with_i32_rounding_of_realistic_weights() {
        assert!(WIN_SCORE > 0.0);
        assert!(ILLEGAL_SCORE < -WIN_SCORE / 2.0);
    }
}
