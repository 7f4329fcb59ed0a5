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

//! Error handling for everything that crosses an API boundary.
//!
//! Inside the search (`minimax`, candidate generation, TT probes) failures
//! are local and silent: an illegal move is skipped, a timeout yields the
//! best completed depth. Nothing in that hot path returns a `Result`. This
//! module is only for the boundary-crossing cases: constructing a `Board`
//! with an invalid size, loading a corrupt persistence blob, a rules
//! adapter that refuses a call outright.

use std::fmt::{self, Display, Formatter};

/// Alias used throughout the crate for fallible boundary operations.
pub type Res<T> = anyhow::Result<T>;

/// Conceptual error kinds from the engine's error-handling design.
///
/// `BoundsViolation`, `IllegalMoveFromRules`, `TimeExceeded`/`Cancelled`, and
/// `TTCorruption` never reach this type: they are handled locally (sentinel
/// scores, stats counters, or a table clear) and never become a `Result`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum EngineError {
    /// A `Config` or `Board` construction violated its invariants.
    InvalidSettings(String),
    /// Reading or writing a persisted TT blob failed; the TT keeps running in-memory.
    PersistenceIo(String),
    /// The rules adapter reported a hard failure rather than an illegal-move answer.
    RulesRejected(String),
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidSettings(msg) => write!(f, "invalid settings: {msg}"),
            EngineError::PersistenceIo(msg) => write!(f, "persistence I/O failure: {msg}"),
            EngineError::RulesRejected(msg) => write!(f, "rules adapter rejected the call: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
