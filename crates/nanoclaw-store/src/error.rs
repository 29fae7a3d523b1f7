// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

/// Typed store errors (§7 taxonomy: Transient external / Integrity).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database is busy, retry")]
    Busy,
    #[error("row not found")]
    NotFound,
    #[error("integrity violation: {0}")]
    Integrity(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("pool error: {0}")]
    Pool(String),
}

impl StoreError {
    pub fn is_contention(&self) -> bool {
        matches!(self, StoreError::Busy)
            || matches!(
                self,
                StoreError::Sqlite(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error {
                        code: rusqlite::ffi::ErrorCode::DatabaseBusy
                            | rusqlite::ffi::ErrorCode::DatabaseLocked,
                        ..
                    },
                    _,
                ))
            )
    }
}
