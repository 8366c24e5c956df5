// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid pool data: {0}")]
    PoolData(String),

    #[error("Invalid scoring parameters: {0}")]
    ScoringParams(String),

    #[error("Invalid allocation constraints: {0}")]
    AllocationConstraints(String),

    #[error("Allocation constraints cannot be satisfied: {0}")]
    AllocationImpossible(String),

    #[error("Simulation failed: {0}")]
    Simulation(String),

    #[error("Insufficient funds. Required: {required}, Available: {available}")]
    InsufficientFunds { required: String, available: String },

    #[error("RPC failure: {0}")]
    Rpc(String),

    #[error("Database failure: {0}")]
    Database(String),

    #[error("Math error: {0}")]
    Math(String),

    #[error("Missing data: {0}")]
    DataMissing(String),

    #[error("Insufficient data points to calculate volatility")]
    InsufficientData,

    #[error("External API error: {provider} responded with {status}")]
    ApiCall { provider: String, status: u16 },

    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Rpc(err.to_string())
    }
}
