//! Currency endpoints
//!
//! - `GET /currency/exchangeRate?from&to&date`
//! - `GET /currency/convert?from&to&amount&date`
//!
//! `date` is optional (`%Y-%m-%d`, defaults to today) and must fall within the
//! last 90 days.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::db::models::{parse_date, start_of_day};
use crate::error::ApiError;
use crate::server::state::AppState;
use crate::services::{Conversion, ExchangeRate};

/// How far back a requested date may reach
pub const MAX_LOOKBACK_DAYS: i64 = 90;

#[derive(Debug, Deserialize)]
pub struct ExchangeRateQuery {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub date: String,
}

#[derive(Debug, Deserialize)]
pub struct ConvertQuery {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub date: String,
}

/// GET /currency/exchangeRate
pub async fn exchange_rate(
    State(state): State<AppState>,
    Query(query): Query<ExchangeRateQuery>,
) -> Result<Json<ExchangeRate>, ApiError> {
    validate_pair(&state, &query.from, &query.to)?;
    validate_date(&query.date, Utc::now())?;

    let rate = state
        .currency
        .get_exchange_rate(&query.from, &query.to, &query.date)
        .await?;

    Ok(Json(rate))
}

/// GET /currency/convert
pub async fn convert(
    State(state): State<AppState>,
    Query(query): Query<ConvertQuery>,
) -> Result<Json<Conversion>, ApiError> {
    validate_pair(&state, &query.from, &query.to)?;
    let amount = validate_amount(&query.amount)?;
    validate_date(&query.date, Utc::now())?;

    let conversion = state
        .currency
        .get_converted_currency(&query.from, &query.to, &query.date, amount)
        .await?;

    Ok(Json(conversion))
}

fn validate_pair(state: &AppState, from: &str, to: &str) -> Result<(), ApiError> {
    for code in [from, to] {
        if !state.settings.is_supported_currency(code) {
            return Err(ApiError::InvalidRequest(format!(
                "Unsupported currency '{}'. Supported: {}",
                code,
                state.settings.supported_currencies.join(", ")
            )));
        }
    }
    Ok(())
}

fn validate_amount(raw: &str) -> Result<f64, ApiError> {
    match raw.trim().parse::<f64>() {
        Ok(amount) if amount.is_finite() && amount > 0.0 => Ok(amount),
        _ => Err(ApiError::InvalidRequest(
            "amount must be a number greater than 0".to_string(),
        )),
    }
}

fn validate_date(raw: &str, now: DateTime<Utc>) -> Result<(), ApiError> {
    if raw.is_empty() {
        return Ok(());
    }

    let within_window = parse_date(raw)
        .map(start_of_day)
        .map(|at| at > now - Duration::days(MAX_LOOKBACK_DAYS) && at < now)
        .unwrap_or(false);

    if within_window {
        Ok(())
    } else {
        Err(ApiError::InvalidRequest(format!(
            "date must be YYYY-MM-DD within the last {} days",
            MAX_LOOKBACK_DAYS
        )))
    }
}
