use std::sync::Arc;

use axum::{Json, Router, routing::get};
use serde::Serialize;
use tagpay_shared::BANK_OPTIONS;

use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_banks))
}

#[derive(Debug, Serialize)]
pub struct BankOption {
    key: &'static str,
    code: &'static str,
}

/// GET /api/banks - Bank keys accepted in place of a bank code
async fn list_banks() -> Json<Vec<BankOption>> {
    Json(
        BANK_OPTIONS
            .iter()
            .map(|&(key, code)| BankOption { key, code })
            .collect(),
    )
}
