use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tagpay_shared::{BANK_OPTIONS, PaymentRecord, SessionError, TagUid, WriteReport, bank_code};
use tracing::Instrument;
use uuid::Uuid;

use super::ApiError;
use crate::{AppState, Session};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(read_tag).post(write_tag))
        .route("/amount", post(update_amount))
}

#[derive(Debug, Serialize)]
pub struct ReadResponse {
    op_id: Uuid,
    uid: Option<TagUid>,
    #[serde(flatten)]
    record: PaymentRecord,
}

#[derive(Debug, Serialize)]
pub struct WriteResponse {
    op_id: Uuid,
    url: String,
    #[serde(flatten)]
    report: WriteReport,
}

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: String,
}

#[derive(Debug, Serialize)]
pub struct AmountResponse {
    op_id: Uuid,
    record: PaymentRecord,
    report: WriteReport,
}

/// Runs `op` against the tag on a blocking thread and records the outcome in
/// the device status.
async fn run_session<T, F>(state: &Arc<AppState>, op_id: Uuid, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&mut Session) -> Result<T, SessionError> + Send + 'static,
{
    let session = state.session.clone();
    let span = tracing::info_span!("tag_op", %op_id);
    let worker_span = span.clone();

    let (result, session_state, uid) = tokio::task::spawn_blocking(move || {
        let _enter = worker_span.enter();
        let mut session = session.lock().map_err(|_| ApiError::Poisoned)?;
        let result = op(&mut *session);
        Ok::<_, ApiError>((result, session.state(), session.last_uid().cloned()))
    })
    .instrument(span)
    .await??;

    state
        .device_status
        .write()
        .await
        .record(op_id, session_state, uid);
    Ok(result?)
}

/// Accepts either a keypad key ("1") or a bank code ("KB").
fn resolve_bank(bank: &str) -> Result<&'static str, ApiError> {
    bank_code(bank)
        .or_else(|| {
            BANK_OPTIONS
                .iter()
                .find(|(_, code)| *code == bank)
                .map(|(_, code)| *code)
        })
        .ok_or_else(|| ApiError::UnknownBank(bank.to_string()))
}

/// GET /api/tag - Read the payment record on the tag in the field
async fn read_tag(State(state): State<Arc<AppState>>) -> Result<Json<ReadResponse>, ApiError> {
    let op_id = Uuid::new_v4();
    let (record, uid) = run_session(&state, op_id, |session| {
        let record = session.read_record()?;
        Ok((record, session.last_uid().cloned()))
    })
    .await?;

    Ok(Json(ReadResponse { op_id, uid, record }))
}

/// POST /api/tag - Write a new payment record
async fn write_tag(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PaymentRecord>,
) -> Result<Json<WriteResponse>, ApiError> {
    let op_id = Uuid::new_v4();
    let bank = resolve_bank(&request.bank)?;
    let record = PaymentRecord::new(bank, request.account, request.amount);
    let url = record.to_url();
    tracing::debug!(%op_id, "Writing {}", url);

    let report = run_session(&state, op_id, move |session| session.write_record(&record)).await?;

    Ok(Json(WriteResponse { op_id, url, report }))
}

/// POST /api/tag/amount - Replace the amount on the tag, keeping bank and account
async fn update_amount(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AmountRequest>,
) -> Result<Json<AmountResponse>, ApiError> {
    let op_id = Uuid::new_v4();
    let (record, report) = run_session(&state, op_id, move |session| {
        session.update_amount(&request.amount)
    })
    .await?;

    Ok(Json(AmountResponse {
        op_id,
        record,
        report,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banks_resolve_by_key_or_code() {
        assert_eq!(resolve_bank("1").unwrap(), "KB");
        assert_eq!(resolve_bank("KAKAO").unwrap(), "KAKAO");
        assert_eq!(resolve_bank("15").unwrap(), "K BANK");
        assert!(matches!(
            resolve_bank("0"),
            Err(ApiError::UnknownBank(bank)) if bank == "0"
        ));
    }
}
