use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tagpay_shared::{EraseMode, SessionState, TagUid};
use uuid::Uuid;

use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/status", get(device_status))
}

/// What the last tag operation left behind.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceStatus {
    pub state: SessionState,
    pub last_uid: Option<TagUid>,
    pub last_operation_id: Option<Uuid>,
    pub last_operation_at: Option<DateTime<Utc>>,
}

impl DeviceStatus {
    pub fn record(&mut self, op_id: Uuid, state: SessionState, uid: Option<TagUid>) {
        self.state = state;
        if uid.is_some() {
            self.last_uid = uid;
        }
        self.last_operation_id = Some(op_id);
        self.last_operation_at = Some(Utc::now());
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    status: DeviceStatus,
    tag_image: String,
    end_page: u8,
    erase_mode: EraseMode,
}

/// GET /api/device/status - State of the reader after the last operation
async fn device_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let status = state.device_status.read().await.clone();
    Json(StatusResponse {
        status,
        tag_image: state.config.tag_image.display().to_string(),
        end_page: state.config.session.end_page,
        erase_mode: state.config.session.erase_mode,
    })
}
