use axum::{extract::State, http::HeaderMap, Json};

use crate::error::AppResult;
use crate::handlers::auth::authenticate;
use crate::models::NotificationsListResponse;

pub async fn list_notifications(
    State((data_service, _sessions, _checkout_service, order_service, _wardrobe_service)): State<crate::AppState>,
    headers: HeaderMap,
) -> AppResult<Json<NotificationsListResponse>> {
    let (_, identity) = authenticate(data_service.as_ref(), &headers).await?;
    let notifications = order_service.list_notifications(identity.user_id).await?;
    Ok(Json(notifications))
}
