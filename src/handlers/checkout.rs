use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::error::{AppError, AppResult};
use crate::handlers::auth::authenticate;
use crate::models::{CheckoutReceipt, CheckoutRequest};

pub async fn submit_checkout(
    State((data_service, sessions, checkout_service, _order_service, _wardrobe_service)): State<crate::AppState>,
    headers: HeaderMap,
    Json(req): Json<CheckoutRequest>,
) -> AppResult<(StatusCode, Json<CheckoutReceipt>)> {
    let (_, identity) = authenticate(data_service.as_ref(), &headers).await?;
    let session = sessions.get_or_create(&identity.user_id.to_string()).await;

    // Runs detached so a dropped connection doesn't abandon a half-written order.
    let receipt = tokio::spawn(async move {
        checkout_service
            .checkout_for(&session, identity, &req)
            .await
    })
        .await
        .map_err(|e| AppError::InternalServerError(format!("checkout task failed: {}", e)))??;

    let status = if receipt.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(receipt)))
}
