use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::handlers::auth::authenticate;
use crate::models::{ChecklistStep, LenderRequest, Order, OrderWithItems, RespondRequest};

pub async fn list_orders(
    State((data_service, _sessions, _checkout_service, order_service, _wardrobe_service)): State<crate::AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<OrderWithItems>>> {
    let (_, identity) = authenticate(data_service.as_ref(), &headers).await?;
    let orders = order_service.list_borrower_orders(identity.user_id).await?;
    Ok(Json(orders))
}

pub async fn get_order(
    State((data_service, _sessions, _checkout_service, order_service, _wardrobe_service)): State<crate::AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<Json<OrderWithItems>> {
    let (_, identity) = authenticate(data_service.as_ref(), &headers).await?;
    let order = order_service.get_order(identity.user_id, id).await?;
    Ok(Json(order))
}

pub async fn cancel_order(
    State((data_service, _sessions, _checkout_service, order_service, _wardrobe_service)): State<crate::AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Order>> {
    let (_, identity) = authenticate(data_service.as_ref(), &headers).await?;
    let order = order_service.cancel_order(identity.user_id, id).await?;
    Ok(Json(order))
}

pub async fn list_lender_requests(
    State((data_service, _sessions, _checkout_service, order_service, _wardrobe_service)): State<crate::AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<LenderRequest>>> {
    let (_, identity) = authenticate(data_service.as_ref(), &headers).await?;
    let requests = order_service.lender_requests(identity.user_id).await?;
    Ok(Json(requests))
}

pub async fn respond_to_request(
    State((data_service, _sessions, _checkout_service, order_service, _wardrobe_service)): State<crate::AppState>,
    headers: HeaderMap,
    Path(order_id): Path<Uuid>,
    Json(req): Json<RespondRequest>,
) -> AppResult<Json<Order>> {
    let (_, identity) = authenticate(data_service.as_ref(), &headers).await?;
    let order = order_service
        .respond(identity.user_id, order_id, req.status)
        .await?;
    Ok(Json(order))
}

pub async fn get_checklist(
    State((data_service, _sessions, _checkout_service, order_service, _wardrobe_service)): State<crate::AppState>,
    headers: HeaderMap,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<Vec<ChecklistStep>>> {
    let (_, identity) = authenticate(data_service.as_ref(), &headers).await?;
    let steps = order_service.checklist(identity.user_id, order_id).await?;
    Ok(Json(steps))
}

pub async fn toggle_checklist_step(
    State((data_service, _sessions, _checkout_service, order_service, _wardrobe_service)): State<crate::AppState>,
    headers: HeaderMap,
    Path((order_id, step_key)): Path<(Uuid, String)>,
) -> AppResult<Json<Vec<ChecklistStep>>> {
    let (_, identity) = authenticate(data_service.as_ref(), &headers).await?;
    let steps = order_service
        .toggle_step(identity.user_id, order_id, &step_key)
        .await?;
    Ok(Json(steps))
}

pub async fn mark_order_ready(
    State((data_service, _sessions, _checkout_service, order_service, _wardrobe_service)): State<crate::AppState>,
    headers: HeaderMap,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<Order>> {
    let (_, identity) = authenticate(data_service.as_ref(), &headers).await?;
    let order = order_service.mark_ready(identity.user_id, order_id).await?;
    Ok(Json(order))
}
