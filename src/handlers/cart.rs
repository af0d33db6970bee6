use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::handlers::auth::authenticate;
use crate::models::{AddCartItemRequest, CartItem, CartView, Trip, UpdateTripRequest};

#[derive(Serialize)]
pub struct InCartResponse {
    pub item_id: Uuid,
    pub in_cart: bool,
}

pub async fn get_cart(
    State((data_service, sessions, _checkout_service, _order_service, _wardrobe_service)): State<crate::AppState>,
    headers: HeaderMap,
) -> AppResult<Json<CartView>> {
    let (_, identity) = authenticate(data_service.as_ref(), &headers).await?;
    let session = sessions.get_or_create(&identity.user_id.to_string()).await;
    Ok(Json(session.view()))
}

pub async fn update_trip(
    State((data_service, sessions, _checkout_service, _order_service, _wardrobe_service)): State<crate::AppState>,
    headers: HeaderMap,
    Json(req): Json<UpdateTripRequest>,
) -> AppResult<Json<CartView>> {
    req.validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;
    if let (Some(start), Some(end)) = (req.start_date, req.end_date) {
        if end < start {
            return Err(AppError::BadRequest(format!(
                "Trip ends ({}) before it starts ({})",
                end, start
            )));
        }
    }

    let (_, identity) = authenticate(data_service.as_ref(), &headers).await?;
    let session = sessions.get_or_create(&identity.user_id.to_string()).await;
    session
        .set_trip(Trip {
            city: req.city,
            start_date: req.start_date,
            end_date: req.end_date,
        })?;
    Ok(Json(session.view()))
}

pub async fn add_cart_item(
    State((data_service, sessions, _checkout_service, _order_service, wardrobe_service)): State<crate::AppState>,
    headers: HeaderMap,
    Json(req): Json<AddCartItemRequest>,
) -> AppResult<(StatusCode, Json<CartView>)> {
    let (_, identity) = authenticate(data_service.as_ref(), &headers).await?;
    let listing = wardrobe_service.get_listing(req.item_id).await?;
    if listing.owner_id == identity.user_id {
        return Err(AppError::BadRequest(
            "You can't borrow your own item".to_string(),
        ));
    }

    let session = sessions.get_or_create(&identity.user_id.to_string()).await;
    let added = session.add_item(CartItem::from(listing))?;
    debug!("Cart add {} for {} (added: {})", req.item_id, identity.user_id, added);

    let status = if added { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(session.view())))
}

pub async fn check_cart_item(
    State((data_service, sessions, _checkout_service, _order_service, _wardrobe_service)): State<crate::AppState>,
    headers: HeaderMap,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<InCartResponse>> {
    let (_, identity) = authenticate(data_service.as_ref(), &headers).await?;
    let in_cart = match sessions.get(&identity.user_id.to_string()).await {
        Some(session) => session.is_in_cart(item_id),
        None => false,
    };
    Ok(Json(InCartResponse { item_id, in_cart }))
}

pub async fn remove_cart_item(
    State((data_service, sessions, _checkout_service, _order_service, _wardrobe_service)): State<crate::AppState>,
    headers: HeaderMap,
    Path(item_id): Path<Uuid>,
) -> AppResult<Json<CartView>> {
    let (_, identity) = authenticate(data_service.as_ref(), &headers).await?;
    let session = sessions.get_or_create(&identity.user_id.to_string()).await;
    session.remove_item(item_id)?;
    Ok(Json(session.view()))
}

pub async fn clear_cart(
    State((data_service, sessions, _checkout_service, _order_service, _wardrobe_service)): State<crate::AppState>,
    headers: HeaderMap,
) -> AppResult<Json<CartView>> {
    let (_, identity) = authenticate(data_service.as_ref(), &headers).await?;
    let session = sessions.get_or_create(&identity.user_id.to_string()).await;
    session.clear()?;
    Ok(Json(session.view()))
}
