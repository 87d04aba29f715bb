use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{delete, get, put},
};
use uuid::Uuid;

use crate::{
    dto::menus::{CreateMenuItemRequest, MenuItemList, UpdateMenuItemRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::MenuItem,
    response::ApiResponse,
    routes::params::Pagination,
    services::menu_service,
    state::AppState,
};

/// Nested under `/restaurants/{restaurant_id}/menu-items`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_menu_items).post(create_menu_item))
        .route("/manage", get(list_all_menu_items))
        .route("/{item_id}", put(update_menu_item))
        .route("/{item_id}", delete(delete_menu_item))
}

#[utoipa::path(
    get,
    path = "/api/restaurants/{restaurant_id}/menu-items",
    params(
        ("restaurant_id" = Uuid, Path, description = "Restaurant ID"),
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
    ),
    responses(
        (status = 200, description = "Available menu items", body = ApiResponse<MenuItemList>),
        (status = 404, description = "Restaurant not found or inactive"),
    ),
    tag = "Menu"
)]
pub async fn list_menu_items(
    State(state): State<AppState>,
    Path(restaurant_id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<MenuItemList>>> {
    let resp = menu_service::list_menu_items(&state, restaurant_id, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/restaurants/{restaurant_id}/menu-items/manage",
    params(
        ("restaurant_id" = Uuid, Path, description = "Restaurant ID"),
    ),
    responses(
        (status = 200, description = "Every menu item, available or not", body = ApiResponse<MenuItemList>),
        (status = 403, description = "Not the owner"),
    ),
    security(("bearer_auth" = [])),
    tag = "Menu"
)]
pub async fn list_all_menu_items(
    State(state): State<AppState>,
    user: AuthUser,
    Path(restaurant_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<MenuItemList>>> {
    let resp = menu_service::list_all_menu_items(&state, &user, restaurant_id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/restaurants/{restaurant_id}/menu-items",
    params(
        ("restaurant_id" = Uuid, Path, description = "Restaurant ID"),
    ),
    request_body = CreateMenuItemRequest,
    responses(
        (status = 200, description = "Menu item created", body = ApiResponse<MenuItem>),
        (status = 400, description = "Invalid menu item data"),
        (status = 403, description = "Not the owner"),
    ),
    security(("bearer_auth" = [])),
    tag = "Menu"
)]
pub async fn create_menu_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(restaurant_id): Path<Uuid>,
    Json(payload): Json<CreateMenuItemRequest>,
) -> AppResult<Json<ApiResponse<MenuItem>>> {
    let resp = menu_service::create_menu_item(&state, &user, restaurant_id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/restaurants/{restaurant_id}/menu-items/{item_id}",
    params(
        ("restaurant_id" = Uuid, Path, description = "Restaurant ID"),
        ("item_id" = Uuid, Path, description = "Menu item ID"),
    ),
    request_body = UpdateMenuItemRequest,
    responses(
        (status = 200, description = "Menu item updated", body = ApiResponse<MenuItem>),
        (status = 400, description = "Invalid menu item data"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "No such item on this menu"),
    ),
    security(("bearer_auth" = [])),
    tag = "Menu"
)]
pub async fn update_menu_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path((restaurant_id, item_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateMenuItemRequest>,
) -> AppResult<Json<ApiResponse<MenuItem>>> {
    let resp =
        menu_service::update_menu_item(&state, &user, restaurant_id, item_id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/restaurants/{restaurant_id}/menu-items/{item_id}",
    params(
        ("restaurant_id" = Uuid, Path, description = "Restaurant ID"),
        ("item_id" = Uuid, Path, description = "Menu item ID"),
    ),
    responses(
        (status = 200, description = "Menu item deleted"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "No such item on this menu"),
    ),
    security(("bearer_auth" = [])),
    tag = "Menu"
)]
pub async fn delete_menu_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path((restaurant_id, item_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ApiResponse<()>>> {
    let resp = menu_service::delete_menu_item(&state, &user, restaurant_id, item_id).await?;
    Ok(Json(resp))
}
