use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, put},
};
use uuid::Uuid;

use crate::{
    dto::restaurants::{CreateRestaurantRequest, RestaurantList, UpdateRestaurantRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::Restaurant,
    response::ApiResponse,
    routes::params::RestaurantQuery,
    services::restaurant_service,
    state::AppState,
};

// The detail routes share the `{restaurant_id}` segment with the nested
// menu router; the router requires one name per position.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_restaurants).post(create_restaurant))
        .route("/mine", get(my_restaurant))
        .route("/{restaurant_id}", get(get_restaurant))
        .route("/{restaurant_id}", put(update_restaurant))
}

#[utoipa::path(
    get,
    path = "/api/restaurants",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("q" = Option<String>, Query, description = "Name search"),
        ("town" = Option<String>, Query, description = "Filter by town"),
        ("category" = Option<String>, Query, description = "Filter by category"),
        ("sort_by" = Option<String>, Query, description = "rating, created_at, delivery_fee, name"),
        ("sort_order" = Option<String>, Query, description = "asc or desc"),
    ),
    responses(
        (status = 200, description = "Active restaurants", body = ApiResponse<RestaurantList>),
    ),
    tag = "Restaurants"
)]
pub async fn list_restaurants(
    State(state): State<AppState>,
    Query(query): Query<RestaurantQuery>,
) -> AppResult<Json<ApiResponse<RestaurantList>>> {
    let resp = restaurant_service::list_restaurants(&state, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/restaurants/mine",
    responses(
        (status = 200, description = "The caller's restaurant", body = ApiResponse<Restaurant>),
        (status = 404, description = "Caller owns no restaurant"),
    ),
    security(("bearer_auth" = [])),
    tag = "Restaurants"
)]
pub async fn my_restaurant(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<Restaurant>>> {
    let resp = restaurant_service::get_my_restaurant(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/restaurants/{restaurant_id}",
    params(
        ("restaurant_id" = Uuid, Path, description = "Restaurant ID")
    ),
    responses(
        (status = 200, description = "Restaurant detail", body = ApiResponse<Restaurant>),
        (status = 404, description = "Not found or inactive"),
    ),
    tag = "Restaurants"
)]
pub async fn get_restaurant(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Restaurant>>> {
    let resp = restaurant_service::get_restaurant(&state, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/restaurants",
    request_body = CreateRestaurantRequest,
    responses(
        (status = 200, description = "Restaurant created", body = ApiResponse<Restaurant>),
        (status = 400, description = "Invalid restaurant data"),
        (status = 403, description = "Caller is not an owner"),
        (status = 409, description = "Caller already has a restaurant"),
    ),
    security(("bearer_auth" = [])),
    tag = "Restaurants"
)]
pub async fn create_restaurant(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateRestaurantRequest>,
) -> AppResult<Json<ApiResponse<Restaurant>>> {
    let resp = restaurant_service::create_restaurant(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/restaurants/{restaurant_id}",
    params(
        ("restaurant_id" = Uuid, Path, description = "Restaurant ID")
    ),
    request_body = UpdateRestaurantRequest,
    responses(
        (status = 200, description = "Restaurant updated", body = ApiResponse<Restaurant>),
        (status = 400, description = "Invalid restaurant data"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Restaurants"
)]
pub async fn update_restaurant(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRestaurantRequest>,
) -> AppResult<Json<ApiResponse<Restaurant>>> {
    let resp = restaurant_service::update_restaurant(&state, &user, id, payload).await?;
    Ok(Json(resp))
}
