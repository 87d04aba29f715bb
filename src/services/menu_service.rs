use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::menus::{CreateMenuItemRequest, MenuItemList, UpdateMenuItemRequest},
    entity::menu_items::{
        ActiveModel as MenuItemActive, Column as MenuItemCol, Entity as MenuItems,
        Model as MenuItemModel,
    },
    entity::restaurants::{Column as RestaurantCol, Entity as Restaurants, Model as RestaurantModel},
    error::{AppError, AppResult},
    lifecycle::Role,
    middleware::auth::AuthUser,
    models::MenuItem,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

/// Public menu of an active restaurant: available items only.
pub async fn list_menu_items(
    state: &AppState,
    restaurant_id: Uuid,
    pagination: Pagination,
) -> AppResult<ApiResponse<MenuItemList>> {
    Restaurants::find_by_id(restaurant_id)
        .filter(RestaurantCol::IsActive.eq(true))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let (page, limit, offset) = pagination.normalize();
    let condition = Condition::all()
        .add(MenuItemCol::RestaurantId.eq(restaurant_id))
        .add(MenuItemCol::Available.eq(true));

    let finder = MenuItems::find()
        .filter(condition)
        .order_by_asc(MenuItemCol::Category)
        .order_by_asc(MenuItemCol::Name);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(menu_item_from_entity)
        .collect();

    let meta = Meta::paginated(page, limit, total);
    Ok(ApiResponse::success(
        "Menu items",
        MenuItemList { items },
        Some(meta),
    ))
}

/// Management view for the owner: every item, available or not.
pub async fn list_all_menu_items(
    state: &AppState,
    user: &AuthUser,
    restaurant_id: Uuid,
) -> AppResult<ApiResponse<MenuItemList>> {
    let restaurant = load_managed_restaurant(state, user, restaurant_id).await?;

    let items = restaurant
        .find_related(MenuItems)
        .order_by_asc(MenuItemCol::Category)
        .order_by_asc(MenuItemCol::Name)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(menu_item_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Menu items",
        MenuItemList { items },
        Some(Meta::empty()),
    ))
}

pub async fn create_menu_item(
    state: &AppState,
    user: &AuthUser,
    restaurant_id: Uuid,
    payload: CreateMenuItemRequest,
) -> AppResult<ApiResponse<MenuItem>> {
    load_managed_restaurant(state, user, restaurant_id).await?;
    validate_new_menu_item(&payload)?;

    let item = MenuItemActive {
        id: Set(Uuid::new_v4()),
        restaurant_id: Set(restaurant_id),
        name: Set(payload.name),
        description: Set(payload.description),
        price: Set(payload.price),
        category: Set(payload.category),
        available: NotSet,
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "menu_item_create",
        Some("menu_items"),
        Some(serde_json::json!({ "menu_item_id": item.id, "restaurant_id": restaurant_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Menu item created",
        menu_item_from_entity(item),
        Some(Meta::empty()),
    ))
}

pub async fn update_menu_item(
    state: &AppState,
    user: &AuthUser,
    restaurant_id: Uuid,
    item_id: Uuid,
    payload: UpdateMenuItemRequest,
) -> AppResult<ApiResponse<MenuItem>> {
    load_managed_restaurant(state, user, restaurant_id).await?;
    validate_menu_item_update(&payload)?;

    let existing = MenuItems::find_by_id(item_id)
        .filter(MenuItemCol::RestaurantId.eq(restaurant_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: MenuItemActive = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(category) = payload.category {
        active.category = Set(category);
    }
    if let Some(available) = payload.available {
        active.available = Set(available);
    }
    let updated = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "menu_item_update",
        Some("menu_items"),
        Some(serde_json::json!({ "menu_item_id": updated.id, "restaurant_id": restaurant_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Menu item updated",
        menu_item_from_entity(updated),
        Some(Meta::empty()),
    ))
}

pub async fn delete_menu_item(
    state: &AppState,
    user: &AuthUser,
    restaurant_id: Uuid,
    item_id: Uuid,
) -> AppResult<ApiResponse<()>> {
    load_managed_restaurant(state, user, restaurant_id).await?;

    let existing = MenuItems::find_by_id(item_id)
        .filter(MenuItemCol::RestaurantId.eq(restaurant_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    existing.delete(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "menu_item_delete",
        Some("menu_items"),
        Some(serde_json::json!({ "menu_item_id": item_id, "restaurant_id": restaurant_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Menu item deleted",
        (),
        Some(Meta::empty()),
    ))
}

/// Fetches the restaurant and checks the caller may manage its menu.
async fn load_managed_restaurant(
    state: &AppState,
    user: &AuthUser,
    restaurant_id: Uuid,
) -> AppResult<RestaurantModel> {
    let restaurant = Restaurants::find_by_id(restaurant_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if restaurant.owner_id != user.user_id && user.role != Role::Admin {
        return Err(AppError::Forbidden);
    }
    Ok(restaurant)
}

fn validate_new_menu_item(payload: &CreateMenuItemRequest) -> Result<(), AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("Name is required".into()));
    }
    if payload.category.trim().is_empty() {
        return Err(AppError::BadRequest("Category is required".into()));
    }
    if payload.price <= 0 {
        return Err(AppError::BadRequest("Price must be positive".into()));
    }
    Ok(())
}

fn validate_menu_item_update(payload: &UpdateMenuItemRequest) -> Result<(), AppError> {
    if payload.name.as_deref().is_some_and(|v| v.trim().is_empty()) {
        return Err(AppError::BadRequest("Name must not be empty".into()));
    }
    if payload
        .category
        .as_deref()
        .is_some_and(|v| v.trim().is_empty())
    {
        return Err(AppError::BadRequest("Category must not be empty".into()));
    }
    if payload.price.is_some_and(|price| price <= 0) {
        return Err(AppError::BadRequest("Price must be positive".into()));
    }
    Ok(())
}

pub(crate) fn menu_item_from_entity(model: MenuItemModel) -> MenuItem {
    MenuItem {
        id: model.id,
        restaurant_id: model.restaurant_id,
        name: model.name,
        description: model.description,
        price: model.price,
        category: model.category,
        available: model.available,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_prices() {
        let payload = CreateMenuItemRequest {
            name: "Ndole".into(),
            description: None,
            price: 0,
            category: "mains".into(),
        };
        assert!(matches!(
            validate_new_menu_item(&payload),
            Err(AppError::BadRequest(_))
        ));

        let payload = UpdateMenuItemRequest {
            name: None,
            description: None,
            price: Some(-200),
            category: None,
            available: None,
        };
        assert!(validate_menu_item_update(&payload).is_err());
    }

    #[test]
    fn accepts_a_priced_item_and_partial_updates() {
        let payload = CreateMenuItemRequest {
            name: "Ndole".into(),
            description: Some("With plantains".into()),
            price: 2500,
            category: "mains".into(),
        };
        assert!(validate_new_menu_item(&payload).is_ok());

        let payload = UpdateMenuItemRequest {
            name: None,
            description: None,
            price: None,
            category: None,
            available: Some(false),
        };
        assert!(validate_menu_item_update(&payload).is_ok());
    }
}
