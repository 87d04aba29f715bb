use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest, UpdateProfileRequest},
        menus::{CreateMenuItemRequest, MenuItemList, UpdateMenuItemRequest},
        orders::{
            CreateOrderRequest, OrderItemRequest, OrderList, OrderWithItems,
            UpdateOrderStatusRequest,
        },
        restaurants::{CreateRestaurantRequest, RestaurantList, UpdateRestaurantRequest},
        reviews::{CreateReviewRequest, ReviewList},
    },
    models::{MenuItem, Order, OrderItem, Restaurant, Review, User},
    response::{ApiResponse, Meta},
    routes::{admin, auth, health, menus, orders, params, restaurants, reviews},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::verify,
        auth::logout,
        auth::update_profile,
        restaurants::list_restaurants,
        restaurants::my_restaurant,
        restaurants::get_restaurant,
        restaurants::create_restaurant,
        restaurants::update_restaurant,
        menus::list_menu_items,
        menus::list_all_menu_items,
        menus::create_menu_item,
        menus::update_menu_item,
        menus::delete_menu_item,
        orders::create_order,
        orders::list_my_orders,
        orders::list_restaurant_orders,
        orders::list_assigned_orders,
        orders::list_available_orders,
        orders::get_order,
        orders::update_order_status,
        orders::accept_delivery,
        reviews::create_review,
        reviews::list_restaurant_reviews,
        admin::list_all_orders
    ),
    components(
        schemas(
            User,
            Restaurant,
            MenuItem,
            Order,
            OrderItem,
            Review,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            UpdateProfileRequest,
            CreateRestaurantRequest,
            UpdateRestaurantRequest,
            RestaurantList,
            CreateMenuItemRequest,
            UpdateMenuItemRequest,
            MenuItemList,
            OrderItemRequest,
            CreateOrderRequest,
            UpdateOrderStatusRequest,
            OrderList,
            OrderWithItems,
            CreateReviewRequest,
            ReviewList,
            params::Pagination,
            params::RestaurantQuery,
            params::OrderListQuery,
            Meta,
            ApiResponse<User>,
            ApiResponse<LoginResponse>,
            ApiResponse<Restaurant>,
            ApiResponse<RestaurantList>,
            ApiResponse<MenuItem>,
            ApiResponse<MenuItemList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<Review>,
            ApiResponse<ReviewList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Registration, login and session endpoints"),
        (name = "Restaurants", description = "Restaurant discovery and management"),
        (name = "Menu", description = "Menu item endpoints"),
        (name = "Orders", description = "Order lifecycle endpoints"),
        (name = "Reviews", description = "Review and rating endpoints"),
        (name = "Admin", description = "Operator endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
