use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Restaurant;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRestaurantRequest {
    pub name: String,
    pub town: String,
    pub address: String,
    pub delivery_fee: i64,
    pub min_order: i64,
    pub categories: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRestaurantRequest {
    pub name: Option<String>,
    pub town: Option<String>,
    pub address: Option<String>,
    pub delivery_fee: Option<i64>,
    pub min_order: Option<i64>,
    pub categories: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RestaurantList {
    pub items: Vec<Restaurant>,
}
