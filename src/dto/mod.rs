pub mod auth;
pub mod menus;
pub mod orders;
pub mod restaurants;
pub mod reviews;
