pub mod audit_logs;
pub mod menu_items;
pub mod order_items;
pub mod orders;
pub mod restaurants;
pub mod reviews;
pub mod users;

pub use audit_logs::Entity as AuditLogs;
pub use menu_items::Entity as MenuItems;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use restaurants::Entity as Restaurants;
pub use reviews::Entity as Reviews;
pub use users::Entity as Users;
