//! Database entities for the store.

pub mod cart;
pub mod cart_item;
pub mod category;
pub mod favorite;
pub mod invoice;
pub mod order;
pub mod order_item;
pub mod product;
pub mod product_image;
pub mod product_review;
pub mod reset_password_token;
pub mod user;

pub use order::{OrderStatus, PaymentMethod};
pub use user::{AuthProvider, Role};
