//! sea-orm entities, one module per table.

pub mod address;
pub mod cart_item;
pub mod newsletter_subscription;
pub mod order;
pub mod order_item;
pub mod product;
pub mod profile;
pub mod store_settings;
pub mod wishlist;
