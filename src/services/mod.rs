// Storefront
pub mod addresses;
pub mod cart;
pub mod catalog;
pub mod newsletter;
pub mod wishlist;

// Checkout and orders
pub mod order_status;
pub mod orders;
pub mod payment_proofs;
pub mod payments;
pub mod pricing;
pub mod upi;

// Back-office
pub mod analytics;
pub mod cart_tracking;
pub mod settings;
