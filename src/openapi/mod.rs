use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

/// Registers the bearer schemes referenced by `security(...)` on handlers
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "cron_secret",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Saree Storefront API",
        version = "1.0.0",
        description = r#"
# Saree Storefront API

Storefront and back-office API for an online saree shop.

## Authentication

Customer and admin endpoints expect the session token issued by the identity
provider:

```
Authorization: Bearer <session-token>
```

Admin endpoints additionally require the caller's profile to carry the
`admin` role. Scheduled jobs authenticate with the configured cron secret.

## Money

Amounts are decimal strings in rupees, e.g. `"1043.00"`.

## Errors

```json
{
  "error": "Bad Request",
  "message": "Missing required fields",
  "request_id": "7d7c6c1e-...",
  "timestamp": "2026-01-01T00:00:00Z"
}
```
        "#,
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Catalog", description = "Product browsing"),
        (name = "Cart", description = "Stored carts and abandonment tracking"),
        (name = "Wishlist", description = "Saved products"),
        (name = "Addresses", description = "Saved delivery addresses"),
        (name = "Newsletter", description = "Mailing list sign-up"),
        (name = "Checkout", description = "Order totals"),
        (name = "Orders", description = "UPI orders and payment proof"),
        (name = "Payments", description = "Razorpay checkout and webhooks"),
        (name = "Admin", description = "Back-office operations"),
        (name = "Integrations", description = "Cron, WhatsApp and e-mail endpoints"),
        (name = "Health", description = "Health checks")
    ),
    paths(
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::products::admin_list_products,
        crate::handlers::products::create_product,
        crate::handlers::products::update_product,
        crate::handlers::products::disable_product,

        crate::handlers::cart::get_cart,
        crate::handlers::cart::sync_cart,
        crate::handlers::cart::merge_cart,
        crate::handlers::cart::notify_cart,

        crate::handlers::wishlist::get_wishlist,
        crate::handlers::wishlist::add_to_wishlist,
        crate::handlers::wishlist::remove_from_wishlist,
        crate::handlers::addresses::list_addresses,
        crate::handlers::addresses::save_address,
        crate::handlers::addresses::delete_address,
        crate::handlers::newsletter::subscribe,

        crate::handlers::checkout::quote,
        crate::handlers::orders::create_upi_order,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_payment_proof,
        crate::handlers::orders::confirm_order,
        crate::handlers::uploads::upload_payment_proof,

        crate::handlers::payments::payment_config,
        crate::handlers::payments::create_payment,
        crate::handlers::payments::verify_payment,
        crate::handlers::payments::razorpay_webhook,

        crate::handlers::admin::mark_paid,
        crate::handlers::admin::cancel_order,
        crate::handlers::admin::pending_orders,
        crate::handlers::admin::list_orders,
        crate::handlers::admin::update_order_status,
        crate::handlers::admin::get_settings,
        crate::handlers::admin::save_settings,
        crate::handlers::admin::analytics,
        crate::handlers::admin::cart_sessions,

        crate::handlers::cron::auto_cancel_pending,
        crate::handlers::whatsapp::send_message,
        crate::handlers::whatsapp::verify_webhook,
        crate::handlers::whatsapp::receive_webhook,
        crate::handlers::email::order_confirmation,
        crate::handlers::email::payment_verified,

        crate::handlers::health::liveness_check,
        crate::handlers::health::detailed_health_check,
    ),
    components(
        schemas(
            crate::handlers::common::Ack,
            crate::handlers::common::PaginationMeta,

            crate::services::catalog::ProductSort,
            crate::services::catalog::ProductInput,
            crate::services::catalog::ProductPatch,
            crate::services::catalog::ProductView,
            crate::services::catalog::QuoteLine,
            crate::services::catalog::QuoteRequest,
            crate::services::wishlist::WishlistItem,
            crate::services::addresses::AddressInput,
            crate::handlers::addresses::AddressView,
            crate::handlers::newsletter::SubscribeRequest,

            crate::services::orders::CreateUpiOrderRequest,
            crate::services::orders::UpiOrderItem,
            crate::services::orders::UpiOrderCreated,
            crate::services::payment_proofs::UploadedProof,
            crate::services::upi::UpiPaymentLinks,
            crate::services::orders::OrderDetail,
            crate::services::orders::OrderLineDetail,
            crate::services::orders::ProductRef,
            crate::services::orders::PendingOrder,
            crate::services::orders::CustomerSummary,
            crate::services::orders::FulfilmentUpdate,

            crate::services::payments::PaymentsPublicConfig,
            crate::services::payments::CreatePaymentRequest,
            crate::services::payments::CreatePaymentResponse,
            crate::services::payments::PaymentMethod,
            crate::services::payments::OrderDetails,
            crate::services::payments::VerifyPaymentRequest,
            crate::services::payments::CheckoutPaymentData,
            crate::services::payments::VerifyPaymentResponse,

            crate::services::analytics::Dashboard,
            crate::services::analytics::SalesTrendPoint,
            crate::services::analytics::CategoryPerformance,
            crate::services::analytics::TopProduct,
            crate::services::analytics::InventoryAlert,

            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_storefront_routes() {
        let json = serde_json::to_string(&ApiDoc::openapi()).unwrap();
        assert!(json.contains("Saree Storefront API"));
        assert!(json.contains("/api/orders/create-upi"));
        assert!(json.contains("/api/admin/orders/mark-paid"));
        assert!(json.contains("bearer_auth"));
        assert!(json.contains("/api/upload/payment-proof"));
        assert!(json.contains("/api/payments/webhooks/razorpay"));
        assert!(json.contains("UploadedProof"));
    }
}
