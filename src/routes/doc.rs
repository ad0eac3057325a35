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
        cart::{AddToCartRequest, CartItemDto, CartList},
        checkout::{BeginCheckoutRequest, CheckoutSessionResponse},
        orders::{OrderList, OrderWithItems, UpdateOrderStatusRequest},
    },
    models::{CartItem, Order, OrderItem, OrderStatus, Product, User},
    response::{ApiResponse, Meta},
    routes::{admin, auth, cart, checkout, health, orders, params, webhooks},
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
        auth::login,
        auth::register,
        cart::cart_list,
        cart::add_to_cart,
        cart::remove_from_cart,
        checkout::create_session,
        orders::list_orders,
        orders::get_order,
        orders::cancel_order,
        webhooks::payment_webhook,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::list_low_stock,
        admin::adjust_inventory
    ),
    components(
        schemas(
            User,
            Product,
            CartItem,
            Order,
            OrderItem,
            OrderStatus,
            AddToCartRequest,
            CartItemDto,
            CartList,
            BeginCheckoutRequest,
            CheckoutSessionResponse,
            OrderList,
            OrderWithItems,
            UpdateOrderStatusRequest,
            admin::ProductList,
            admin::InventoryAdjustRequest,
            admin::LowStockQuery,
            params::Pagination,
            params::OrderListQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<CartList>,
            ApiResponse<CheckoutSessionResponse>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<admin::ProductList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Checkout", description = "Checkout session endpoints"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Webhooks", description = "Payment provider callbacks"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
