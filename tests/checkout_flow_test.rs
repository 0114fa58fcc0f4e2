//! Checkout submission for the proof-based and redirect payment methods:
//! server-side totals, the stock re-check, validation order and retries.

mod common;

use assert_matches::assert_matches;
use common::{line, ten_percent_off, valid_form, TestApp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use storefront_orders::{
    entities::pending_payment,
    errors::ServiceError,
    models::{
        CheckoutField, CheckoutRoute, FulfillmentStatus, OrderStatus, PaymentMethod,
        PaymentStatus, VerificationStatus,
    },
    notifications::EmailKind,
    services::checkout::CheckoutSubmission,
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

fn submission(
    session_id: Uuid,
    items: Vec<storefront_orders::models::CartLine>,
    payment_method: PaymentMethod,
) -> CheckoutSubmission {
    let mut form = valid_form();
    form.coupon = Some(ten_percent_off());
    CheckoutSubmission {
        session_id,
        items,
        form,
        payment_method,
        idempotency_key: None,
    }
}

#[tokio::test]
async fn bank_transfer_order_is_created_with_server_side_totals() {
    let app = TestApp::new().await;
    let product = app.seed_stock(10).await;
    let session_id = Uuid::new_v4();
    let items = vec![line(product, dec!(90.00), 2)];
    app.state
        .services
        .sessions
        .replace_cart(session_id, items.clone());

    let outcome = app
        .state
        .services
        .checkout
        .submit(submission(session_id, items, PaymentMethod::BankTransfer))
        .await
        .expect("checkout should succeed");

    let order_id = outcome.order_id.expect("order created");
    let order = app.order(order_id).await;
    assert_eq!(order.subtotal, dec!(180));
    assert_eq!(order.shipping_cost, dec!(15));
    assert_eq!(order.discount, dec!(18));
    assert_eq!(order.total, dec!(177));
    assert_eq!(order.order_status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.fulfillment_status, FulfillmentStatus::Unfulfilled);
    assert_eq!(order.coupon_code.as_deref(), Some("HOLA10"));
    assert_eq!(order.shipping_rate_id, "lima-standard");
    assert_eq!(order.shipping_carrier.as_deref(), Some("Olva Courier"));
    assert!(order.paid_at.is_none());

    assert_matches!(
        outcome.route,
        CheckoutRoute::UploadProof { order_id: routed, ref view_token }
            if routed == order_id && *view_token == order.view_token
    );

    let pending = pending_payment::Entity::find()
        .filter(pending_payment::Column::OrderId.eq(order_id))
        .one(&*app.state.db)
        .await
        .unwrap()
        .expect("pending payment row");
    assert_eq!(pending.verification_status, VerificationStatus::AwaitingProof);

    assert_eq!(app.available(product).await, 8);
    assert_eq!(app.email_kinds(order_id).await, vec![EmailKind::OrderReceived]);

    let session = app.state.services.sessions.get(session_id);
    assert!(session.map(|s| s.cart().is_empty()).unwrap_or(true));
}

#[tokio::test]
async fn stock_shortage_rejects_without_creating_an_order() {
    let app = TestApp::new().await;
    let product = app.seed_stock(1).await;
    let session_id = Uuid::new_v4();
    let items = vec![line(product, dec!(45.00), 3)];
    app.state
        .services
        .sessions
        .replace_cart(session_id, items.clone());

    let err = app
        .state
        .services
        .checkout
        .submit(submission(session_id, items, PaymentMethod::MobileTransfer))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::StockUnavailable(ref short) if short.len() == 1 && short[0].requested == 3 && short[0].available == 1);
    assert!(err.is_retryable());
    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.available(product).await, 1);

    let cart = app.state.services.sessions.get(session_id).unwrap().cart();
    assert_eq!(cart.len(), 1);
    assert_eq!(cart[0].quantity, 3);
}

#[tokio::test]
async fn missing_stock_row_counts_as_sold_out() {
    let app = TestApp::new().await;
    let items = vec![line(Uuid::new_v4(), dec!(20.00), 1)];

    let err = app
        .state
        .services
        .checkout
        .submit(submission(Uuid::new_v4(), items, PaymentMethod::BankTransfer))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::StockUnavailable(ref short) if short[0].available == 0);
}

#[tokio::test]
async fn field_errors_are_reported_before_stock_is_checked() {
    let app = TestApp::new().await;
    // No stock row at all: a stock error would surface if validation were skipped.
    let items = vec![line(Uuid::new_v4(), dec!(20.00), 1)];
    let mut request = submission(Uuid::new_v4(), items, PaymentMethod::BankTransfer);
    request.form.address.district_code = None;
    request.form.terms_accepted = false;

    let err = app
        .state
        .services
        .checkout
        .submit(request)
        .await
        .unwrap_err();

    assert_matches!(
        err,
        ServiceError::FieldValidation {
            field: CheckoutField::District,
            ..
        }
    );
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn unknown_shipping_rate_is_a_field_error() {
    let app = TestApp::new().await;
    let product = app.seed_stock(5).await;
    let mut request = submission(
        Uuid::new_v4(),
        vec![line(product, dec!(20.00), 1)],
        PaymentMethod::BankTransfer,
    );
    if let Some(shipping) = request.form.shipping.as_mut() {
        shipping.rate_id = "moon-express".into();
    }

    let err = app
        .state
        .services
        .checkout
        .submit(request)
        .await
        .unwrap_err();

    assert_matches!(
        err,
        ServiceError::FieldValidation {
            field: CheckoutField::ShippingRate,
            ..
        }
    );
}

#[tokio::test]
async fn repeated_submission_with_same_key_returns_the_first_order() {
    let app = TestApp::new().await;
    let product = app.seed_stock(10).await;
    let items = vec![line(product, dec!(30.00), 2)];

    let mut first = submission(Uuid::new_v4(), items.clone(), PaymentMethod::BankTransfer);
    first.idempotency_key = Some("retry-key-1".into());
    let second = first.clone();

    let checkout = &app.state.services.checkout;
    let a = checkout.submit(first).await.unwrap();
    let b = checkout.submit(second).await.unwrap();

    assert_eq!(a.order_id, b.order_id);
    assert_eq!(a.order_number, b.order_number);
    assert_eq!(app.order_count().await, 1);
    assert_eq!(app.available(product).await, 8);
    assert_eq!(
        app.email_kinds(a.order_id.unwrap()).await,
        vec![EmailKind::OrderReceived]
    );
}

#[tokio::test]
async fn another_session_reusing_a_key_gets_its_own_order() {
    let app = TestApp::new().await;
    let product = app.seed_stock(20).await;
    let checkout = &app.state.services.checkout;

    let session_a = Uuid::new_v4();
    let mut first = submission(
        session_a,
        vec![line(product, dec!(30.00), 2)],
        PaymentMethod::BankTransfer,
    );
    first.idempotency_key = Some("k1".into());
    let a = checkout.submit(first).await.unwrap();

    let session_b = Uuid::new_v4();
    app.state
        .services
        .sessions
        .replace_cart(session_b, vec![line(product, dec!(99.00), 7)]);
    let mut second = submission(
        session_b,
        vec![line(product, dec!(99.00), 7)],
        PaymentMethod::BankTransfer,
    );
    second.idempotency_key = Some("k1".into());
    let b = checkout.submit(second).await.unwrap();

    assert_ne!(a.order_id, b.order_id);
    assert_ne!(a.route, b.route);
    assert_eq!(app.order_count().await, 2);
    assert_eq!(app.available(product).await, 11);

    let order_b = app.order(b.order_id.unwrap()).await;
    assert_eq!(order_b.subtotal, dec!(693));
    assert!(app
        .state
        .services
        .sessions
        .get(session_b)
        .unwrap()
        .cart()
        .is_empty());
}

#[tokio::test]
async fn oversized_cart_values_are_rejected_not_panicked_on() {
    let app = TestApp::new().await;
    let product = app.seed_stock(5).await;

    let err = app
        .state
        .services
        .checkout
        .submit(submission(
            Uuid::new_v4(),
            vec![line(product, Decimal::MAX, 2)],
            PaymentMethod::BankTransfer,
        ))
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::FieldValidation {
            field: CheckoutField::Cart,
            ..
        }
    );

    let err = app
        .state
        .services
        .payments
        .on_token_received(storefront_orders::services::payments::CardTokenSubmission {
            session_id: Uuid::new_v4(),
            items: vec![line(product, dec!(10.00), i32::MAX)],
            form: valid_form(),
            token: "tok_big".into(),
        })
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::FieldValidation {
            field: CheckoutField::Cart,
            ..
        }
    );
    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.available(product).await, 5);
    assert_eq!(app.gateway.charge_count(), 0);
}

#[tokio::test]
async fn external_redirect_carries_order_number_and_amount() {
    let app = TestApp::new().await;
    let product = app.seed_stock(3).await;

    let outcome = app
        .state
        .services
        .checkout
        .submit(submission(
            Uuid::new_v4(),
            vec![line(product, dec!(90.00), 2)],
            PaymentMethod::ExternalRedirect,
        ))
        .await
        .unwrap();

    let order = app.order(outcome.order_id.unwrap()).await;
    let CheckoutRoute::Redirect { url } = outcome.route else {
        panic!("expected a redirect route");
    };
    let url = reqwest::Url::parse(&url).unwrap();
    assert_eq!(url.host_str(), Some("pay.example.com"));

    let query: std::collections::HashMap<String, String> =
        url.query_pairs().into_owned().collect();
    assert_eq!(query.get("order"), Some(&order.order_number));
    let amount: Decimal = query["amount"].parse().unwrap();
    assert_eq!(amount, dec!(177));

    // Redirect payments have no proof to upload.
    let pending = pending_payment::Entity::find()
        .filter(pending_payment::Column::OrderId.eq(order.id))
        .one(&*app.state.db)
        .await
        .unwrap();
    assert!(pending.is_none());
}

#[tokio::test]
async fn card_submission_waits_for_token_without_touching_stock() {
    let app = TestApp::new().await;
    let product = app.seed_stock(4).await;

    let outcome = app
        .state
        .services
        .checkout
        .submit(submission(
            Uuid::new_v4(),
            vec![line(product, dec!(25.00), 2)],
            PaymentMethod::Card,
        ))
        .await
        .unwrap();

    assert_eq!(outcome.route, CheckoutRoute::AwaitCardToken);
    assert!(outcome.order_id.is_none());
    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.available(product).await, 4);
    assert_eq!(app.gateway.charge_count(), 0);
}

#[tokio::test]
async fn submission_while_another_is_in_flight_is_refused() {
    let app = TestApp::new().await;
    let product = app.seed_stock(4).await;
    let session_id = Uuid::new_v4();

    let session = app.state.services.sessions.get_or_create(session_id);
    let _held = session.guard().try_permit().expect("guard free");

    let err = app
        .state
        .services
        .checkout
        .submit(submission(
            session_id,
            vec![line(product, dec!(25.00), 1)],
            PaymentMethod::BankTransfer,
        ))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::Conflict(_));
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn guard_is_released_after_a_failed_submission() {
    let app = TestApp::new().await;
    let product = app.seed_stock(1).await;
    let session_id = Uuid::new_v4();
    let checkout = &app.state.services.checkout;

    let too_many = submission(
        session_id,
        vec![line(product, dec!(25.00), 2)],
        PaymentMethod::BankTransfer,
    );
    assert!(checkout.submit(too_many).await.is_err());

    let just_enough = submission(
        session_id,
        vec![line(product, dec!(25.00), 1)],
        PaymentMethod::BankTransfer,
    );
    let outcome = checkout.submit(just_enough).await.unwrap();
    assert!(outcome.order_id.is_some());
    assert_eq!(app.available(product).await, 0);
}
