//! Property-based tests for the transition tables and checkout totals.
//!
//! These use proptest to check invariants over every status combination and
//! over arbitrary carts and coupons.

use proptest::prelude::*;
use rust_decimal::Decimal;
use sea_orm::Iterable;
use storefront_orders::{
    models::{CartLine, CouponInfo, CouponKind, FulfillmentStatus, OrderStatus, PaymentStatus},
    services::{
        checkout::compute_totals,
        shipping::ShippingRate,
        state_machine::{
            plan, validate_transition, AxisState, NamedAction, OrderAxes, RequestedAxes,
        },
    },
};
use uuid::Uuid;

fn order_status() -> impl Strategy<Value = OrderStatus> {
    prop::sample::select(OrderStatus::iter().collect::<Vec<_>>())
}

fn payment_status() -> impl Strategy<Value = PaymentStatus> {
    prop::sample::select(PaymentStatus::iter().collect::<Vec<_>>())
}

fn fulfillment_status() -> impl Strategy<Value = FulfillmentStatus> {
    prop::sample::select(FulfillmentStatus::iter().collect::<Vec<_>>())
}

fn axes() -> impl Strategy<Value = OrderAxes> {
    (order_status(), payment_status(), fulfillment_status()).prop_map(
        |(order, payment, fulfillment)| OrderAxes {
            order,
            payment,
            fulfillment,
        },
    )
}

fn requested() -> impl Strategy<Value = RequestedAxes> {
    (
        prop::option::of(order_status()),
        prop::option::of(payment_status()),
        prop::option::of(fulfillment_status()),
    )
        .prop_map(|(order, payment, fulfillment)| RequestedAxes {
            order,
            payment,
            fulfillment,
        })
}

/// Amount in cents turned into a 2dp decimal.
fn money(max_cents: i64) -> impl Strategy<Value = Decimal> {
    (0..=max_cents).prop_map(|cents| Decimal::new(cents, 2))
}

fn cart() -> impl Strategy<Value = Vec<CartLine>> {
    prop::collection::vec((money(50_000), 1..20i32), 1..6).prop_map(|lines| {
        lines
            .into_iter()
            .map(|(price, quantity)| CartLine {
                product_id: Uuid::new_v4(),
                variant_id: None,
                quantity,
                name: "Item".into(),
                variant_name: None,
                price,
                image: None,
                options: None,
            })
            .collect()
    })
}

fn coupon() -> impl Strategy<Value = Option<CouponInfo>> {
    let kind = prop_oneof![
        Just(CouponKind::Percentage),
        Just(CouponKind::Fixed),
        Just(CouponKind::FreeShipping),
    ];
    prop::option::of((kind, (-1_000i64..20_000).prop_map(|v| Decimal::new(v, 1)))).prop_map(
        |maybe| {
            maybe.map(|(kind, discount)| CouponInfo {
                code: Some("PROMO".into()),
                kind: Some(kind),
                discount: Some(discount),
            })
        },
    )
}

fn shipping_rate() -> impl Strategy<Value = ShippingRate> {
    (money(10_000), any::<bool>()).prop_map(|(cost, free)| ShippingRate {
        id: "rate".into(),
        label: "Rate".into(),
        cost,
        carrier: None,
        estimated_days: None,
        free,
    })
}

fn is_legal<S: AxisState>(from: S, to: S) -> bool {
    from == to || from.can_transition_to(to)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn validation_agrees_with_the_tables(from in order_status(), to in order_status()) {
        prop_assert_eq!(validate_transition(from, to).is_ok(), from.allowed_next().contains(&to));
    }

    #[test]
    fn terminal_payment_states_accept_nothing(from in payment_status(), to in payment_status()) {
        if from.is_terminal() {
            prop_assert!(validate_transition(from, to).is_err());
        }
    }

    #[test]
    fn no_axis_state_loops_to_itself(
        order in order_status(),
        payment in payment_status(),
        fulfillment in fulfillment_status(),
    ) {
        prop_assert!(!order.can_transition_to(order));
        prop_assert!(!payment.can_transition_to(payment));
        prop_assert!(!fulfillment.can_transition_to(fulfillment));
    }

    #[test]
    fn accepted_plans_only_take_legal_steps(current in axes(), request in requested()) {
        if let Ok(accepted) = plan(current, request) {
            let next = accepted.apply_to(current);
            prop_assert!(is_legal(current.order, next.order));
            prop_assert!(is_legal(current.payment, next.payment));
            prop_assert!(is_legal(current.fulfillment, next.fulfillment));

            let dispatched_now = next.fulfillment != current.fulfillment
                && matches!(next.fulfillment, FulfillmentStatus::Shipped | FulfillmentStatus::Delivered);
            prop_assert!(!(dispatched_now && next.order == OrderStatus::Cancelled));

            // Asking for the state we just reached is a no-op.
            let again = plan(next, RequestedAxes {
                order: Some(next.order),
                payment: Some(next.payment),
                fulfillment: Some(next.fulfillment),
            });
            prop_assert!(again.map(|p| p.is_empty()).unwrap_or(false));
        }
    }

    #[test]
    fn named_actions_touch_only_their_axis(current in axes()) {
        if let Ok(p) = NamedAction::Cancel.plan(current) {
            let next = p.apply_to(current);
            prop_assert_eq!(next.order, OrderStatus::Cancelled);
            prop_assert_eq!(next.payment, current.payment);
            prop_assert_eq!(next.fulfillment, current.fulfillment);
        }
        if let Ok(p) = NamedAction::Refund.plan(current) {
            prop_assert_eq!(current.payment, PaymentStatus::Paid);
            let next = p.apply_to(current);
            prop_assert_eq!(next.payment, PaymentStatus::Refunded);
            prop_assert_eq!(next.order, current.order);
        }
        if let Ok(p) = NamedAction::MarkPaymentFailed.plan(current) {
            let next = p.apply_to(current);
            prop_assert_eq!(next.payment, PaymentStatus::Failed);
            prop_assert_eq!(next.fulfillment, current.fulfillment);
        }
    }

    #[test]
    fn totals_balance_and_stay_in_cents(items in cart(), rate in shipping_rate(), coupon in coupon()) {
        let totals = compute_totals(&items, &rate, coupon.as_ref());

        prop_assert_eq!(totals.total, totals.subtotal + totals.shipping_cost - totals.discount);
        prop_assert!(totals.discount >= Decimal::ZERO);
        prop_assert!(totals.discount <= totals.subtotal);
        prop_assert!(totals.total >= Decimal::ZERO);
        for part in [totals.subtotal, totals.shipping_cost, totals.discount, totals.total] {
            prop_assert!(part.scale() <= 2, "{} has more than two decimals", part);
        }
        if rate.free {
            prop_assert_eq!(totals.shipping_cost, Decimal::ZERO);
        }
    }
}

#[test]
fn every_order_state_is_reachable_from_pending() {
    let mut seen = vec![OrderStatus::Pending];
    let mut frontier = vec![OrderStatus::Pending];
    while let Some(state) = frontier.pop() {
        for next in state.allowed_next() {
            if !seen.contains(next) {
                seen.push(*next);
                frontier.push(*next);
            }
        }
    }
    assert_eq!(seen.len(), OrderStatus::iter().count());
}
