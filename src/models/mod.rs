// Domain types shared by services and handlers
pub mod checkout;
pub mod order;

pub use checkout::{
    AddressInfo, CartLine, CheckoutField, CheckoutForm, CheckoutOutcome, CheckoutRoute,
    CouponInfo, CouponKind, CustomerInfo, OrderTotals, ShippingSelection,
};
pub use order::{
    FulfillmentStatus, OrderStatus, PaymentMethod, PaymentStatus, StatusLabel, StatusLabels,
    VerificationStatus,
};
