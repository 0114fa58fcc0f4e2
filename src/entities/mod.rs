pub mod order;
pub mod order_item;
pub mod pending_payment;
pub mod stock_level;

pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use pending_payment::Entity as PendingPayment;
pub use stock_level::Entity as StockLevel;
