use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A configured shipping rate. The cost here is the only one ever charged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ShippingRate {
    pub id: String,
    pub label: String,
    pub cost: Decimal,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub estimated_days: Option<String>,
    /// Rates flagged free never charge shipping, whatever their cost.
    #[serde(default)]
    pub free: bool,
}

impl ShippingRate {
    pub fn effective_cost(&self) -> Decimal {
        if self.free {
            Decimal::ZERO
        } else {
            self.cost
        }
    }
}

pub trait ShippingRates: Send + Sync {
    fn resolve(&self, rate_id: &str) -> Option<ShippingRate>;
}

/// Rate table loaded from `[[checkout.shipping_rates]]`.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredShippingRates {
    rates: HashMap<String, ShippingRate>,
}

impl ConfiguredShippingRates {
    pub fn new(rates: impl IntoIterator<Item = ShippingRate>) -> Self {
        Self {
            rates: rates.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

impl ShippingRates for ConfiguredShippingRates {
    fn resolve(&self, rate_id: &str) -> Option<ShippingRate> {
        self.rates.get(rate_id.trim()).cloned()
    }
}
