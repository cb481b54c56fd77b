//! Checkout total computation.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::StoreConfig;

/// Store pricing knobs applied at checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingRules {
    pub free_shipping_threshold: Decimal,
    pub shipping_fee: Decimal,
    /// Fraction, e.g. 0.18
    pub tax_rate: Decimal,
}

impl From<&StoreConfig> for PricingRules {
    fn from(store: &StoreConfig) -> Self {
        Self {
            free_shipping_threshold: store.free_shipping_threshold,
            shipping_fee: store.shipping_fee,
            tax_rate: store.tax_rate,
        }
    }
}

/// Whether the flow charges tax on top of the subtotal. The UPI flow does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxPolicy {
    Apply,
    Omit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutTotals {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

impl PricingRules {
    /// Flat fee unless the subtotal reaches the threshold; empty carts ship free.
    pub fn shipping_for(&self, subtotal: Decimal, has_items: bool) -> Decimal {
        if !has_items || subtotal >= self.free_shipping_threshold {
            Decimal::ZERO
        } else {
            self.shipping_fee
        }
    }

    /// Computes totals from `(unit_price, quantity)` lines.
    ///
    /// The discount is capped at the subtotal so the total never goes negative.
    pub fn totals<I>(&self, lines: I, tax: TaxPolicy, discount: Decimal) -> CheckoutTotals
    where
        I: IntoIterator<Item = (Decimal, i32)>,
    {
        let mut subtotal = Decimal::ZERO;
        let mut has_items = false;
        for (price, quantity) in lines {
            has_items = true;
            subtotal += price * Decimal::from(quantity);
        }

        let shipping = self.shipping_for(subtotal, has_items);
        let tax = match tax {
            TaxPolicy::Apply => (subtotal * self.tax_rate).round_dp(2),
            TaxPolicy::Omit => Decimal::ZERO,
        };
        let discount = discount.max(Decimal::ZERO).min(subtotal);

        CheckoutTotals {
            subtotal,
            shipping,
            tax,
            discount,
            total: subtotal + shipping + tax - discount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn rules() -> PricingRules {
        PricingRules {
            free_shipping_threshold: dec!(999),
            shipping_fee: dec!(99),
            tax_rate: dec!(0.18),
        }
    }

    #[test]
    fn two_sarees_above_threshold_ship_free() {
        let totals = rules().totals(
            [(dec!(500), 2), (dec!(300), 1)],
            TaxPolicy::Omit,
            Decimal::ZERO,
        );
        assert_eq!(totals.subtotal, dec!(1300));
        assert_eq!(totals.shipping, Decimal::ZERO);
        assert_eq!(totals.total, dec!(1300));
    }

    #[rstest]
    #[case(dec!(998.99), true, dec!(99))]
    #[case(dec!(999), true, dec!(0))]
    #[case(dec!(0), true, dec!(99))]
    #[case(dec!(0), false, dec!(0))]
    fn shipping_rule(#[case] subtotal: Decimal, #[case] has_items: bool, #[case] fee: Decimal) {
        assert_eq!(rules().shipping_for(subtotal, has_items), fee);
    }

    #[test]
    fn tax_applies_only_when_requested() {
        let with_tax = rules().totals([(dec!(1000), 1)], TaxPolicy::Apply, Decimal::ZERO);
        assert_eq!(with_tax.tax, dec!(180));
        assert_eq!(with_tax.total, dec!(1180));

        let without = rules().totals([(dec!(1000), 1)], TaxPolicy::Omit, Decimal::ZERO);
        assert_eq!(without.total, dec!(1000));
    }

    #[test]
    fn discount_is_capped_at_subtotal() {
        let totals = rules().totals([(dec!(100), 1)], TaxPolicy::Omit, dec!(500));
        assert_eq!(totals.discount, dec!(100));
        assert_eq!(totals.total, dec!(99));
    }
}
