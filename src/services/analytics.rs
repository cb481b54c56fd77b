//! Back-office sales dashboard.
//!
//! Revenue only counts orders whose payment is verified or paid. Monthly
//! buckets are keyed by (year, month) so the same month of two years never
//! merges.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{order, order_item, product, profile},
    errors::ServiceError,
    services::order_status::is_settled_payment,
};

const TREND_MONTHS: i32 = 6;
const TOP_PRODUCTS: usize = 5;
const INVENTORY_ALERTS: usize = 5;
const UNCATEGORIZED: &str = "Uncategorized";
const UNKNOWN_PRODUCT: &str = "Unknown Product";
const DEFAULT_CATEGORY_COLOR: &str = "#8B5CF6";

pub fn category_color(category: &str) -> &'static str {
    match category {
        "Silk Sarees" => "#8B5CF6",
        "Cotton Sarees" => "#06B6D4",
        "Designer Sarees" => "#F59E0B",
        "Bridal Sarees" => "#EF4444",
        "Festive Wear" => "#10B981",
        "Casual Sarees" => "#6366F1",
        _ => DEFAULT_CATEGORY_COLOR,
    }
}

/// `low` at 5 or fewer units, `medium` up to 15
pub fn stock_status(stock: i32) -> &'static str {
    if stock <= 5 {
        "low"
    } else if stock <= 15 {
        "medium"
    } else {
        "good"
    }
}

/// One order line joined with its product
#[derive(Debug, Clone, PartialEq)]
pub struct LineFacts {
    pub product_id: Option<Uuid>,
    pub product_name: Option<String>,
    pub category: Option<String>,
    pub quantity: i32,
    pub price: Decimal,
}

impl LineFacts {
    fn revenue(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderFacts {
    pub user_id: Uuid,
    pub total_amount: Decimal,
    pub payment_status: String,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<LineFacts>,
}

impl OrderFacts {
    fn is_paid(&self) -> bool {
        is_settled_payment(&self.payment_status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockFacts {
    pub id: Uuid,
    pub name: String,
    pub stock_quantity: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SalesTrendPoint {
    pub month: String,
    pub sales: Decimal,
    pub orders: u64,
    pub customers: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CategoryPerformance {
    pub name: String,
    pub revenue: Decimal,
    pub orders: u64,
    #[schema(value_type = String)]
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TopProduct {
    pub name: String,
    pub sales: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct InventoryAlert {
    pub id: Uuid,
    pub name: String,
    pub stock: i32,
    #[schema(value_type = String)]
    pub status: &'static str,
}

/// Back-office dashboard figures
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub revenue_growth: String,
    pub retention_rate: String,
    pub conversion_rate: String,
    pub sales_trend: Vec<SalesTrendPoint>,
    pub category_performance: Vec<CategoryPerformance>,
    pub top_products: Vec<TopProduct>,
    pub inventory_alerts: Vec<InventoryAlert>,
    pub total_revenue: Decimal,
    pub total_orders: u64,
    pub total_customers: u64,
}

/// Calendar month `offset` months away from (year, month), as (year, month)
fn shift_month(year: i32, month: u32, offset: i32) -> (i32, u32) {
    let index = year * 12 + month as i32 - 1 + offset;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

fn month_start(year: i32, month: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn percent(numerator: Decimal, denominator: Decimal) -> Decimal {
    (numerator / denominator * Decimal::ONE_HUNDRED).round_dp(1)
}

/// Growth of the recent window over the previous one, "+0%" without a baseline
fn format_growth(recent: Decimal, previous: Decimal) -> String {
    if previous <= Decimal::ZERO {
        return "+0%".to_string();
    }
    let growth = percent(recent - previous, previous);
    if growth.is_sign_negative() && !growth.is_zero() {
        format!("{:.1}%", growth)
    } else {
        format!("+{:.1}%", growth.abs())
    }
}

fn format_rate(numerator: usize, denominator: usize) -> String {
    if denominator == 0 {
        return "0%".to_string();
    }
    format!(
        "{:.1}%",
        percent(Decimal::from(numerator), Decimal::from(denominator))
    )
}

/// Single pass aggregation over already-loaded rows
pub fn build_dashboard(
    now: DateTime<Utc>,
    orders: &[OrderFacts],
    products: &[StockFacts],
    customer_count: u64,
) -> Dashboard {
    let paid: Vec<&OrderFacts> = orders.iter().filter(|o| o.is_paid()).collect();
    let total_revenue: Decimal = paid.iter().map(|o| o.total_amount).sum();

    let (year, month) = (now.year(), now.month());
    let recent_start = {
        let (y, m) = shift_month(year, month, -3);
        month_start(y, m)
    };
    let previous_start = {
        let (y, m) = shift_month(year, month, -6);
        month_start(y, m)
    };
    let recent: Decimal = paid
        .iter()
        .filter(|o| o.created_at >= recent_start)
        .map(|o| o.total_amount)
        .sum();
    let previous: Decimal = paid
        .iter()
        .filter(|o| o.created_at >= previous_start && o.created_at < recent_start)
        .map(|o| o.total_amount)
        .sum();

    let mut orders_per_customer: HashMap<Uuid, usize> = HashMap::new();
    for o in orders {
        *orders_per_customer.entry(o.user_id).or_default() += 1;
    }
    let repeat = orders_per_customer.values().filter(|n| **n > 1).count();
    let unique = orders_per_customer.len();

    // Trend buckets keyed by (year, month), oldest first
    let mut trend: Vec<((i32, u32), SalesTrendPoint, HashSet<Uuid>)> = (0..TREND_MONTHS)
        .rev()
        .map(|back| {
            let (y, m) = shift_month(year, month, -back);
            let label = NaiveDate::from_ymd_opt(y, m, 1)
                .map(|d| d.format("%b").to_string())
                .unwrap_or_default();
            (
                (y, m),
                SalesTrendPoint {
                    month: label,
                    sales: Decimal::ZERO,
                    orders: 0,
                    customers: 0,
                },
                HashSet::new(),
            )
        })
        .collect();
    for o in &paid {
        let key = (o.created_at.year(), o.created_at.month());
        if let Some((_, point, customers)) = trend.iter_mut().find(|(k, _, _)| *k == key) {
            point.sales += o.total_amount;
            point.orders += 1;
            customers.insert(o.user_id);
        }
    }
    let sales_trend = trend
        .into_iter()
        .map(|(_, mut point, customers)| {
            point.customers = customers.len() as u64;
            point
        })
        .collect();

    let mut categories: HashMap<String, (Decimal, u64)> = HashMap::new();
    let mut top: HashMap<Option<Uuid>, TopProduct> = HashMap::new();
    for o in &paid {
        let mut seen: HashSet<&str> = HashSet::new();
        for line in &o.lines {
            let name = line.category.as_deref().unwrap_or(UNCATEGORIZED);
            categories.entry(name.to_string()).or_default().0 += line.revenue();
            if let Some(category) = line.category.as_deref() {
                seen.insert(category);
            }

            let entry = top.entry(line.product_id).or_insert_with(|| TopProduct {
                name: line
                    .product_name
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_PRODUCT.to_string()),
                sales: 0,
                revenue: Decimal::ZERO,
            });
            entry.sales += i64::from(line.quantity);
            entry.revenue += line.revenue();
        }
        for category in seen {
            categories.entry(category.to_string()).or_default().1 += 1;
        }
    }

    let mut category_performance: Vec<CategoryPerformance> = categories
        .into_iter()
        .map(|(name, (revenue, orders))| CategoryPerformance {
            color: category_color(&name),
            name,
            revenue,
            orders,
        })
        .collect();
    category_performance.sort_by(|a, b| b.revenue.cmp(&a.revenue).then_with(|| a.name.cmp(&b.name)));

    let mut top_products: Vec<TopProduct> = top.into_values().collect();
    top_products.sort_by(|a, b| b.revenue.cmp(&a.revenue).then_with(|| a.name.cmp(&b.name)));
    top_products.truncate(TOP_PRODUCTS);

    let mut inventory_alerts: Vec<InventoryAlert> = products
        .iter()
        .filter_map(|p| {
            p.stock_quantity.map(|stock| InventoryAlert {
                id: p.id,
                name: p.name.clone(),
                stock,
                status: stock_status(stock),
            })
        })
        .collect();
    inventory_alerts.sort_by_key(|a| a.stock);
    inventory_alerts.truncate(INVENTORY_ALERTS);

    Dashboard {
        revenue_growth: format_growth(recent, previous),
        retention_rate: format_rate(repeat, unique),
        conversion_rate: format_rate(unique, customer_count.max(1) as usize),
        sales_trend,
        category_performance,
        top_products,
        inventory_alerts,
        total_revenue,
        total_orders: orders.len() as u64,
        total_customers: customer_count,
    }
}

#[derive(Clone)]
pub struct AnalyticsService {
    db: Arc<DatabaseConnection>,
}

impl AnalyticsService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn dashboard(&self, now: DateTime<Utc>) -> Result<Dashboard, ServiceError> {
        let orders = order::Entity::find()
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let mut lines: HashMap<Uuid, Vec<LineFacts>> = HashMap::new();
        for (item, product) in order_item::Entity::find()
            .find_also_related(product::Entity)
            .all(&*self.db)
            .await?
        {
            lines.entry(item.order_id).or_default().push(LineFacts {
                product_id: product.as_ref().map(|p| p.id),
                product_name: product.as_ref().map(|p| p.name.clone()),
                category: product.and_then(|p| p.category),
                quantity: item.quantity,
                price: item.price,
            });
        }

        let facts: Vec<OrderFacts> = orders
            .into_iter()
            .map(|o| OrderFacts {
                lines: lines.remove(&o.id).unwrap_or_default(),
                user_id: o.user_id,
                total_amount: o.total_amount,
                payment_status: o.payment_status,
                created_at: o.created_at,
            })
            .collect();

        let products: Vec<StockFacts> = product::Entity::find()
            .filter(product::Column::Active.eq(true))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| StockFacts {
                id: p.id,
                name: p.name,
                stock_quantity: p.stock_quantity,
            })
            .collect();

        let customers = profile::Entity::find()
            .filter(profile::Column::Role.eq(profile::ROLE_CUSTOMER))
            .count(&*self.db)
            .await?;

        info!(orders = facts.len(), products = products.len(), customers, "building dashboard");
        Ok(build_dashboard(now, &facts, &products, customers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn line(category: Option<&str>, name: &str, quantity: i32, price: Decimal) -> LineFacts {
        LineFacts {
            product_id: Some(Uuid::from_u128(
                name.bytes()
                    .fold(7u128, |acc, b| acc.wrapping_mul(31).wrapping_add(u128::from(b))),
            )),
            product_name: Some(name.to_string()),
            category: category.map(str::to_owned),
            quantity,
            price,
        }
    }

    fn order(user: Uuid, status: &str, when: DateTime<Utc>, lines: Vec<LineFacts>) -> OrderFacts {
        OrderFacts {
            user_id: user,
            total_amount: lines.iter().map(LineFacts::revenue).sum(),
            payment_status: status.to_string(),
            created_at: when,
            lines,
        }
    }

    #[test]
    fn month_arithmetic_wraps_years() {
        assert_eq!(shift_month(2024, 2, -3), (2023, 11));
        assert_eq!(shift_month(2024, 12, 1), (2025, 1));
        assert_eq!(shift_month(2024, 6, -6), (2023, 12));
    }

    #[test]
    fn growth_formatting() {
        assert_eq!(format_growth(dec!(150), dec!(100)), "+50.0%");
        assert_eq!(format_growth(dec!(50), dec!(100)), "-50.0%");
        assert_eq!(format_growth(dec!(100), dec!(0)), "+0%");
        assert_eq!(format_growth(dec!(100), dec!(100)), "+0.0%");
    }

    #[test]
    fn aggregates_paid_orders_only() {
        let now = at(2024, 6, 15);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let orders = vec![
            order(alice, "verified", at(2024, 5, 2), vec![line(Some("Silk Sarees"), "Kanjivaram", 1, dec!(5000))]),
            order(alice, "paid", at(2024, 6, 1), vec![
                line(Some("Cotton Sarees"), "Tant", 2, dec!(800)),
                line(None, "Gift Wrap", 1, dec!(100)),
            ]),
            order(bob, "pending", at(2024, 6, 3), vec![line(Some("Silk Sarees"), "Kanjivaram", 1, dec!(5000))]),
            order(bob, "verified", at(2024, 1, 10), vec![line(Some("Silk Sarees"), "Patola", 1, dec!(2000))]),
        ];

        let dash = build_dashboard(now, &orders, &[], 4);

        assert_eq!(dash.total_revenue, dec!(8700));
        assert_eq!(dash.total_orders, 4);
        // recent window starts 2024-03-01: 5000 + 1700 vs 2000 before
        assert_eq!(dash.revenue_growth, "+235.0%");
        assert_eq!(dash.retention_rate, "100.0%");
        assert_eq!(dash.conversion_rate, "50.0%");

        let months: Vec<&str> = dash.sales_trend.iter().map(|p| p.month.as_str()).collect();
        assert_eq!(months, vec!["Jan", "Feb", "Mar", "Apr", "May", "Jun"]);
        assert_eq!(dash.sales_trend[5].sales, dec!(1700));
        assert_eq!(dash.sales_trend[0].orders, 1);

        assert_eq!(dash.category_performance[0].name, "Silk Sarees");
        assert_eq!(dash.category_performance[0].revenue, dec!(7000));
        assert_eq!(dash.category_performance[0].orders, 2);
        let uncategorized = dash
            .category_performance
            .iter()
            .find(|c| c.name == UNCATEGORIZED)
            .unwrap();
        assert_eq!(uncategorized.orders, 0);
        assert_eq!(uncategorized.color, DEFAULT_CATEGORY_COLOR);

        assert_eq!(dash.top_products[0].name, "Kanjivaram");
        assert_eq!(dash.top_products[0].sales, 1);
    }

    #[test]
    fn trend_ignores_same_month_of_previous_year() {
        let now = at(2024, 6, 15);
        let user = Uuid::new_v4();
        let orders = vec![order(user, "verified", at(2023, 6, 10), vec![line(None, "Old", 1, dec!(900))])];
        let dash = build_dashboard(now, &orders, &[], 0);
        assert!(dash.sales_trend.iter().all(|p| p.orders == 0));
        assert_eq!(dash.conversion_rate, "100.0%");
    }

    #[test]
    fn inventory_alerts_are_lowest_stock_first() {
        let products: Vec<StockFacts> = [Some(20), Some(3), None, Some(12), Some(0), Some(7), Some(40)]
            .into_iter()
            .enumerate()
            .map(|(i, stock)| StockFacts {
                id: Uuid::new_v4(),
                name: format!("Saree {i}"),
                stock_quantity: stock,
            })
            .collect();
        let dash = build_dashboard(at(2024, 6, 1), &[], &products, 0);
        let stocks: Vec<(i32, &str)> = dash.inventory_alerts.iter().map(|a| (a.stock, a.status)).collect();
        assert_eq!(
            stocks,
            vec![(0, "low"), (3, "low"), (7, "medium"), (12, "medium"), (20, "good")]
        );
        assert_eq!(dash.retention_rate, "0%");
    }
}
