//! Synthetic sample rows rendered as SQL value tuples.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

const FIRST_NAMES: &[&str] = &[
    "John", "Jane", "Michael", "Emily", "David", "Sarah", "James", "Emma", "Robert", "Olivia",
    "William", "Sophia", "Joseph", "Isabella", "Thomas", "Mia", "Charles", "Charlotte", "Daniel",
    "Amelia", "Taro", "Hanako", "Yuki", "Kenji", "Sakura", "Takeshi", "Yui", "Hiroshi", "Aoi",
    "Ren",
];

const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Rodriguez",
    "Martinez", "Hernandez", "Lopez", "Gonzalez", "Wilson", "Anderson", "Tanaka", "Yamada",
    "Sato", "Suzuki", "Takahashi", "Watanabe", "Ito", "Nakamura", "Kobayashi", "Kato",
];

const CITIES: &[&str] = &[
    "Tokyo", "Osaka", "New York", "London", "Paris", "Berlin", "Sydney", "Singapore",
    "Hong Kong", "Seoul", "Bangkok", "Mumbai", "Dubai", "Los Angeles", "Chicago", "Toronto",
    "Vancouver", "Amsterdam",
];

const COUNTRIES: &[&str] = &[
    "Japan", "USA", "UK", "Germany", "France", "Australia", "Canada", "Singapore", "China",
    "South Korea", "Thailand", "India", "UAE",
];

const CATEGORIES: &[&str] = &[
    "Electronics", "Clothing", "Home & Garden", "Sports", "Books", "Toys", "Food", "Beauty",
    "Automotive", "Health",
];

const BRANDS: &[&str] = &[
    "TechCorp", "FashionBrand", "HomeStyle", "SportMax", "BookWorld", "ToyLand", "FoodCo",
    "BeautyPlus", "AutoParts", "HealthFirst",
];

const PAYMENT_METHODS: &[&str] = &["CREDIT_CARD", "DEBIT_CARD", "PAYPAL", "BANK_TRANSFER", "CASH"];

// Repeated entries weight the draw.
const CUSTOMER_STATUSES: &[&str] = &["ACTIVE", "ACTIVE", "ACTIVE", "INACTIVE", "SUSPENDED"];

const ORDER_STATUSES: &[&str] = &[
    "PENDING", "CONFIRMED", "SHIPPED", "DELIVERED", "DELIVERED", "DELIVERED", "CANCELLED",
    "REFUNDED",
];

/// Renders one `sample_customers` tuple.
pub fn customer(rng: &mut StdRng, id: u64) -> String {
    let first = pick(rng, FIRST_NAMES);
    let last = pick(rng, LAST_NAMES);
    let email = format!(
        "{}.{}{id}@example.com",
        first.to_lowercase(),
        last.to_lowercase()
    );
    let phone = format!(
        "+1-{:03}-{:03}-{:04}",
        rng.gen_range(100..=999),
        rng.gen_range(100..=999),
        rng.gen_range(1000..=9999)
    );

    format!(
        "({id}, {}, {}, {}, {}, {}, {}, {}, {})",
        quote(first),
        quote(last),
        quote(&email),
        quote(&phone),
        quote(pick(rng, CITIES)),
        quote(pick(rng, COUNTRIES)),
        quote(&date(rng, 2018, 2024)),
        quote(pick(rng, CUSTOMER_STATUSES)),
    )
}

/// Renders one `sample_products` tuple.
pub fn product(rng: &mut StdRng, id: u64) -> String {
    let category = pick(rng, CATEGORIES);
    let brand = pick(rng, BRANDS);
    let price_cents: u64 = rng.gen_range(100..=100_000);
    let cost_cents = price_cents * 6 / 10;
    let is_active = rng.gen_bool(0.9);

    format!(
        "({id}, {}, {}, {}, {}, {}, {}, {}, {})",
        quote(&format!("{brand} {category} Product {id}")),
        quote(category),
        quote(brand),
        money(price_cents),
        money(cost_cents),
        rng.gen_range(0..=10_000),
        quote(&format!("SKU-{id:08}")),
        u8::from(is_active),
    )
}

/// Renders one `sample_orders` tuple.
pub fn order(rng: &mut StdRng, id: u64, customer_count: u64) -> String {
    let customer_id = rng.gen_range(1..=customer_count);
    let total_cents: u64 = rng.gen_range(1_000..=500_000);

    format!(
        "({id}, {customer_id}, {}, {}, {}, {})",
        quote(&date(rng, 2020, 2024)),
        quote(pick(rng, ORDER_STATUSES)),
        money(total_cents),
        quote(pick(rng, PAYMENT_METHODS)),
    )
}

/// Renders one `sample_order_items` tuple.
pub fn order_item(rng: &mut StdRng, id: u64, order_id: u64, product_count: u64) -> String {
    let product_id = rng.gen_range(1..=product_count);
    let quantity: u64 = rng.gen_range(1..=5);
    let unit_cents: u64 = rng.gen_range(100..=50_000);
    let discount_percent: u64 = rng.gen_range(0..=20);
    let subtotal_cents = unit_cents * quantity * (100 - discount_percent) / 100;

    format!(
        "({id}, {order_id}, {product_id}, {quantity}, {}, {discount_percent}, {})",
        money(unit_cents),
        money(subtotal_cents),
    )
}

/// Number of items to generate for one order, averaging `items_per_order`.
pub fn item_count(rng: &mut StdRng, items_per_order: u32) -> u64 {
    rng.gen_range(1..=u64::from(items_per_order) * 2)
}

fn pick<'a>(rng: &mut StdRng, values: &[&'a str]) -> &'a str {
    values.choose(rng).copied().unwrap_or_default()
}

/// ISO date with a day that exists in every month.
fn date(rng: &mut StdRng, first_year: u32, last_year: u32) -> String {
    format!(
        "{}-{:02}-{:02}",
        rng.gen_range(first_year..=last_year),
        rng.gen_range(1..=12),
        rng.gen_range(1..=28)
    )
}

fn money(cents: u64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_same_seed_same_rows() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        assert_eq!(customer(&mut a, 1), customer(&mut b, 1));
        assert_eq!(order(&mut a, 1, 10), order(&mut b, 1, 10));
    }

    #[test]
    fn test_customer_tuple_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        let row = customer(&mut rng, 42);
        assert!(row.starts_with("(42, '"));
        assert!(row.contains("42@example.com'"));
        assert!(row.ends_with("')"));
    }

    #[test]
    fn test_references_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        for id in 1..=200 {
            let row = order(&mut rng, id, 3);
            let customer_id: u64 = row.split(", ").nth(1).unwrap().parse().unwrap();
            assert!((1..=3).contains(&customer_id));
        }
        for _ in 0..200 {
            let n = item_count(&mut rng, 2);
            assert!((1..=4).contains(&n));
        }
    }

    #[test]
    fn test_money_and_quote() {
        assert_eq!(money(5), "0.05");
        assert_eq!(money(12_345), "123.45");
        assert_eq!(quote("O'Brien"), "'O''Brien'");
    }
}
