#![allow(dead_code)]

use repokit_core::{
    open_session_in_memory, BaseFields, Entity, EntitySchema, Inclusion, Migration, OrderBy,
    Predicate, Relation, RepoResult, Session,
};
use rusqlite::types::Value;
use rusqlite::Row;

pub const MIGRATIONS: &[Migration] = &[
    Migration::new(
        1,
        "CREATE TABLE customers (
            id INTEGER PRIMARY KEY,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            name TEXT NOT NULL,
            credit INTEGER NOT NULL DEFAULT 0,
            email TEXT
        );
        CREATE TABLE orders (
            id INTEGER PRIMARY KEY,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            customer_id INTEGER NOT NULL REFERENCES customers(id),
            total INTEGER NOT NULL
        );
        CREATE TABLE order_lines (
            id INTEGER PRIMARY KEY,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            order_id INTEGER NOT NULL REFERENCES orders(id),
            sku TEXT NOT NULL,
            quantity INTEGER NOT NULL
        );",
    ),
    Migration::new(
        2,
        "CREATE TABLE tags (
            id TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            label TEXT NOT NULL
        );",
    ),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub base: BaseFields<i64>,
    pub name: String,
    pub credit: i64,
    pub email: Option<String>,
    pub orders: Vec<Order>,
}

impl Customer {
    pub fn new(id: i64, name: &str, credit: i64) -> Self {
        Self {
            base: BaseFields::new(id),
            name: name.to_string(),
            credit,
            email: None,
            orders: Vec::new(),
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }
}

impl Entity for Customer {
    type Key = i64;

    fn base(&self) -> &BaseFields<i64> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseFields<i64> {
        &mut self.base
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            base: BaseFields::from_row(row)?,
            name: row.get("name")?,
            credit: row.get("credit")?,
            email: row.get("email")?,
            orders: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub base: BaseFields<i64>,
    pub customer_id: i64,
    pub total: i64,
    pub lines: Vec<OrderLine>,
}

impl Order {
    pub fn new(id: i64, customer_id: i64, total: i64) -> Self {
        Self {
            base: BaseFields::new(id),
            customer_id,
            total,
            lines: Vec::new(),
        }
    }
}

impl Entity for Order {
    type Key = i64;

    fn base(&self) -> &BaseFields<i64> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseFields<i64> {
        &mut self.base
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            base: BaseFields::from_row(row)?,
            customer_id: row.get("customer_id")?,
            total: row.get("total")?,
            lines: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderLine {
    pub base: BaseFields<i64>,
    pub order_id: i64,
    pub sku: String,
    pub quantity: i64,
}

impl OrderLine {
    pub fn new(id: i64, order_id: i64, sku: &str, quantity: i64) -> Self {
        Self {
            base: BaseFields::new(id),
            order_id,
            sku: sku.to_string(),
            quantity,
        }
    }
}

impl Entity for OrderLine {
    type Key = i64;

    fn base(&self) -> &BaseFields<i64> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseFields<i64> {
        &mut self.base
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            base: BaseFields::from_row(row)?,
            order_id: row.get("order_id")?,
            sku: row.get("sku")?,
            quantity: row.get("quantity")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub base: BaseFields<String>,
    pub label: String,
}

impl Tag {
    pub fn new(label: &str) -> Self {
        Self {
            base: BaseFields::new(repokit_core::new_string_key()),
            label: label.to_string(),
        }
    }
}

impl Entity for Tag {
    type Key = String;

    fn base(&self) -> &BaseFields<String> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseFields<String> {
        &mut self.base
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            base: BaseFields::from_row(row)?,
            label: row.get("label")?,
        })
    }
}

pub const CUSTOMER_ORDERS: Relation<Customer> = Relation::new("orders", load_customer_orders);
pub const ORDER_LINES: Relation<Order> = Relation::new("lines", load_order_lines);

fn load_customer_orders(
    session: &Session,
    customers: &mut [Customer],
    nested: Option<&str>,
) -> RepoResult<()> {
    let ids: Vec<i64> = customers.iter().map(|customer| customer.base.id).collect();
    let mut inclusion = Inclusion::new();
    if let Some(path) = nested {
        inclusion = inclusion.include_path(path);
    }
    let orders = session
        .query::<Order>()?
        .filter(Predicate::is_in("customer_id", ids))
        .include(&inclusion)
        .order_by(OrderBy::parse("id asc")?)
        .to_list()?;
    for customer in customers.iter_mut() {
        customer.orders = orders
            .iter()
            .filter(|order| order.customer_id == customer.base.id)
            .cloned()
            .collect();
    }
    Ok(())
}

fn load_order_lines(session: &Session, orders: &mut [Order], _nested: Option<&str>) -> RepoResult<()> {
    let ids: Vec<i64> = orders.iter().map(|order| order.base.id).collect();
    let lines = session
        .query::<OrderLine>()?
        .filter(Predicate::is_in("order_id", ids))
        .order_by(OrderBy::parse("id asc")?)
        .to_list()?;
    for order in orders.iter_mut() {
        order.lines = lines
            .iter()
            .filter(|line| line.order_id == order.base.id)
            .cloned()
            .collect();
    }
    Ok(())
}

pub fn customer_schema() -> EntitySchema<Customer> {
    EntitySchema::<Customer>::builder("customers")
        .field("name", |customer| Value::Text(customer.name.clone()))
        .field("credit", |customer| Value::Integer(customer.credit))
        .field("email", |customer| Value::from(customer.email.clone()))
        .relation(CUSTOMER_ORDERS)
        .build()
        .unwrap()
}

pub fn order_schema() -> EntitySchema<Order> {
    EntitySchema::<Order>::builder("orders")
        .field("customer_id", |order| Value::Integer(order.customer_id))
        .field("total", |order| Value::Integer(order.total))
        .relation(ORDER_LINES)
        .build()
        .unwrap()
}

pub fn order_line_schema() -> EntitySchema<OrderLine> {
    EntitySchema::<OrderLine>::builder("order_lines")
        .field("order_id", |line| Value::Integer(line.order_id))
        .field("sku", |line| Value::Text(line.sku.clone()))
        .field("quantity", |line| Value::Integer(line.quantity))
        .build()
        .unwrap()
}

pub fn tag_schema() -> EntitySchema<Tag> {
    EntitySchema::<Tag>::builder("tags")
        .field("label", |tag| Value::Text(tag.label.clone()))
        .build()
        .unwrap()
}

pub fn register_all(session: &mut Session) {
    session.register(customer_schema()).unwrap();
    session.register(order_schema()).unwrap();
    session.register(order_line_schema()).unwrap();
    session.register(tag_schema()).unwrap();
}

/// In-memory session with every fixture schema registered.
pub fn open_test_session() -> Session {
    let mut session = open_session_in_memory(MIGRATIONS).unwrap();
    register_all(&mut session);
    session
}

/// Customers 1..=5 with credits 100, 300, 200, 500, 400; Bea has an email.
pub fn seed_customers(session: &Session) {
    use repokit_core::{Repository, SqliteRepository};

    let repo = SqliteRepository::<Customer>::try_new(session).unwrap();
    repo.add_range(
        vec![
            Customer::new(1, "Ada", 100),
            Customer::new(2, "Bea", 300).with_email("bea@example.com"),
            Customer::new(3, "Cy", 200),
            Customer::new(4, "Dee", 500),
            Customer::new(5, "Eli", 400),
        ],
        true,
    )
    .unwrap();
}

/// Orders 10, 11 for customer 1 and 12 for customer 2; lines on order 10.
pub fn seed_orders(session: &Session) {
    use repokit_core::{Repository, SqliteRepository};

    let orders = SqliteRepository::<Order>::try_new(session).unwrap();
    orders
        .add_range(
            vec![Order::new(10, 1, 50), Order::new(11, 1, 70), Order::new(12, 2, 20)],
            false,
        )
        .unwrap();
    let lines = SqliteRepository::<OrderLine>::try_new(session).unwrap();
    lines
        .add_range(
            vec![
                OrderLine::new(100, 10, "apple", 2),
                OrderLine::new(101, 10, "pear", 1),
            ],
            false,
        )
        .unwrap();
    session.save().unwrap();
}

pub fn ids(customers: &[Customer]) -> Vec<i64> {
    customers.iter().map(|customer| customer.base.id).collect()
}
