use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct User {
    pub id: u64,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Product {
    pub id: u64,
    pub name: String,
    pub price: f64,
}

/// Lookup tables the scenario draws users and products from. A table missing from the
/// config keeps its built-in contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Fixtures {
    pub users: Vec<User>,
    pub products: Vec<Product>,
}

impl Default for Fixtures {
    fn default() -> Self {
        let user = |id: u64, username: &str| User {
            id,
            username: username.to_string(),
            email: format!("{username}@example.com"),
        };
        let product = |id: u64, name: &str, price: f64| Product {
            id,
            name: name.to_string(),
            price,
        };

        Self {
            users: vec![user(1, "john.doe"), user(2, "jane.smith"), user(3, "admin")],
            products: vec![
                product(1, "Laptop Pro", 1299.99),
                product(2, "Wireless Mouse", 29.99),
                product(3, "USB Cable", 9.99),
                product(4, "Monitor 24\"", 199.99),
            ],
        }
    }
}

impl Fixtures {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.users.is_empty() {
            anyhow::bail!("fixtures.users must not be empty");
        }
        if self.products.is_empty() {
            anyhow::bail!("fixtures.products must not be empty");
        }
        Ok(())
    }
}
