//! Product catalog, branch directory and bank profile
//!
//! Loaded once at startup from an optional YAML file and shared read-only.
//! Built-in defaults keep the assistant usable without a catalog file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ConfigError;

/// Everything domain-specific the assistant needs besides settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainCatalog {
    #[serde(default)]
    pub bank: BankProfile,
    #[serde(default = "default_products")]
    pub products: Vec<Product>,
    #[serde(default)]
    pub branches: BranchDirectory,
}

impl Default for DomainCatalog {
    fn default() -> Self {
        Self {
            bank: BankProfile::default(),
            products: default_products(),
            branches: BranchDirectory::default(),
        }
    }
}

impl DomainCatalog {
    /// Load from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        let catalog: Self =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load from `path` if given, otherwise use built-in defaults
    pub fn load_or_default(path: Option<&str>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                let catalog = Self::load(p)?;
                tracing::info!(
                    path = %p,
                    products = catalog.products.len(),
                    locations = catalog.branches.locations.len(),
                    "Loaded domain catalog"
                );
                Ok(catalog)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.products.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "products".to_string(),
                message: "Catalog must list at least one product".to_string(),
            });
        }
        if self.branches.lookup_phrase.trim().is_empty() {
            return Err(ConfigError::MissingField("branches.lookup_phrase".to_string()));
        }
        Ok(())
    }

    pub fn product(&self, id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    /// Products whose keywords appear in `text`, best match first
    pub fn match_products(&self, text: &str) -> Vec<&Product> {
        let lowered = text.to_lowercase();
        let mut scored: Vec<(usize, &Product)> = self
            .products
            .iter()
            .map(|p| {
                let hits = p
                    .keywords
                    .iter()
                    .filter(|k| lowered.contains(&k.to_lowercase()))
                    .count();
                (hits, p)
            })
            .filter(|(hits, _)| *hits > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().map(|(_, p)| p).collect()
    }
}

/// Names used in prompts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankProfile {
    pub bank_name: String,
    pub assistant_name: String,
}

impl Default for BankProfile {
    fn default() -> Self {
        Self {
            bank_name: "Horizon Bank".to_string(),
            assistant_name: "Ava".to_string(),
        }
    }
}

/// Recommendable banking product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

fn product(id: &str, name: &str, description: &str, keywords: &[&str]) -> Product {
    Product {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
    }
}

fn default_products() -> Vec<Product> {
    vec![
        product(
            "premium-checking",
            "Premium Checking",
            "Checking account with no monthly fee and ATM fee refunds",
            &["checking", "salary", "debit", "atm"],
        ),
        product(
            "high-yield-savings",
            "High-Yield Savings",
            "Savings account with tiered interest and no minimum balance",
            &["savings", "save", "interest", "emergency fund"],
        ),
        product(
            "home-mortgage",
            "Home Mortgage",
            "Fixed and adjustable rate mortgages with pre-approval in 48 hours",
            &["mortgage", "home", "house", "property", "refinance"],
        ),
        product(
            "personal-loan",
            "Personal Loan",
            "Unsecured personal loans for consolidation or large purchases",
            &["loan", "debt", "consolidat", "borrow"],
        ),
        product(
            "wealth-advisory",
            "Wealth Advisory",
            "Investment planning with a dedicated advisor",
            &["invest", "retirement", "wealth", "portfolio", "401k"],
        ),
        product(
            "rewards-credit-card",
            "Rewards Credit Card",
            "Cash-back credit card with travel benefits",
            &["credit card", "rewards", "travel", "cash back"],
        ),
    ]
}

/// Branch locations and the canned answer for branch lookups
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchDirectory {
    /// Case-insensitive phrase that triggers the canned response
    pub lookup_phrase: String,
    pub response: String,
    #[serde(default)]
    pub locations: Vec<BranchLocation>,
}

impl Default for BranchDirectory {
    fn default() -> Self {
        Self {
            lookup_phrase: "nearest branch".to_string(),
            response: "Our nearest branches are Downtown (100 Main Street, open 9 AM to 5 PM) \
                       and Riverside (45 River Road, open 9 AM to 6 PM). Would you like to \
                       book an appointment at one of them?"
                .to_string(),
            locations: vec![
                BranchLocation {
                    name: "Downtown".to_string(),
                    address: "100 Main Street".to_string(),
                    hours: "9 AM - 5 PM".to_string(),
                },
                BranchLocation {
                    name: "Riverside".to_string(),
                    address: "45 River Road".to_string(),
                    hours: "9 AM - 6 PM".to_string(),
                },
                BranchLocation {
                    name: "Northgate".to_string(),
                    address: "12 Northgate Plaza".to_string(),
                    hours: "10 AM - 4 PM".to_string(),
                },
            ],
        }
    }
}

impl BranchDirectory {
    pub fn matches_lookup(&self, query: &str) -> bool {
        let phrase = self.lookup_phrase.trim().to_lowercase();
        !phrase.is_empty() && query.to_lowercase().contains(&phrase)
    }

    pub fn location_names(&self) -> Vec<&str> {
        self.locations.iter().map(|l| l.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchLocation {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub hours: String,
}
