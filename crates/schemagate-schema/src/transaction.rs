//! Payment transaction record published by the demo producers.

use crate::shape::{DeclaredType, RecordShape, ShapeDescriptor};
use serde::{Deserialize, Serialize};

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    SAR,
    USD,
    EUR,
    GBP,
    AED,
}

impl Currency {
    pub const ALL: [Currency; 5] = [
        Currency::SAR,
        Currency::USD,
        Currency::EUR,
        Currency::GBP,
        Currency::AED,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::SAR => "SAR",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::AED => "AED",
        }
    }
}

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Country {
    SA,
    AE,
    US,
    GB,
    EG,
}

impl Country {
    pub const ALL: [Country; 5] = [Country::SA, Country::AE, Country::US, Country::GB, Country::EG];

    pub fn as_str(&self) -> &'static str {
        match self {
            Country::SA => "SA",
            Country::AE => "AE",
            Country::US => "US",
            Country::GB => "GB",
            Country::EG => "EG",
        }
    }
}

/// A card payment. All fields are required; values are fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    transaction_id: String,
    account_id: String,
    amount: f64,
    currency: Currency,
    merchant: String,
    country: Country,
    /// Epoch milliseconds
    timestamp: i64,
}

impl Transaction {
    pub fn new(
        transaction_id: impl Into<String>,
        account_id: impl Into<String>,
        amount: f64,
        currency: Currency,
        merchant: impl Into<String>,
        country: Country,
        timestamp: i64,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            account_id: account_id.into(),
            amount,
            currency,
            merchant: merchant.into(),
            country,
            timestamp,
        }
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn merchant(&self) -> &str {
        &self.merchant
    }

    pub fn country(&self) -> Country {
        self.country
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

impl RecordShape for Transaction {
    fn shape() -> ShapeDescriptor {
        let currencies = Currency::ALL.iter().map(|c| c.as_str().to_string()).collect();
        let countries = Country::ALL.iter().map(|c| c.as_str().to_string()).collect();

        ShapeDescriptor::new("Transaction")
            .field("transactionId", DeclaredType::Text)
            .field("accountId", DeclaredType::Text)
            .field("amount", DeclaredType::Float)
            .field("currency", DeclaredType::Enumeration(currencies))
            .field("merchant", DeclaredType::Text)
            .field("country", DeclaredType::Enumeration(countries))
            .field("timestamp", DeclaredType::Integer)
    }
}
