//! Payment processing: one `PaymentProcessor` per payment type, built by
//! `PaymentProcessorFactory`.
//!
//! Processors simulate a gateway. They never fail for a positive amount;
//! validation happens before a processor is chosen.

use serde::Serialize;

use super::models::PaymentType;
use crate::errors::MarketError;

/// Result of running a processor.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub success: bool,
    pub message: String,
    pub transaction_id: String,
    pub payment_type: PaymentType,
}

pub trait PaymentProcessor: Send + Sync {
    fn kind(&self) -> PaymentType;

    fn process(&self, amount: f64) -> PaymentReceipt;
}

/// `<PREFIX>-<unix millis>-<9 lowercase alphanumerics>`
fn transaction_id(prefix: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let entropy = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", prefix, millis, &entropy[..9])
}

fn receipt(kind: PaymentType, prefix: &str, message: String) -> PaymentReceipt {
    PaymentReceipt {
        success: true,
        message,
        transaction_id: transaction_id(prefix),
        payment_type: kind,
    }
}

pub struct CreditCardProcessor;

impl PaymentProcessor for CreditCardProcessor {
    fn kind(&self) -> PaymentType {
        PaymentType::CreditCard
    }

    fn process(&self, amount: f64) -> PaymentReceipt {
        receipt(
            self.kind(),
            "CC",
            format!("Credit Card payment of ${} processed successfully", amount),
        )
    }
}

pub struct PayPalProcessor;

impl PaymentProcessor for PayPalProcessor {
    fn kind(&self) -> PaymentType {
        PaymentType::PayPal
    }

    fn process(&self, amount: f64) -> PaymentReceipt {
        receipt(
            self.kind(),
            "PP",
            format!("PayPal payment of ${} processed successfully", amount),
        )
    }
}

pub struct BankTransferProcessor;

impl PaymentProcessor for BankTransferProcessor {
    fn kind(&self) -> PaymentType {
        PaymentType::BankTransfer
    }

    fn process(&self, amount: f64) -> PaymentReceipt {
        receipt(
            self.kind(),
            "BT",
            format!("Bank Transfer of ${} initiated successfully", amount),
        )
    }
}

pub struct CryptoProcessor;

impl PaymentProcessor for CryptoProcessor {
    fn kind(&self) -> PaymentType {
        PaymentType::Crypto
    }

    fn process(&self, amount: f64) -> PaymentReceipt {
        receipt(
            self.kind(),
            "CRYPTO",
            format!("Cryptocurrency payment of ${} processed successfully", amount),
        )
    }
}

pub struct PaymentProcessorFactory;

impl PaymentProcessorFactory {
    pub fn create(kind: PaymentType) -> Box<dyn PaymentProcessor> {
        match kind {
            PaymentType::CreditCard => Box::new(CreditCardProcessor),
            PaymentType::PayPal => Box::new(PayPalProcessor),
            PaymentType::BankTransfer => Box::new(BankTransferProcessor),
            PaymentType::Crypto => Box::new(CryptoProcessor),
        }
    }

    /// Case-insensitive lookup by wire name (`"creditcard"`, `"PayPal"`, ...).
    pub fn from_name(name: &str) -> Result<Box<dyn PaymentProcessor>, MarketError> {
        let kind: PaymentType = name.parse()?;
        Ok(Self::create(kind))
    }
}
