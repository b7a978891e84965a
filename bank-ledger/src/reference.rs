//! Unique reference generation
//!
//! Produces 10-digit account numbers, 16-digit card numbers and transaction
//! references. Contract: draw a candidate, check uniqueness against the
//! store, retry on collision. The retry loop is bounded so a broken
//! randomness source surfaces as an error instead of spinning forever;
//! within the bound, collisions are birthday-bound negligible.

use crate::{
    config::ReferenceConfig,
    error::{Error, Result},
    storage::Storage,
    types::{AccountNumber, CardNumber},
};
use rand::Rng;

/// Card numbers lead with a fixed digit (Visa-style)
const CARD_NUMBER_LEAD: char = '4';

/// Uppercase alphanumerics for transaction reference suffixes
const REFERENCE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Reference suffix length
const REFERENCE_SUFFIX_LEN: usize = 12;

/// Generator for collision-free account numbers, card numbers and
/// transaction references
#[derive(Debug, Clone)]
pub struct ReferenceGenerator {
    transaction_prefix: String,
    max_attempts: u32,
}

impl ReferenceGenerator {
    /// Create a generator from configuration
    pub fn new(config: &ReferenceConfig) -> Self {
        Self {
            transaction_prefix: config.transaction_prefix.clone(),
            max_attempts: config.max_attempts,
        }
    }

    /// Draw a unique 10-digit account number
    pub fn account_number(&self, storage: &Storage) -> Result<AccountNumber> {
        for _ in 0..self.max_attempts {
            let candidate = AccountNumber::new(random_digits(10));
            if !storage.account_number_exists(&candidate)? {
                return Ok(candidate);
            }
        }
        Err(Error::ReferenceExhausted(self.max_attempts))
    }

    /// Draw a unique 16-digit card number (fixed leading digit)
    pub fn card_number(&self, storage: &Storage) -> Result<CardNumber> {
        for _ in 0..self.max_attempts {
            let mut digits = String::with_capacity(16);
            digits.push(CARD_NUMBER_LEAD);
            digits.push_str(&random_digits(15));

            let candidate = CardNumber::new(digits);
            if !storage.card_number_exists(&candidate)? {
                return Ok(candidate);
            }
        }
        Err(Error::ReferenceExhausted(self.max_attempts))
    }

    /// Draw a unique transaction reference (prefix + 12 alphanumerics)
    pub fn transaction_reference(&self, storage: &Storage) -> Result<String> {
        let mut rng = rand::thread_rng();

        for _ in 0..self.max_attempts {
            let mut candidate =
                String::with_capacity(self.transaction_prefix.len() + REFERENCE_SUFFIX_LEN);
            candidate.push_str(&self.transaction_prefix);
            for _ in 0..REFERENCE_SUFFIX_LEN {
                let idx = rng.gen_range(0..REFERENCE_CHARSET.len());
                candidate.push(REFERENCE_CHARSET[idx] as char);
            }

            if !storage.transaction_reference_exists(&candidate)? {
                return Ok(candidate);
            }
        }
        Err(Error::ReferenceExhausted(self.max_attempts))
    }

    /// Draw a 3-digit verification code (not checked for uniqueness)
    pub fn cvv(&self) -> String {
        random_digits(3)
    }
}

fn random_digits(count: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}
