//! In-memory paper trading balances

use super::Side;
use crate::feed::Tick;
use crate::risk::TradeError;
use crate::telemetry::{set_gauge, GaugeMetric};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

/// Default quote currency
pub const DEFAULT_QUOTE_CURRENCY: &str = "USD";

/// Currency balances mutated by simulated trades
///
/// Every trade runs under a single lock, so concurrent buys cannot both pass
/// the funds check.
#[derive(Debug)]
pub struct LocalLedger {
    quote_currency: String,
    fee_rate: Decimal,
    balances: Mutex<HashMap<String, Decimal>>,
}

impl LocalLedger {
    pub fn new(quote_currency: impl Into<String>, fee_rate: Decimal) -> Self {
        Self {
            quote_currency: quote_currency.into(),
            fee_rate,
            balances: Mutex::new(HashMap::new()),
        }
    }

    /// Start with `amount` of `currency`
    pub fn with_balance(self, currency: &str, amount: Decimal) -> Self {
        self.credit(currency, amount);
        self
    }

    pub fn quote_currency(&self) -> &str {
        &self.quote_currency
    }

    /// Simulated fee rate charged on every trade
    pub fn fee_rate(&self) -> Decimal {
        self.fee_rate
    }

    pub fn credit(&self, currency: &str, amount: Decimal) {
        let mut balances = self.lock();
        *balances.entry(currency.to_string()).or_default() += amount;
        self.report(&balances);
    }

    pub fn debit(&self, currency: &str, amount: Decimal) {
        let mut balances = self.lock();
        *balances.entry(currency.to_string()).or_default() -= amount;
        self.report(&balances);
    }

    /// Balance of `currency`, zero if never touched
    pub fn balance(&self, currency: &str) -> Decimal {
        self.lock().get(currency).copied().unwrap_or_default()
    }

    /// Snapshot of every balance, sorted by currency
    pub fn balances(&self) -> BTreeMap<String, Decimal> {
        self.lock()
            .iter()
            .map(|(currency, balance)| (currency.clone(), *balance))
            .collect()
    }

    /// Simulate a trade of `amount` units of `currency` at the tick's price
    pub fn apply_trade(
        &self,
        side: Side,
        currency: &str,
        amount: Decimal,
        tick: &Tick,
    ) -> Result<(), TradeError> {
        self.apply_trade_at(side, currency, amount, tick.price)
    }

    /// Simulate a trade at an explicit price
    ///
    /// A sell credits the quote currency with `price * amount * (1 - fee)`.
    /// A buy costs `(fee * amount + amount) * price` and fails with
    /// [`TradeError::InsufficientFunds`], leaving every balance untouched,
    /// when the quote balance cannot cover it.
    pub fn apply_trade_at(
        &self,
        side: Side,
        currency: &str,
        amount: Decimal,
        price: Decimal,
    ) -> Result<(), TradeError> {
        let mut balances = self.lock();
        let quote = balances
            .get(&self.quote_currency)
            .copied()
            .unwrap_or_default();

        match side {
            Side::Sell => {
                let proceeds = price * amount * (Decimal::ONE - self.fee_rate);
                balances.insert(self.quote_currency.clone(), quote + proceeds);
                *balances.entry(currency.to_string()).or_default() -= amount;
            }
            Side::Buy => {
                let cost = (self.fee_rate * amount + amount) * price;
                if quote - cost < Decimal::ZERO {
                    tracing::warn!(
                        currency = %self.quote_currency,
                        needed = %cost,
                        available = %quote,
                        "Simulated buy rejected"
                    );
                    return Err(TradeError::InsufficientFunds {
                        currency: self.quote_currency.clone(),
                        needed: cost,
                        available: quote,
                    });
                }
                balances.insert(self.quote_currency.clone(), quote - cost);
                *balances.entry(currency.to_string()).or_default() += amount;
            }
        }

        tracing::debug!(%side, %currency, %amount, %price, "Simulated trade applied");
        self.report(&balances);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Decimal>> {
        // Updates never leave the map half-written, so a poisoned lock is safe to reuse
        self.balances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn report(&self, balances: &HashMap<String, Decimal>) {
        if let Some(quote) = balances.get(&self.quote_currency) {
            set_gauge(GaugeMetric::QuoteBalance, quote.to_f64().unwrap_or_default());
        }
    }
}

impl Default for LocalLedger {
    fn default() -> Self {
        Self::new(DEFAULT_QUOTE_CURRENCY, Decimal::new(5, 3))
    }
}
