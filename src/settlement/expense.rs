use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use super::money::Money;
use crate::config::SettlementConfig;
use crate::error::{RResult, RideTrackerError};

/// Group member; paid/owed aggregates live in `MemberBalance`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl Member {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
        }
    }
}

/// How an expense is divided among its participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SplitRule {
    Equal,
    /// Percent per participant, must total 100
    Percentage { shares: BTreeMap<String, f64> },
    /// Amount per participant, must total the expense amount
    Exact { amounts: BTreeMap<String, Money> },
    /// The payer carries the whole amount
    SinglePayer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: String,
    pub payer: String,
    pub amount: Money,
    pub split: SplitRule,
    /// Order matters: rounding remainders go to the first participant
    pub participants: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// Persisted expense ledger: the roster plus every shared expense
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    pub members: Vec<Member>,
    #[serde(default)]
    pub expenses: Vec<Expense>,
}

impl Ledger {
    pub fn from_json_file(path: impl AsRef<Path>) -> RResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Per-participant owed amounts, in participant order
pub type OwedShares = Vec<(String, Money)>;

impl Expense {
    pub fn new(id: &str, payer: &str, amount: Money, split: SplitRule, participants: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            payer: payer.to_string(),
            amount,
            split,
            participants: participants.iter().map(|p| p.to_string()).collect(),
            description: String::new(),
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> RideTrackerError {
        RideTrackerError::InvalidExpense {
            id: self.id.clone(),
            reason: reason.into(),
        }
    }

    /// Compute what each participant owes for this expense.
    ///
    /// The payer's own share is zeroed except for `SinglePayer`, where the
    /// payer owes the whole amount and nobody else is involved.
    pub fn owed_shares(&self, config: &SettlementConfig) -> RResult<OwedShares> {
        if !self.amount.is_positive() {
            return Err(self.invalid(format!("amount {} must be positive", self.amount)));
        }

        if self.split == SplitRule::SinglePayer {
            return Ok(vec![(self.payer.clone(), self.amount)]);
        }

        if self.participants.is_empty() {
            return Err(self.invalid("no participants"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.participants.iter().find(|p| !seen.insert(p.as_str())) {
            return Err(self.invalid(format!("participant {} listed twice", dup)));
        }

        let mut shares = match &self.split {
            SplitRule::Equal => self.equal_shares(),
            SplitRule::Percentage { shares } => self.percentage_shares(shares, config)?,
            SplitRule::Exact { amounts } => self.exact_shares(amounts, config)?,
            SplitRule::SinglePayer => return Ok(vec![(self.payer.clone(), self.amount)]),
        };

        for (participant, share) in shares.iter_mut() {
            if *participant == self.payer {
                *share = Money::ZERO;
            }
        }
        Ok(shares)
    }

    fn equal_shares(&self) -> OwedShares {
        let n = self.participants.len() as i64;
        let base = self.amount.minor() / n;
        let remainder = self.amount.minor() % n;
        self.participants
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let extra = if (i as i64) < remainder { 1 } else { 0 };
                (p.clone(), Money::from_minor(base + extra))
            })
            .collect()
    }

    fn check_keys<V>(&self, keys: &BTreeMap<String, V>) -> RResult<()> {
        if let Some(stray) = keys.keys().find(|k| !self.participants.contains(*k)) {
            return Err(self.invalid(format!("{} has a share but is not a participant", stray)));
        }
        if let Some(missing) = self.participants.iter().find(|p| !keys.contains_key(*p)) {
            return Err(self.invalid(format!("no share given for {}", missing)));
        }
        Ok(())
    }

    fn percentage_shares(&self, percents: &BTreeMap<String, f64>, config: &SettlementConfig) -> RResult<OwedShares> {
        self.check_keys(percents)?;
        if percents.values().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(self.invalid("percentages must be non-negative numbers"));
        }
        let total: f64 = percents.values().sum();
        if (total - 100.0).abs() > config.percentage_tolerance {
            return Err(RideTrackerError::InvalidPercentages {
                id: self.id.clone(),
                total,
            });
        }

        let mut shares: OwedShares = self
            .participants
            .iter()
            .map(|p| (p.clone(), self.amount.percent(percents[p])))
            .collect();
        self.absorb_remainder(&mut shares)?;
        Ok(shares)
    }

    fn exact_shares(&self, amounts: &BTreeMap<String, Money>, config: &SettlementConfig) -> RResult<OwedShares> {
        self.check_keys(amounts)?;
        if amounts.values().any(|a| a.is_negative()) {
            return Err(self.invalid("exact amounts must not be negative"));
        }

        let mut shares: OwedShares = self
            .participants
            .iter()
            .map(|p| (p.clone(), amounts[p]))
            .collect();
        let total: Money = shares.iter().map(|(_, m)| *m).sum();
        if (self.amount - total).abs() > config.rounding_tolerance {
            return Err(RideTrackerError::SplitMismatch {
                id: self.id.clone(),
                expected: self.amount.to_string(),
                actual: total.to_string(),
            });
        }
        self.absorb_remainder(&mut shares)?;
        Ok(shares)
    }

    /// Nudge the first share that stays non-negative so the shares add up to
    /// the expense amount exactly
    fn absorb_remainder(&self, shares: &mut OwedShares) -> RResult<()> {
        let sum: Money = shares.iter().map(|(_, m)| *m).sum();
        let nudge = self.amount - sum;
        if nudge == Money::ZERO {
            return Ok(());
        }
        match shares.iter_mut().find(|(_, share)| !(*share + nudge).is_negative()) {
            Some((_, share)) => {
                *share += nudge;
                Ok(())
            }
            None => Err(RideTrackerError::SplitMismatch {
                id: self.id.clone(),
                expected: self.amount.to_string(),
                actual: sum.to_string(),
            }),
        }
    }
}
