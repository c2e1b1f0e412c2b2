use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::expense::{Expense, Member};
use super::money::Money;
use crate::config::SettlementConfig;
use crate::error::{RResult, RideTrackerError};

/// A proposed transfer from a debtor to a creditor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub from: String,
    pub to: String,
    pub amount: Money,
}

/// Net position of one member across the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberBalance {
    pub member: String,
    /// What this member covered on behalf of others; their own share of
    /// an expense they paid is left out on both sides
    pub fronted: Money,
    pub owed: Money,
    /// fronted - owed; positive means the group owes this member
    pub balance: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementPlan {
    pub settlements: Vec<Settlement>,
    pub balances: Vec<MemberBalance>,
}

impl SettlementPlan {
    pub fn total_transferred(&self) -> Money {
        self.settlements.iter().map(|s| s.amount).sum()
    }
}

/// Greedy largest-first settlement.
///
/// Pure function of (expenses, members). Largest creditor is matched against
/// largest debtor until one side runs out. This does not always find the
/// minimum number of transfers, but it is deterministic, never creates a
/// cycle and never moves more than a party's outstanding balance.
#[derive(Debug, Clone, Default)]
pub struct SettlementSolver {
    config: SettlementConfig,
}

impl SettlementSolver {
    pub fn new(config: SettlementConfig) -> Self {
        Self { config }
    }

    /// Per-member fronted/owed/balance, in roster order
    pub fn balances(&self, expenses: &[Expense], members: &[Member]) -> RResult<Vec<MemberBalance>> {
        let index: HashMap<&str, usize> = members
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id.as_str(), i))
            .collect();
        let lookup = |member: &str, expense: &Expense| {
            index.get(member).copied().ok_or_else(|| RideTrackerError::UnknownMember {
                member: member.to_string(),
                expense: expense.id.clone(),
            })
        };

        let mut fronted = vec![Money::ZERO; members.len()];
        let mut owed = vec![Money::ZERO; members.len()];

        for expense in expenses {
            let payer = lookup(expense.payer.as_str(), expense)?;
            for participant in &expense.participants {
                lookup(participant.as_str(), expense)?;
            }

            let shares = expense.owed_shares(&self.config)?;
            let mut covered = Money::ZERO;
            for (participant, share) in &shares {
                owed[lookup(participant.as_str(), expense)?] += *share;
                covered += *share;
            }
            fronted[payer] += covered;
        }

        Ok(members
            .iter()
            .enumerate()
            .map(|(i, m)| MemberBalance {
                member: m.id.clone(),
                fronted: fronted[i],
                owed: owed[i],
                balance: fronted[i] - owed[i],
            })
            .collect())
    }

    pub fn solve(&self, expenses: &[Expense], members: &[Member]) -> RResult<Vec<Settlement>> {
        let balances = self.balances(expenses, members)?;
        Ok(self.settle_balances(&balances))
    }

    pub fn plan(&self, expenses: &[Expense], members: &[Member]) -> RResult<SettlementPlan> {
        let balances = self.balances(expenses, members)?;
        let settlements = self.settle_balances(&balances);
        log::info!(
            "Settled {} expenses among {} members with {} transfers",
            expenses.len(),
            members.len(),
            settlements.len()
        );
        Ok(SettlementPlan { settlements, balances })
    }

    fn settle_balances(&self, balances: &[MemberBalance]) -> Vec<Settlement> {
        let eps = self.config.epsilon;

        let mut creditors: Vec<(&str, Money)> = balances
            .iter()
            .filter(|b| b.balance > eps)
            .map(|b| (b.member.as_str(), b.balance))
            .collect();
        let mut debtors: Vec<(&str, Money)> = balances
            .iter()
            .filter(|b| b.balance < -eps)
            .map(|b| (b.member.as_str(), -b.balance))
            .collect();

        // sort_by is stable: equal magnitudes keep roster order
        creditors.sort_by(|a, b| b.1.cmp(&a.1));
        debtors.sort_by(|a, b| b.1.cmp(&a.1));

        let mut settlements = Vec::new();
        let (mut ci, mut di) = (0, 0);
        while ci < creditors.len() && di < debtors.len() {
            let amount = creditors[ci].1.min(debtors[di].1);
            if amount > eps {
                settlements.push(Settlement {
                    from: debtors[di].0.to_string(),
                    to: creditors[ci].0.to_string(),
                    amount,
                });
            }
            creditors[ci].1 -= amount;
            debtors[di].1 -= amount;

            if creditors[ci].1 <= eps {
                ci += 1;
            }
            if debtors[di].1 <= eps {
                di += 1;
            }
        }
        settlements
    }
}
