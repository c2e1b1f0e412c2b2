//! Group expense splitting and greedy debt settlement

pub mod expense;
pub mod money;
pub mod solver;

pub use expense::{Expense, Ledger, Member, OwedShares, SplitRule};
pub use money::Money;
pub use solver::{MemberBalance, Settlement, SettlementPlan, SettlementSolver};
