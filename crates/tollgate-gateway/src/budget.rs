//! Cumulative spend tracking

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tollgate_config::BudgetConfig;

/// Which limit a charge would breach
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BudgetBreach {
    Total { limit: f64, spent: f64 },
    Task { limit: f64, spent: f64 },
}

impl fmt::Display for BudgetBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Total { limit, spent } => write!(f, "total limit {limit:.4} would be exceeded (spent {spent:.4})"),
            Self::Task { limit, spent } => write!(f, "task limit {limit:.4} would be exceeded (spent {spent:.4})"),
        }
    }
}

#[derive(Debug, Default)]
struct Spend {
    total: f64,
    per_task: HashMap<String, f64>,
}

/// Spend ledger for one tenant
///
/// Charges are reserved up front under one lock, so concurrent requests
/// can never push spend past a limit. A reservation that is dropped
/// without being committed is refunded.
#[derive(Debug)]
pub struct BudgetBook {
    limits: BudgetConfig,
    spend: Mutex<Spend>,
}

impl BudgetBook {
    pub fn new(limits: BudgetConfig) -> Self {
        Self {
            limits,
            spend: Mutex::new(Spend::default()),
        }
    }

    /// Remaining spend allowed for `task`, if any limit applies
    pub fn headroom(&self, task: &str) -> Option<f64> {
        let spend = self.spend.lock().unwrap_or_else(PoisonError::into_inner);
        let total = self.limits.total_limit.map(|limit| limit - spend.total);
        let per_task = self
            .limits
            .per_task_limits
            .get(task)
            .map(|limit| limit - spend.per_task.get(task).copied().unwrap_or(0.0));

        match (total, per_task) {
            (Some(a), Some(b)) => Some(a.min(b).max(0.0)),
            (a, b) => a.or(b).map(|h| h.max(0.0)),
        }
    }

    /// Reserve `cost` against every applicable limit, or change nothing
    pub fn try_reserve(self: &Arc<Self>, task: &str, cost: f64) -> Result<Reservation, BudgetBreach> {
        let cost = cost.max(0.0);
        let mut spend = self.spend.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(limit) = self.limits.total_limit
            && spend.total + cost > limit
        {
            return Err(BudgetBreach::Total {
                limit,
                spent: spend.total,
            });
        }

        let task_spent = spend.per_task.get(task).copied().unwrap_or(0.0);
        if let Some(&limit) = self.limits.per_task_limits.get(task)
            && task_spent + cost > limit
        {
            return Err(BudgetBreach::Task {
                limit,
                spent: task_spent,
            });
        }

        spend.total += cost;
        *spend.per_task.entry(task.to_owned()).or_insert(0.0) += cost;

        Ok(Reservation {
            book: Arc::clone(self),
            task: task.to_owned(),
            cost,
            committed: false,
        })
    }

    /// Total committed and reserved spend
    pub fn spent(&self) -> f64 {
        self.spend.lock().unwrap_or_else(PoisonError::into_inner).total
    }

    /// Committed and reserved spend for one task
    pub fn spent_on(&self, task: &str) -> f64 {
        self.spend
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .per_task
            .get(task)
            .copied()
            .unwrap_or(0.0)
    }

    fn refund(&self, task: &str, cost: f64) {
        let mut spend = self.spend.lock().unwrap_or_else(PoisonError::into_inner);
        spend.total = (spend.total - cost).max(0.0);
        if let Some(task_spend) = spend.per_task.get_mut(task) {
            *task_spend = (*task_spend - cost).max(0.0);
        }
    }
}

/// Spend held for a request in flight
///
/// Refunded on drop unless [`Reservation::commit`] was called.
#[derive(Debug)]
pub struct Reservation {
    book: Arc<BudgetBook>,
    task: String,
    cost: f64,
    committed: bool,
}

impl Reservation {
    /// Keep the charge
    pub fn commit(mut self) -> f64 {
        self.committed = true;
        self.cost
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.committed {
            self.book.refund(&self.task, self.cost);
        }
    }
}
