//! Admission and routing core for Tollgate
//!
//! [`Gateway::route`] takes a request through model selection, rate
//! limiting, caching, budget enforcement and execution, then feeds the
//! observed reward back to the selector.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc, clippy::cast_precision_loss)]

pub mod budget;
pub mod directory;
pub mod dispatch;
mod error;
mod gateway;
mod result;
pub mod state;

pub use budget::{BudgetBook, BudgetBreach, Reservation};
pub use directory::{StaticTenantDirectory, TenantDirectory, TenantProfile};
pub use error::GatewayError;
pub use gateway::{Admission, BudgetDecision, CostEstimate, Gateway, GatewayBuilder, RouteContext};
pub use result::{CacheInfo, RequestState, RouteResult};
pub use state::TenantStateStore;
