//! HTTP Route Handlers

pub mod archives;
pub mod incident;
pub mod readings;
pub mod thresholds;

use serde::Serialize;

/// Paging metadata for list endpoints
#[derive(Debug, Serialize)]
pub struct ListMeta {
    pub count: usize,
    pub limit: usize,
}

/// Upper bound for any `limit` query parameter
pub const MAX_LIMIT: usize = 1000;
