//! Data transfer objects for web requests and responses.

use serde::{Deserialize, Serialize};

use crate::store::VehicleState;

/// Query string of the vehicle list.
#[derive(Debug, Default, Deserialize)]
pub struct VehicleQuery {
    /// Exact line planning number
    pub line: Option<String>,

    /// Operator code (`ARR`) or name (`arriva`)
    pub operator: Option<String>,

    /// Maximum number of vehicles to return
    pub limit: Option<usize>,
}

/// Vehicle list response.
#[derive(Debug, Serialize)]
pub struct VehicleListResponse {
    pub count: usize,
    pub vehicles: Vec<VehicleState>,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
