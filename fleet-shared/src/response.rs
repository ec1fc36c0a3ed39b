use serde::{Deserialize, Serialize};

/// Envelope the data API wraps every collection read in.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ODataResponse<T> {
    pub d: Vec<T>,
}
