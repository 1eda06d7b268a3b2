use serde::{Deserialize, Serialize};

/// Request to clear the pending flag of one row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UpdateTask {
    pub table: String,
    pub id: i64,
}

impl UpdateTask {
    pub fn new(table: impl Into<String>, id: i64) -> Self {
        Self {
            table: table.into(),
            id,
        }
    }
}
