use super::ResultSet;

/// Outcome of a statement that returns no row data.
#[derive(Debug, Clone, Default)]
pub struct ExecutionMetadata {
    pub rows_affected: u64,
    /// Rows produced by `RETURNING` when generated keys were requested.
    pub generated_keys: Option<ResultSet>,
}

impl ExecutionMetadata {
    #[must_use]
    pub fn new(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            generated_keys: None,
        }
    }
}

/// Per-statement results of a batch, in batch order.
#[derive(Debug, Clone, Default)]
pub struct BatchMetadata {
    pub results: Vec<ExecutionMetadata>,
}

impl BatchMetadata {
    #[must_use]
    pub fn total_rows_affected(&self) -> u64 {
        self.results.iter().map(|r| r.rows_affected).sum()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
