//! Table configuration.

/// Settings for an [`AtomTable`](crate::AtomTable).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    /// Name attached to the table's log events.
    pub label: String,
    /// Number of atoms to reserve index space for up front.
    pub initial_capacity: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            label: "atomtable".to_string(),
            initial_capacity: 0,
        }
    }
}

impl TableConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    #[must_use]
    pub fn with_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }
}
