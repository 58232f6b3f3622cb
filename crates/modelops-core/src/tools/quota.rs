use std::sync::Arc;

use crate::management::{ManagementError, QuotaUsage, ResourceManager};

/// Passthrough read of regional quota usage.
pub struct QuotaReader {
    manager: Arc<dyn ResourceManager>,
}

impl QuotaReader {
    pub fn new(manager: Arc<dyn ResourceManager>) -> Self {
        Self { manager }
    }

    pub async fn quota(&self, location: &str) -> Result<Vec<QuotaUsage>, ManagementError> {
        log::debug!("Reading quota usage for {}", location);
        self.manager.list_usages(location).await
    }
}
