//! Configuration-backed tenant registry

use std::collections::HashMap;

use crate::config::TenantsConfig;
use crate::domain::tenant::{TenantId, TenantRecord, TenantRegistry, TenantTier};

/// Registry loaded from the `tenants` configuration section
#[derive(Debug, Clone, Default)]
pub struct ConfiguredTenantRegistry {
    tenants: HashMap<TenantId, TenantTier>,
}

impl ConfiguredTenantRegistry {
    pub fn from_config(config: &TenantsConfig) -> Self {
        let tenants = config
            .registry
            .iter()
            .map(|entry| (TenantId::new(entry.id.clone()), TenantTier::new(entry.tier.clone())))
            .collect();
        Self { tenants }
    }

    /// Build from (id, tier) pairs
    pub fn from_pairs<I, S, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        let tenants = pairs
            .into_iter()
            .map(|(id, tier)| (TenantId::new(id), TenantTier::new(tier)))
            .collect();
        Self { tenants }
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}

impl TenantRegistry for ConfiguredTenantRegistry {
    fn lookup(&self, id: &TenantId) -> Option<TenantRecord> {
        self.tenants.get(id).map(|tier| TenantRecord {
            id: id.clone(),
            tier: tier.clone(),
        })
    }
}
