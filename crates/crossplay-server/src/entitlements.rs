use std::collections::HashMap;
use std::sync::Arc;

use crossplay_core::player::Player;

use crate::config::EntitlementsConfig;

/// Grants a room owner their participant ceiling.
pub trait EntitlementSource: Send + Sync {
    fn max_participants(&self, owner: &Player) -> usize;
}

pub type SharedEntitlements = Arc<dyn EntitlementSource>;

/// Ceilings read from the `[entitlements]` config section, keyed by the
/// owner's sign-in provider.
#[derive(Debug, Clone)]
pub struct ConfigEntitlements {
    default_max: usize,
    providers: HashMap<String, usize>,
}

impl ConfigEntitlements {
    pub fn new(config: &EntitlementsConfig) -> Self {
        Self {
            default_max: config.default_max_participants,
            providers: config.providers.clone(),
        }
    }
}

impl EntitlementSource for ConfigEntitlements {
    fn max_participants(&self, owner: &Player) -> usize {
        owner
            .provider
            .as_deref()
            .and_then(|p| self.providers.get(p))
            .copied()
            .unwrap_or(self.default_max)
    }
}
