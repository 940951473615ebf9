use crate::core::error::{Result, SubmitError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Key whose entry applies to every team without one of its own.
pub const DEFAULT_TEAM: &str = "default";

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct TeamQuota {
    pub max_gpus: u32,
}

/// Read-only table of per-team GPU ceilings.
///
/// Enforcement is a stateless check, not a reservation: two concurrent
/// submissions may both pass and together exceed a ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaRegistry {
    quotas: HashMap<String, TeamQuota>,
    fallback: TeamQuota,
}

impl Default for QuotaRegistry {
    fn default() -> Self {
        Self::from_limits([
            ("vision-china", 128),
            ("nlp-us", 256),
            ("recsys-eu", 64),
            (DEFAULT_TEAM, 32),
        ])
    }
}

impl QuotaRegistry {
    /// Build a registry from `(team, max_gpus)` pairs. Without a `default`
    /// entry the built-in default ceiling is used for unknown teams.
    pub fn from_limits<I, S>(limits: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let mut quotas: HashMap<String, TeamQuota> = limits
            .into_iter()
            .map(|(team, max_gpus)| (team.into(), TeamQuota { max_gpus }))
            .collect();
        let fallback = quotas
            .remove(DEFAULT_TEAM)
            .unwrap_or(TeamQuota { max_gpus: 32 });
        Self { quotas, fallback }
    }

    /// Replace or add entries. A `default` entry replaces the fallback.
    pub fn with_overrides<I, S>(mut self, limits: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        for (team, max_gpus) in limits {
            let team = team.into();
            let quota = TeamQuota { max_gpus };
            if team == DEFAULT_TEAM {
                self.fallback = quota;
            } else {
                self.quotas.insert(team, quota);
            }
        }
        self
    }

    /// Never fails: unknown teams get the default record.
    pub fn lookup(&self, team: &str) -> TeamQuota {
        self.quotas.get(team).copied().unwrap_or(self.fallback)
    }

    pub fn has_explicit_entry(&self, team: &str) -> bool {
        self.quotas.contains_key(team)
    }

    pub fn enforce(&self, team: &str, requested_gpus: u32) -> Result<()> {
        let quota = self.lookup(team);
        if requested_gpus > quota.max_gpus {
            return Err(SubmitError::QuotaExceeded {
                team: team.to_string(),
                requested: requested_gpus,
                limit: quota.max_gpus,
            });
        }
        Ok(())
    }
}
