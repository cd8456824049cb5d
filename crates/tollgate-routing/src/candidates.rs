//! Candidate model lists per task category

use indexmap::IndexMap;
use tollgate_core::FALLBACK_TASK;

use crate::RoutingError;

/// Tenant key that seeds every task the tenant does not list
const TENANT_DEFAULT: &str = "default";

/// Ordered candidate models per task, after tenant overrides are applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateMap {
    tasks: IndexMap<String, Vec<String>>,
}

impl CandidateMap {
    pub fn new(tasks: IndexMap<String, Vec<String>>) -> Self {
        Self { tasks }
    }

    /// Merge tenant candidate lists over the global ones
    ///
    /// Tenant lists replace global lists for the same task. A tenant
    /// `default` list replaces every global task the tenant does not name,
    /// including the fallback category.
    pub fn merged(global: &IndexMap<String, Vec<String>>, tenant: &IndexMap<String, Vec<String>>) -> Self {
        let seed = tenant.get(TENANT_DEFAULT);
        let mut tasks = IndexMap::with_capacity(global.len() + tenant.len());

        for (task, models) in global {
            let models = tenant.get(task).or(seed).unwrap_or(models);
            tasks.insert(task.clone(), models.clone());
        }

        for (task, models) in tenant {
            if task != TENANT_DEFAULT {
                tasks.insert(task.clone(), models.clone());
            }
        }

        if let Some(seed) = seed {
            tasks.entry(FALLBACK_TASK.to_owned()).or_insert_with(|| seed.clone());
        }

        Self { tasks }
    }

    /// Candidates for `task`, falling back to the general category
    pub fn resolve(&self, task: &str) -> Result<&[String], RoutingError> {
        self.tasks
            .get(task)
            .or_else(|| self.tasks.get(FALLBACK_TASK))
            .filter(|models| !models.is_empty())
            .map(Vec::as_slice)
            .ok_or_else(|| RoutingError::NoCandidates { task: task.to_owned() })
    }
}
