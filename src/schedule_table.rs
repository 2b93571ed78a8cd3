//! Schedules computed ahead of time, keyed by qualified scope name

use std::path::Path;

use anyhow::{bail, Context, Result};
use hlsc_ir::{Design, ScopeId};
use hlsc_stg::ScopeSchedule;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::Scheduler;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleTable {
    schedules: IndexMap<String, ScopeSchedule>,
}

impl ScheduleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, scope_name: impl Into<String>, schedule: ScopeSchedule) {
        self.schedules.insert(scope_name.into(), schedule);
    }

    pub fn get(&self, scope_name: &str) -> Option<&ScopeSchedule> {
        self.schedules.get(scope_name)
    }

    pub fn len(&self) -> usize {
        self.schedules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedules.is_empty()
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).context("Failed to parse schedule table")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json_str(&contents).with_context(|| format!("in {}", path.display()))
    }
}

impl Scheduler for ScheduleTable {
    fn schedule(&mut self, design: &Design, scope: ScopeId) -> Result<ScopeSchedule> {
        let name = &design.scope(scope).name;
        match self.schedules.get(name) {
            Some(schedule) => Ok(schedule.clone()),
            None => bail!("No schedule for '{}'", name),
        }
    }
}
