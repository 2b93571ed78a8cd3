//! hlsc - back end of a high-level-synthesis compiler
//!
//! Takes a design whose scopes hold sequential control-flow IR and, scope by
//! scope with callees first:
//! - converts the scope to SSA form (`hlsc-ir`)
//! - asks a [`Scheduler`] for the cycle of every statement
//! - builds state-transition graphs and pipeline control (`hlsc-stg`)
//!
//! Scheduling itself is not part of this crate. [`ScheduleTable`] replays
//! schedules computed elsewhere.

pub mod config;
pub mod schedule_table;

pub use config::BackendConfig;
pub use schedule_table::ScheduleTable;

pub use hlsc_ir;
pub use hlsc_stg;

use anyhow::{Context, Result};
use hlsc_ir::{apply_ssa_conversion, infer_port_directions, validate_ssa, Design, ScopeId};
use hlsc_stg::{validate_stgs, ScopeSchedule, Stg, StgBuilder};
use indexmap::IndexMap;
use tracing::{debug, info, info_span, trace};

/// Produces the schedule of one scope
///
/// Called once per scope, after SSA conversion and before STG construction.
pub trait Scheduler {
    fn schedule(&mut self, design: &Design, scope: ScopeId) -> Result<ScopeSchedule>;
}

impl<F> Scheduler for F
where
    F: FnMut(&Design, ScopeId) -> Result<ScopeSchedule>,
{
    fn schedule(&mut self, design: &Design, scope: ScopeId) -> Result<ScopeSchedule> {
        self(design, scope)
    }
}

/// A design after the back end ran, with the STGs of every compiled scope
#[derive(Debug, Clone)]
pub struct CompiledDesign {
    pub design: Design,
    /// In compilation order, callees first
    pub stgs: IndexMap<ScopeId, Vec<Stg>>,
}

impl CompiledDesign {
    pub fn stgs_of(&self, scope: ScopeId) -> &[Stg] {
        self.stgs.get(&scope).map(Vec::as_slice).unwrap_or(&[])
    }

    /// STGs of the scope with qualified name `name`
    pub fn stgs_named(&self, name: &str) -> &[Stg] {
        self.stgs
            .iter()
            .find(|(id, _)| self.design.scope(**id).name == name)
            .map(|(_, stgs)| stgs.as_slice())
            .unwrap_or(&[])
    }

    /// Text listing of every STG
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for stgs in self.stgs.values() {
            for (i, stg) in stgs.iter().enumerate() {
                out.push_str(&stg.display(&self.design, i));
            }
        }
        out
    }
}

/// Runs SSA conversion, scheduling and STG construction over a design
pub struct Compiler<S: Scheduler> {
    config: BackendConfig,
    scheduler: S,
}

impl<S: Scheduler> Compiler<S> {
    pub fn new(scheduler: S) -> Self {
        Self {
            config: BackendConfig::default(),
            scheduler,
        }
    }

    pub fn with_config(mut self, config: BackendConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate SSA form and STGs after each phase
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.config.verify = verify;
        self
    }

    /// Log the listing of every STG as it is built
    pub fn with_dump_stgs(mut self, dump: bool) -> Self {
        self.config.dump_stgs = dump;
        self
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn compile(&mut self, mut design: Design) -> Result<CompiledDesign> {
        let _span = info_span!("compile").entered();
        infer_port_directions(&mut design).context("Port direction inference failed")?;

        let mut stgs = IndexMap::new();
        for scope in design.ordered_scopes(true) {
            if design.scope(scope).blocks.is_empty() {
                continue;
            }
            let name = design.scope(scope).name.clone();
            let built = self
                .compile_scope(&mut design, scope)
                .with_context(|| format!("Failed to compile '{}'", name))?;
            stgs.insert(scope, built);
        }
        info!("Compiled {} scopes", stgs.len());
        Ok(CompiledDesign { design, stgs })
    }

    fn compile_scope(&mut self, design: &mut Design, scope: ScopeId) -> Result<Vec<Stg>> {
        let name = design.scope(scope).name.clone();
        let _span = info_span!("scope", name = %name).entered();

        info!("SSA conversion");
        apply_ssa_conversion(design, scope)?;
        if self.config.verify {
            validate_ssa(design, scope).context("SSA validation failed")?;
        }
        trace!("{}", design.dump_scope(scope));

        let schedule = self
            .scheduler
            .schedule(design, scope)
            .context("Scheduling failed")?;
        debug!("{} scheduling regions", schedule.regions.len());

        info!("STG construction");
        let stg_config = self.config.stg_config();
        let stgs = StgBuilder::build(design, scope, &schedule, &stg_config)?;
        if self.config.verify {
            validate_stgs(design, &stgs).context("STG validation failed")?;
        }
        if self.config.dump_stgs {
            for (i, stg) in stgs.iter().enumerate() {
                info!("\n{}", stg.display(design, i));
            }
        }
        Ok(stgs)
    }
}
