//! Provisioning state machine.
//!
//! ```text
//! Init -> Inspecting -> Complete ----------------------------------------+
//!              |                                                         |
//!              +-> Repairing -> Complete                                 |
//!              |       |                                                 v
//!              +-------+-> Fetching -> Reconciling -> Verifying -> Ready -> ConfigWritten
//!                              |                          |
//!                              +-----------> Degraded <---+
//! ```
//!
//! Every step only reads disk state or applies idempotent repairs, so the
//! whole machine can be re-run at will. The descriptor is written in
//! `ConfigWritten` and nowhere else.

use crate::config::Config;
use crate::descriptor::ProvisioningDescriptor;
use crate::error::{Error, Result};
use crate::model::staging::{self, StagingSession};
use crate::model::{
    AliasResolver, ArtifactFetcher, Catalog, ComponentSpec, Feature, IntegrityStatus,
    IntegrityVerifier, LayoutInspector, LayoutReconciler,
};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionState {
    Init,
    Inspecting,
    Complete,
    Repairing,
    Fetching,
    Reconciling,
    Verifying,
    Ready,
    Degraded,
    ConfigWritten,
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentReport {
    pub name: &'static str,
    pub required: bool,
    pub feature: Option<Feature>,
    pub status: IntegrityStatus,
}

#[derive(Debug)]
pub enum Outcome {
    Ready {
        descriptor: ProvisioningDescriptor,
        path: PathBuf,
    },
    Degraded {
        reason: String,
    },
}

#[derive(Debug)]
pub struct ProvisionReport {
    /// States visited, in order, ending with the terminal one.
    pub trace: Vec<ProvisionState>,
    pub components: Vec<ComponentReport>,
    pub bytes_transferred: u64,
    pub outcome: Outcome,
}

impl ProvisionReport {
    pub fn is_ready(&self) -> bool {
        matches!(self.outcome, Outcome::Ready { .. })
    }

    pub fn visited(&self, state: ProvisionState) -> bool {
        self.trace.contains(&state)
    }

    pub fn component(&self, name: &str) -> Option<&ComponentReport> {
        self.components.iter().find(|c| c.name == name)
    }
}

/// Mutable state carried between steps of one run.
#[derive(Default)]
struct RunContext {
    force: bool,
    trace: Vec<ProvisionState>,
    components: Vec<ComponentReport>,
    bytes_transferred: u64,
    degraded_reason: Option<String>,
    descriptor: Option<ProvisioningDescriptor>,
}

impl RunContext {
    fn all_complete(&self) -> bool {
        self.components.iter().all(|c| c.status.is_complete())
    }

    fn required_complete(&self) -> bool {
        self.components
            .iter()
            .filter(|c| c.required)
            .all(|c| c.status.is_complete())
    }

    fn is_complete(&self, name: &str) -> bool {
        self.components
            .iter()
            .any(|c| c.name == name && c.status.is_complete())
    }
}

pub struct Orchestrator<F: ArtifactFetcher> {
    config: Config,
    catalog: Catalog,
    fetcher: F,
}

impl<F: ArtifactFetcher> Orchestrator<F> {
    pub fn new(config: Config, fetcher: F) -> Result<Self> {
        Self::with_catalog(config, Catalog::default(), fetcher)
    }

    pub fn with_catalog(config: Config, catalog: Catalog, fetcher: F) -> Result<Self> {
        config.validate()?;
        catalog.validate()?;
        Ok(Self {
            config,
            catalog,
            fetcher,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Drive the state machine to a terminal state.
    ///
    /// `Degraded` is reported through the returned report, not as an error;
    /// `Err` is reserved for failures writing the descriptor itself.
    pub async fn run(&self, force: bool) -> Result<ProvisionReport> {
        let mut run = RunContext {
            force,
            ..RunContext::default()
        };
        let mut state = ProvisionState::Init;

        loop {
            run.trace.push(state);
            let next = match state {
                ProvisionState::Init => ProvisionState::Inspecting,
                ProvisionState::Inspecting => self.inspect(&mut run),
                ProvisionState::Repairing => self.repair(&mut run),
                ProvisionState::Fetching => self.fetch(&mut run).await,
                ProvisionState::Reconciling => {
                    LayoutReconciler::reconcile(&self.config.store_root, self.wanted());
                    ProvisionState::Verifying
                }
                ProvisionState::Verifying => self.verify(&mut run),
                ProvisionState::Complete | ProvisionState::Ready => self.finalize(&mut run)?,
                ProvisionState::Degraded => {
                    if ProvisioningDescriptor::remove_stale(&self.config.descriptor_path)? {
                        tracing::warn!(
                            "Removed stale descriptor {}",
                            self.config.descriptor_path.display()
                        );
                    }
                    let reason = run
                        .degraded_reason
                        .take()
                        .unwrap_or_else(|| "required components unavailable".to_string());
                    return Ok(Self::report(run, Outcome::Degraded { reason }));
                }
                ProvisionState::ConfigWritten => {
                    let descriptor = run.descriptor.take().ok_or_else(|| {
                        Error::ConfigError("descriptor missing after ConfigWritten".to_string())
                    })?;
                    let outcome = Outcome::Ready {
                        descriptor,
                        path: self.config.descriptor_path.clone(),
                    };
                    return Ok(Self::report(run, outcome));
                }
            };
            tracing::debug!("{} -> {}", state, next);
            state = next;
        }
    }

    fn report(run: RunContext, outcome: Outcome) -> ProvisionReport {
        ProvisionReport {
            trace: run.trace,
            components: run.components,
            bytes_transferred: run.bytes_transferred,
            outcome,
        }
    }

    fn wanted(&self) -> Vec<&ComponentSpec> {
        let formula = self.config.formula_enable;
        let table = self.config.table_enable;
        self.catalog
            .wanted(move |feature| match feature {
                Feature::Formula => formula,
                Feature::Table => table,
            })
            .collect()
    }

    fn evaluate(&self) -> Vec<ComponentReport> {
        let root = &self.config.store_root;
        let wanted = self.wanted();

        for presence in LayoutInspector::inspect(root, wanted.iter().copied()) {
            match presence.size_bytes {
                Some(size) => tracing::debug!("{}: present, {} bytes", presence.name, size),
                None if presence.present => tracing::debug!("{}: present, not a file", presence.name),
                None => tracing::debug!("{}: absent", presence.name),
            }
        }

        wanted
            .into_iter()
            .map(|spec| ComponentReport {
                name: spec.name,
                required: spec.required,
                feature: spec.feature,
                status: IntegrityVerifier::verify(root, spec),
            })
            .collect()
    }

    fn inspect(&self, run: &mut RunContext) -> ProvisionState {
        run.components = self.evaluate();

        if run.force {
            tracing::info!("Forced re-fetch requested");
            return ProvisionState::Fetching;
        }
        if run.all_complete() {
            tracing::info!("Model store {} is complete", self.config.store_root.display());
            return ProvisionState::Complete;
        }
        if LayoutInspector::store_is_empty(&self.config.store_root) {
            tracing::info!("Model store {} is empty", self.config.store_root.display());
            return ProvisionState::Fetching;
        }
        ProvisionState::Repairing
    }

    fn repair(&self, run: &mut RunContext) -> ProvisionState {
        let report = LayoutReconciler::reconcile(&self.config.store_root, self.wanted());
        run.components = self.evaluate();

        if run.all_complete() {
            let repaired: Vec<&str> = report.reconciled().collect();
            tracing::info!("Store repaired without download: {}", repaired.join(", "));
            ProvisionState::Complete
        } else {
            ProvisionState::Fetching
        }
    }

    async fn fetch(&self, run: &mut RunContext) -> ProvisionState {
        let subdir = self.config.snapshot_subdir.as_deref();
        let mut patterns: Vec<String> = self
            .wanted()
            .into_iter()
            .filter(|spec| run.force || !run.is_complete(spec.name))
            .map(|spec| spec.fetch_pattern(subdir))
            .collect();
        patterns.dedup();

        match self.fetch_and_merge(&patterns, run.force).await {
            Ok(bytes) => {
                run.bytes_transferred += bytes;
                ProvisionState::Reconciling
            }
            // an unreachable registry only costs the optional features; a
            // wrong repository or a failed forced refresh always degrades
            Err(e @ Error::RegistryUnavailable(_)) if !run.force && run.required_complete() => {
                tracing::warn!("{}; continuing with the components already in place", e);
                ProvisionState::Verifying
            }
            Err(e) => {
                tracing::error!("{}", e);
                run.degraded_reason = Some(e.to_string());
                ProvisionState::Degraded
            }
        }
    }

    async fn fetch_and_merge(&self, patterns: &[String], overwrite: bool) -> Result<u64> {
        tracing::info!(
            "Fetching {} from {} ({})",
            patterns.join(", "),
            self.config.repository_id,
            self.fetcher.registry_name()
        );

        let session = StagingSession::create(&self.config.scratch_dir)?;
        let fetched = self
            .fetcher
            .fetch(&self.config.repository_id, session.path(), Some(patterns))
            .await?;

        let snapshot_root = match &self.config.snapshot_subdir {
            Some(subdir) => fetched.local_path.join(subdir),
            None => fetched.local_path.clone(),
        };
        // normalize inside staging so a flat upstream replaces stale canonical files
        LayoutReconciler::reconcile(&snapshot_root, self.wanted());
        staging::merge_into(&snapshot_root, &self.config.store_root, overwrite)?;

        if let Err(e) = session.close() {
            tracing::warn!("Could not remove staging directory: {}", e);
        }
        Ok(fetched.bytes_transferred)
    }

    fn verify(&self, run: &mut RunContext) -> ProvisionState {
        run.components = self.evaluate();

        let mut missing_required = Vec::new();
        for report in run.components.iter().filter(|c| !c.status.is_complete()) {
            let reason = self
                .catalog
                .component(report.name)
                .and_then(|spec| report.status.to_error(spec))
                .map(|e| e.to_string())
                .unwrap_or_default();

            if report.required {
                tracing::error!("Required component '{}' unusable: {}", report.name, reason);
                missing_required.push(report.name);
            } else {
                tracing::warn!(
                    "Optional component '{}' unusable, disabling it: {}",
                    report.name,
                    reason
                );
            }
        }

        if missing_required.is_empty() {
            ProvisionState::Ready
        } else {
            run.degraded_reason = Some(format!(
                "required components not provisioned: {}",
                missing_required.join(", ")
            ));
            ProvisionState::Degraded
        }
    }

    fn feature_ready(&self, run: &RunContext, feature: Feature, enabled: bool) -> bool {
        enabled
            && run
                .components
                .iter()
                .filter(|c| c.feature == Some(feature))
                .all(|c| c.status.is_complete())
    }

    fn finalize(&self, run: &mut RunContext) -> Result<ProvisionState> {
        let root = &self.config.store_root;

        let aliases = AliasResolver::resolve(root, &self.catalog);
        for (alias, e) in aliases.failures() {
            tracing::warn!("Alias {} not created: {}", alias, e);
        }
        for alias in &self.catalog.aliases {
            let has_target = AliasResolver::expected_target(root, &self.catalog, alias).is_some();
            if has_target && !IntegrityVerifier::alias_resolves(root, alias) {
                tracing::warn!("Alias {} does not resolve to {}", alias.alias, alias.target);
            }
        }

        let formula = self.feature_ready(run, Feature::Formula, self.config.formula_enable);
        let table = self.feature_ready(run, Feature::Table, self.config.table_enable);

        let descriptor = ProvisioningDescriptor::new(&self.config, formula, table);
        descriptor.save(&self.config.descriptor_path)?;
        run.descriptor = Some(descriptor);

        Ok(ProvisionState::ConfigWritten)
    }
}
