//! State machine driver.

use super::abort::AbortSignal;
use super::events::EventBus;
use super::fanout::fan_out;
use super::tracker::RunTracker;
use super::{health, rollback, Phase, ProvisionReport, ProvisionRequest};
use crate::bootstrap::{BootstrapOutcome, BootstrapPhase, BootstrapRunner, ScriptRunner};
use crate::cluster;
use crate::compose::{compose, Composition};
use crate::config::{Settings, KEY_CLUSTER_DIST, KEY_CLUSTER_NAME, KEY_CLUSTER_VER};
use crate::error::{MinitrinoError, Result};
use crate::federation;
use crate::labels::{LabelSet, ResourceKind, ResourceRef, PROJECT_LABEL_KEY};
use crate::locator::{ClusterSelector, ResourceLocator};
use crate::modules::{resolve, ModuleRegistry, ResolveTarget, ResolvedModules};
use crate::paths;
use crate::runtime::{ComposeInvocation, ContainerRuntime, ContainerSpec, ImageBuild, Resource};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Provisions clusters against a container runtime.
pub struct Provisioner {
    runtime: Arc<dyn ContainerRuntime>,
    bootstrap: Arc<dyn BootstrapRunner>,
    registry: Arc<ModuleRegistry>,
    events: EventBus,
}

impl Provisioner {
    /// Provisioner using the checksum-keyed script runner.
    pub fn new(runtime: Arc<dyn ContainerRuntime>, registry: Arc<ModuleRegistry>) -> Self {
        let bootstrap = Arc::new(ScriptRunner::new(runtime.clone()));
        Self { runtime, bootstrap, registry, events: EventBus::new() }
    }

    pub fn with_bootstrap(mut self, runner: Arc<dyn BootstrapRunner>) -> Self {
        self.bootstrap = runner;
        self
    }

    /// Phase transitions of every cluster this provisioner drives.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Resolve, compose and provision one cluster and its dependents.
    ///
    /// Resolution and composition errors are returned before any resource is
    /// touched. Later failures roll back everything the run created unless
    /// `settings.rollback` is off.
    #[instrument(skip_all, fields(cluster = %request.settings.cluster_name))]
    pub async fn provision(
        &self,
        request: ProvisionRequest,
        abort: &AbortSignal,
    ) -> Result<ProvisionReport> {
        self.provision_chain(request, Vec::new(), abort.clone()).await
    }

    /// `chain` holds the clusters already being provisioned above this one.
    pub(crate) fn provision_chain(
        &self,
        request: ProvisionRequest,
        chain: Vec<String>,
        abort: AbortSignal,
    ) -> BoxFuture<'_, Result<ProvisionReport>> {
        Box::pin(async move {
            let ProvisionRequest { modules, settings } = request;
            if settings.cluster_name == "*" {
                return Err(MinitrinoError::InvalidInput {
                    reason: "'*' selects clusters, it cannot be provisioned".into(),
                });
            }

            let resolved = {
                let target = ResolveTarget {
                    version: &settings.version,
                    license_path: settings.license_path.as_ref(),
                };
                resolve(&modules, &self.registry, &target)?
            };
            let composition = compose(&settings, &resolved)?;

            let mut chain = chain;
            chain.push(settings.cluster_name.clone());

            let mut run = Run::new(self, settings, resolved, composition, chain, abort);
            match run.execute().await {
                Ok(()) => Ok(run.into_report().await),
                Err(e) => Err(run.fail(e).await),
            }
        })
    }
}

/// Abort-aware await of one runtime operation.
async fn guarded<T>(
    abort: &AbortSignal,
    phase: Phase,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = abort.aborted() => Err(MinitrinoError::Aborted { phase: phase.to_string() }),
        result = fut => result,
    }
}

/// `config.properties` written to every worker.
pub fn worker_config(cluster: &str) -> String {
    format!(
        "coordinator=false\nhttp-server.http.port=8080\ndiscovery.uri=http://{}:8080\n",
        cluster::coordinator_name(cluster)
    )
}

struct WorkerTask {
    spec: ContainerSpec,
    create: bool,
}

/// One provisioning run of one cluster.
struct Run<'p> {
    provisioner: &'p Provisioner,
    settings: Settings,
    resolved: ResolvedModules,
    composition: Composition,
    chain: Vec<String>,
    abort: AbortSignal,
    tracker: RunTracker,
    phase: Phase,
    coordinator: String,
    image: String,
    workers: Vec<String>,
    bootstrap: Vec<BootstrapOutcome>,
    health_attempts: u32,
    dependents: Vec<ProvisionReport>,
}

impl<'p> Run<'p> {
    fn new(
        provisioner: &'p Provisioner,
        settings: Settings,
        resolved: ResolvedModules,
        composition: Composition,
        chain: Vec<String>,
        abort: AbortSignal,
    ) -> Self {
        let coordinator = cluster::coordinator_name(&settings.cluster_name);
        let image = cluster::image_tag(&settings.version, settings.distribution);
        Self {
            provisioner,
            settings,
            resolved,
            composition,
            chain,
            abort,
            tracker: RunTracker::new(),
            phase: Phase::Idle,
            coordinator,
            image,
            workers: Vec::new(),
            bootstrap: Vec::new(),
            health_attempts: 0,
            dependents: Vec::new(),
        }
    }

    fn runtime(&self) -> Arc<dyn ContainerRuntime> {
        self.provisioner.runtime.clone()
    }

    fn transition(&mut self, phase: Phase) {
        info!(
            cluster = %self.settings.cluster_name,
            from = %self.phase,
            to = %phase,
            "{}",
            phase.describe()
        );
        self.phase = phase;
        self.provisioner.events.publish(&self.settings.cluster_name, phase);
    }

    /// Move to `phase` unless an abort is pending.
    fn enter(&mut self, phase: Phase) -> Result<()> {
        if self.abort.is_aborted() {
            return Err(MinitrinoError::Aborted { phase: self.phase.to_string() });
        }
        self.transition(phase);
        Ok(())
    }

    async fn execute(&mut self) -> Result<()> {
        self.enter(Phase::Building)?;
        self.build_image().await?;

        self.enter(Phase::CoordinatorStarting)?;
        self.start_services().await?;

        self.enter(Phase::PreBootstrap)?;
        self.run_bootstrap(BootstrapPhase::BeforeStart).await?;

        self.enter(Phase::HealthGating)?;
        self.health_attempts = health::wait_until_ready(
            self.provisioner.runtime.as_ref(),
            &self.coordinator,
            self.settings.health_retries,
            self.settings.health_interval,
            &self.abort,
        )
        .await?;

        self.enter(Phase::PostBootstrap)?;
        self.run_bootstrap(BootstrapPhase::AfterStart).await?;

        let existing = self.existing_workers().await?;
        self.remove_surplus_workers(&existing).await?;

        if self.settings.workers > 0 {
            self.enter(Phase::WorkersProvisioning)?;
            self.provision_workers(&existing).await?;

            self.enter(Phase::ConfigPropagating)?;
            self.propagate_config().await?;

            self.enter(Phase::WorkersRestarting)?;
            self.restart_cluster().await?;
        }

        if self.resolved.dependent_clusters().next().is_some() {
            self.enter(Phase::Federating)?;
            self.dependents = federation::dispatch(
                self.provisioner,
                &self.settings,
                &self.resolved,
                &self.chain,
                &self.tracker,
                &self.abort,
            )
            .await?;
        }

        self.enter(Phase::Ready)?;
        Ok(())
    }

    async fn build_image(&mut self) -> Result<()> {
        let runtime = self.runtime();
        if runtime.image_exists(&self.image).await? {
            debug!(image = %self.image, "Image already present");
            return Ok(());
        }

        let build_args: BTreeMap<String, String> = [
            (KEY_CLUSTER_VER.to_string(), self.settings.version.to_string()),
            (KEY_CLUSTER_DIST.to_string(), self.settings.distribution.to_string()),
        ]
        .into_iter()
        .collect();
        let build = ImageBuild {
            tag: self.image.clone(),
            context: paths::image_context(&self.settings.lib_path),
            labels: self.composition.labels.image.clone(),
            build_args,
        };

        let image = guarded(&self.abort, self.phase, runtime.build_image(&build)).await?;
        self.tracker.record(image).await;
        Ok(())
    }

    /// Resources of this cluster's compose project, including images built
    /// for module services.
    async fn project_resources(&self) -> Result<Vec<ResourceRef>> {
        let runtime = self.runtime();
        let filter = LabelSet::default().with(PROJECT_LABEL_KEY, self.composition.project.clone());
        let mut found = Vec::new();
        for kind in ResourceKind::ALL {
            found.extend(runtime.list(kind, &filter).await?.iter().map(Resource::to_ref));
        }
        Ok(found)
    }

    /// Bring up the coordinator and module services, tracking what is new.
    async fn start_services(&mut self) -> Result<()> {
        let runtime = self.runtime();
        let before = self.project_resources().await?;
        let invocation = ComposeInvocation::from(&self.composition);
        let outcome = guarded(&self.abort, self.phase, runtime.compose_up(&invocation)).await;

        match self.project_resources().await {
            Ok(after) => {
                let created = after.into_iter().filter(|r| !before.contains(r));
                self.tracker.extend(created).await;
            }
            Err(e) if outcome.is_err() => {
                warn!(error = %e, "Could not list resources after failed start");
            }
            Err(e) => return Err(e),
        }
        outcome
    }

    async fn run_bootstrap(&mut self, phase: BootstrapPhase) -> Result<()> {
        let runner = self.provisioner.bootstrap.clone();
        let mut outcomes = Vec::new();
        for module in self.resolved.iter() {
            let fut = match phase {
                BootstrapPhase::BeforeStart => runner.before_start(&self.coordinator, module),
                BootstrapPhase::AfterStart => runner.after_start(&self.coordinator, module),
            };
            if let Some(outcome) = guarded(&self.abort, self.phase, fut).await? {
                outcomes.push(outcome);
            }
        }
        self.bootstrap.extend(outcomes);
        Ok(())
    }

    /// Worker containers already present on this cluster, by index.
    async fn existing_workers(&self) -> Result<Vec<(u32, Resource)>> {
        let locator = ResourceLocator::new(self.runtime());
        let selector = ClusterSelector::Named(self.settings.cluster_name.clone());
        let mut workers: Vec<(u32, Resource)> = locator
            .containers(&selector)
            .await?
            .into_iter()
            .filter_map(|c| {
                cluster::worker_index(&self.settings.cluster_name, &c.name).map(|i| (i, c))
            })
            .collect();
        workers.sort_by_key(|(index, _)| *index);
        Ok(workers)
    }

    /// Remove workers left over from a previous run with more workers.
    async fn remove_surplus_workers(&self, existing: &[(u32, Resource)]) -> Result<()> {
        let surplus: Vec<ResourceRef> = existing
            .iter()
            .filter(|(index, _)| *index > self.settings.workers)
            .map(|(_, resource)| resource.to_ref())
            .collect();
        if surplus.is_empty() {
            return Ok(());
        }

        info!(count = surplus.len(), "Removing surplus workers");
        let runtime = self.runtime();
        let limit = self.settings.max_concurrency;
        fan_out(self.phase.as_str(), surplus, limit, &self.abort, |r| {
            let runtime = runtime.clone();
            async move { runtime.remove(&r).await }
        })
        .await?;
        Ok(())
    }

    async fn provision_workers(&mut self, existing: &[(u32, Resource)]) -> Result<()> {
        let cluster_name = self.settings.cluster_name.clone();
        let env: BTreeMap<String, String> = [KEY_CLUSTER_NAME, KEY_CLUSTER_DIST, KEY_CLUSTER_VER]
            .iter()
            .filter_map(|key| self.settings.env.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect();

        let mut names = Vec::new();
        let mut tasks = Vec::new();
        for index in 1..=self.settings.workers {
            let name = cluster::worker_name(&cluster_name, index);
            match existing.iter().find(|(i, _)| *i == index) {
                Some((_, resource)) if resource.running => {
                    debug!(worker = %name, "Reusing running worker");
                }
                found => tasks.push(WorkerTask {
                    spec: ContainerSpec {
                        name: name.clone(),
                        hostname: name.clone(),
                        image: self.image.clone(),
                        network: cluster::network_name(&cluster_name),
                        labels: self.composition.labels.worker.clone(),
                        env: env.clone(),
                    },
                    create: found.is_none(),
                }),
            }
            names.push(name);
        }

        let runtime = self.runtime();
        let tracker = self.tracker.clone();
        let limit = self.settings.max_concurrency;
        fan_out(self.phase.as_str(), tasks, limit, &self.abort, |task| {
            let runtime = runtime.clone();
            let tracker = tracker.clone();
            async move {
                if task.create {
                    // Recorded first: the daemon may finish the create after we are cancelled.
                    tracker.record(ResourceRef::container(task.spec.name.clone())).await;
                    runtime.create_container(&task.spec).await?;
                }
                runtime.start(&task.spec.name).await
            }
        })
        .await?;

        info!(workers = names.len(), "Workers running");
        self.workers = names;
        Ok(())
    }

    /// Copy the coordinator's configuration to every worker, then mark it as a worker.
    async fn propagate_config(&self) -> Result<()> {
        let runtime = self.runtime();
        let dir = format!("/etc/{}", self.settings.distribution);
        let config_path = format!("{}/config.properties", dir);
        let config = worker_config(&self.settings.cluster_name);

        for worker in &self.workers {
            debug!(worker = %worker, "Propagating configuration");
            guarded(
                &self.abort,
                self.phase,
                runtime.copy_between(&self.coordinator, &dir, worker, &dir),
            )
            .await?;
            guarded(
                &self.abort,
                self.phase,
                runtime.write_file(worker, &config_path, config.as_bytes()),
            )
            .await?;
        }
        Ok(())
    }

    async fn restart_cluster(&self) -> Result<()> {
        let mut names = vec![self.coordinator.clone()];
        names.extend(self.workers.iter().cloned());

        let runtime = self.runtime();
        let limit = self.settings.max_concurrency;
        fan_out(self.phase.as_str(), names, limit, &self.abort, |name| {
            let runtime = runtime.clone();
            async move { runtime.restart(&name).await }
        })
        .await?;
        Ok(())
    }

    async fn into_report(self) -> ProvisionReport {
        ProvisionReport {
            cluster: self.settings.cluster_name.clone(),
            modules: self.resolved.names().into_iter().map(str::to_string).collect(),
            image: self.image,
            coordinator: self.coordinator,
            workers: self.workers,
            created: self.tracker.snapshot().await,
            bootstrap: self.bootstrap,
            health_attempts: self.health_attempts,
            warnings: self.composition.warnings,
            dependents: self.dependents,
        }
    }

    /// Roll back (if enabled), return to `Idle` and hand the error back.
    async fn fail(mut self, err: MinitrinoError) -> MinitrinoError {
        error!(
            cluster = %self.settings.cluster_name,
            phase = %self.phase,
            error = %err,
            "Provisioning failed"
        );

        if self.settings.rollback {
            self.transition(Phase::RollingBack);
            let limit = self.settings.max_concurrency;
            let report = rollback::rollback(self.runtime(), &self.tracker, limit).await;
            if !report.failed.is_empty() {
                warn!(failed = report.failed.len(), "Some resources could not be rolled back");
            }
        } else {
            let remaining = self.tracker.len().await;
            warn!(resources = remaining, "Rollback disabled, leaving created resources in place");
        }

        self.transition(Phase::Idle);
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config() {
        let config = worker_config("dev");
        assert!(config.contains("coordinator=false"));
        assert!(config.contains("http-server.http.port=8080"));
        assert!(config.contains("discovery.uri=http://minitrino-dev:8080"));
    }
}
