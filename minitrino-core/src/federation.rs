//! Federation Dispatcher.
//!
//! A resolved module may declare dependent clusters. Each one is provisioned
//! by a nested run of the state machine with the parent's settings, the
//! dependent's env overrides and its own name. A dependent that succeeds hands its
//! created resources to the parent run, so a later failure anywhere in the
//! run rolls back every cluster it touched.

use crate::config::Settings;
use crate::error::{MinitrinoError, Result};
use crate::modules::ResolvedModules;
use crate::provision::{AbortSignal, ProvisionReport, ProvisionRequest, Provisioner, RunTracker};
use tracing::{info, instrument};

/// Provision every dependent cluster declared by `resolved`, in order.
///
/// `chain` lists the clusters already being provisioned by enclosing runs,
/// the current one last.
#[instrument(skip_all, fields(parent = %parent.cluster_name))]
pub async fn dispatch(
    provisioner: &Provisioner,
    parent: &Settings,
    resolved: &ResolvedModules,
    chain: &[String],
    tracker: &RunTracker,
    abort: &AbortSignal,
) -> Result<Vec<ProvisionReport>> {
    let mut reports = Vec::new();

    for (module, spec) in resolved.dependent_clusters() {
        if chain.iter().any(|c| c == &spec.name) {
            return Err(MinitrinoError::FederationCycle { cluster: spec.name.clone() });
        }
        if reports.iter().any(|r: &ProvisionReport| r.cluster == spec.name) {
            info!(cluster = %spec.name, "Dependent cluster already provisioned in this run");
            continue;
        }

        info!(cluster = %spec.name, module = %module.name, "Provisioning dependent cluster");
        let outcome = match parent.for_dependent(&spec.name, spec.workers, &spec.env) {
            Ok(settings) => {
                let request = ProvisionRequest { modules: spec.modules.clone(), settings };
                provisioner.provision_chain(request, chain.to_vec(), abort.clone()).await
            }
            Err(e) => Err(e),
        };
        let report = outcome.map_err(|e| MinitrinoError::DependentClusterFailed {
            cluster: spec.name.clone(),
            source: Box::new(e),
        })?;

        tracker.extend(report.created.iter().cloned()).await;
        reports.push(report);
    }

    Ok(reports)
}
