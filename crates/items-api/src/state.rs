use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use items_core::{ComputeFunction, Deployment, Provisioner, Topology};
use tracing::{error, info};

use crate::errors::GatewayError;

/// A provisioned topology with a runnable handler per function.
#[derive(Clone)]
pub struct Gateway {
    pub deployment: Deployment,
    pub functions: BTreeMap<String, Arc<dyn ComputeFunction>>,
}

impl Gateway {
    /// Apply `topology` and deploy its functions against the provisioned table.
    pub async fn provision(
        provisioner: &Provisioner,
        previous: Option<&Deployment>,
        topology: &Topology,
    ) -> Result<Self, GatewayError> {
        let applied = provisioner.apply(previous, topology).await?;
        for change in &applied.plan.changes {
            info!(kind = %change.kind, id = %change.id, action = ?change.action, "applied change");
        }
        for table in &applied.leftover {
            error!(%table, "retired table was not deleted; remove it by hand");
        }

        let functions = applied
            .deployment
            .instantiate_functions(provisioner.provider())?;

        Ok(Self {
            deployment: applied.deployment,
            functions,
        })
    }
}

/// Load the topology description at `path`, or the built-in items service.
pub async fn load_topology(path: Option<&Path>) -> Result<Topology, GatewayError> {
    match path {
        Some(path) => {
            let json = tokio::fs::read_to_string(path).await?;
            Ok(Topology::from_json(&json)?)
        }
        None => Ok(Topology::items_service()),
    }
}

/// Read the deployment record at `path`; `None` when unset or not written yet.
pub async fn read_deployment(path: Option<&Path>) -> Result<Option<Deployment>, GatewayError> {
    let Some(path) = path else {
        return Ok(None);
    };
    match tokio::fs::read_to_string(path).await {
        Ok(json) => Ok(Some(Deployment::from_json(&json)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub async fn write_deployment(
    path: Option<&Path>,
    deployment: &Deployment,
) -> Result<(), GatewayError> {
    if let Some(path) = path {
        tokio::fs::write(path, deployment.to_json_pretty()?).await?;
        info!(path = %path.display(), "deployment record written");
    }
    Ok(())
}
