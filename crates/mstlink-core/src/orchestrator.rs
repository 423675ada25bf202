//! Per-identifier orchestration: query both sources concurrently, bound the
//! wait with a deadline, and hand the pair to the merge engine.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::clients::SourceClient;
use crate::domain::SourceResult;
use crate::merge::{merge, MergePolicy, MergedRecord};
use crate::SourceId;

/// Drives one enrichment end to end. `enrich` never fails; degraded
/// outcomes are encoded in the returned record's status and findings.
pub struct Orchestrator {
    registry: Arc<dyn SourceClient>,
    insurance: Arc<dyn SourceClient>,
    policy: MergePolicy,
    deadline: Duration,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<dyn SourceClient>,
        insurance: Arc<dyn SourceClient>,
        policy: MergePolicy,
        deadline: Duration,
    ) -> Self {
        Self {
            registry,
            insurance,
            policy,
            deadline,
        }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Fetch from both sources concurrently and merge the results.
    ///
    /// Each source gets the full deadline; a source that overruns it is
    /// reported as a transient failure while its task finishes in the
    /// background, so any late success still lands in the response cache
    /// for the next run.
    pub async fn enrich(&self, identifier: &str) -> MergedRecord {
        let registry_task = spawn_fetch(&self.registry, identifier);
        let insurance_task = spawn_fetch(&self.insurance, identifier);

        let (registry, insurance) = tokio::join!(
            await_with_deadline(registry_task, SourceId::Registry, self.deadline),
            await_with_deadline(insurance_task, SourceId::Insurance, self.deadline),
        );

        merge(identifier, &registry, &insurance, &self.policy)
    }
}

fn spawn_fetch(client: &Arc<dyn SourceClient>, identifier: &str) -> JoinHandle<SourceResult> {
    let client = Arc::clone(client);
    let identifier = identifier.to_owned();
    tokio::spawn(async move { client.fetch(&identifier).await })
}

async fn await_with_deadline(
    task: JoinHandle<SourceResult>,
    source: SourceId,
    deadline: Duration,
) -> SourceResult {
    match tokio::time::timeout(deadline, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => {
            warn!(%source, error = %join_err, "source fetch task failed");
            SourceResult::transient_failure(source, "fetch task failed", Duration::ZERO, 0)
        }
        Err(_) => {
            warn!(%source, ?deadline, "source fetch exceeded deadline");
            SourceResult::transient_failure(source, "deadline exceeded", deadline, 0)
        }
    }
}
