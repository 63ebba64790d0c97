use super::cloud::{CloudProvider, InstanceIdentifier};
use crate::launcher;
use crate::util::{ADDRESS_PENDING_REQUEUE, Error, WAITING_REQUEUE, patch::patch_metadata};
use kube::{Client, ResourceExt};
use multi_platform_types::{TaskRun, keys};
use std::sync::Arc;
use std::time::Duration;

/// One dynamic (cloud-backed) platform entry from the config map.
#[derive(Clone)]
pub struct DynamicPoolConfig {
    pub platform: String,
    pub provider: Arc<dyn CloudProvider>,
    pub instance_tag: String,
    pub max_instances: u32,
    /// The SSH secret every instance launched for this platform shares,
    /// distinct from a static host's per-host secret.
    pub ssh_secret: String,
}

pub enum AllocateOutcome {
    /// An instance was launched and its identifier recorded; a later
    /// reconcile resolves the address and launches the provisioning task.
    Launched,
    Waiting { requeue_after: Duration },
}

/// What to do next for a user task that already carries `CloudInstanceId`
/// but has no provisioning AuxTask yet.
pub enum ContinueOutcome {
    /// Address resolved; provisioning AuxTask created.
    Provisioned,
    /// Address not yet known; caller should requeue.
    AddressPending { requeue_after: Duration },
}

impl DynamicPoolConfig {
    /// Implements §4.5 step 1-2: count live instances against `maxInstances`
    /// and, if there's room, launch one.
    pub async fn allocate(
        &self,
        client: Client,
        user_task: &TaskRun,
    ) -> Result<AllocateOutcome, Error> {
        let count = self.provider.count_instances(&self.instance_tag).await?;
        if count >= self.max_instances {
            let label_value = keys::label_safe_platform(&self.platform);
            if user_task
                .labels()
                .get(keys::WAITING_FOR_PLATFORM)
                .map(String::as_str)
                != Some(label_value.as_str())
            {
                patch_metadata(client, user_task, |tr| {
                    tr.labels_mut()
                        .insert(keys::WAITING_FOR_PLATFORM.to_string(), label_value);
                })
                .await?;
            }
            return Ok(AllocateOutcome::Waiting {
                requeue_after: WAITING_REQUEUE,
            });
        }

        let name = user_task.name_any();
        let id = self
            .provider
            .launch_instance(&name, &self.instance_tag)
            .await?;
        patch_metadata(client, user_task, |tr| {
            tr.annotations_mut()
                .insert(keys::CLOUD_INSTANCE_ID.to_string(), id.clone());
            tr.labels_mut().remove(keys::WAITING_FOR_PLATFORM);
            tr.finalizers_mut().push(keys::FINALIZER.to_string());
        })
        .await?;
        Ok(AllocateOutcome::Launched)
    }

    /// Implements §4.5 step 3: resolves the instance's address and, once
    /// known, creates the provisioning AuxTask.
    pub async fn continue_provisioning(
        &self,
        client: Client,
        operator_namespace: &str,
        user_task: &TaskRun,
        instance_id: &InstanceIdentifier,
    ) -> Result<ContinueOutcome, Error> {
        match self.provider.get_instance_address(instance_id).await? {
            None => Ok(ContinueOutcome::AddressPending {
                requeue_after: ADDRESS_PENDING_REQUEUE,
            }),
            Some(address) => {
                launcher::launch_provisioning_task(
                    client,
                    operator_namespace,
                    user_task,
                    &self.ssh_secret,
                    &address,
                    self.provider.ssh_user(),
                )
                .await?;
                Ok(ContinueOutcome::Provisioned)
            }
        }
    }

    /// Terminates the cloud instance. Clearing the annotation and finalizer
    /// on the user task is the caller's responsibility (shared with the
    /// static pool's teardown path in `controller::user_task`).
    pub async fn terminate(&self, instance_id: &InstanceIdentifier) -> Result<(), Error> {
        self.provider.terminate_instance(instance_id).await
    }
}
