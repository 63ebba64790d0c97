use crate::util::Error;
use kube::{Api, Client, ResourceExt, api::PostParams};
use multi_platform_types::{Param, TaskRef, TaskRun, TaskRunSpec, WorkspaceBinding, keys};
use uuid::Uuid;

/// Creates a provisioning AuxTask in the controller's operator namespace,
/// bound to `ssh_secret`, targeting `host`/`user`. Never waits for the
/// AuxTask to complete; a future event on it drives the next transition.
pub async fn launch_provisioning_task(
    client: Client,
    operator_namespace: &str,
    user_task: &TaskRun,
    ssh_secret: &str,
    host: &str,
    user: &str,
) -> Result<(), Error> {
    launch_aux_task(
        client,
        operator_namespace,
        user_task,
        keys::TASK_TYPE_PROVISION,
        keys::PROVISION_TASK_REF,
        "provision-task",
        ssh_secret,
        host,
        user,
    )
    .await
}

/// Creates a cleanup AuxTask that wipes the per-build working directory on
/// the given host once the user task that occupied it has completed.
pub async fn launch_cleanup_task(
    client: Client,
    operator_namespace: &str,
    user_task: &TaskRun,
    ssh_secret: &str,
    host: &str,
    user: &str,
) -> Result<(), Error> {
    launch_aux_task(
        client,
        operator_namespace,
        user_task,
        keys::TASK_TYPE_CLEAN,
        keys::CLEAN_TASK_REF,
        "cleanup-task",
        ssh_secret,
        host,
        user,
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn launch_aux_task(
    client: Client,
    operator_namespace: &str,
    user_task: &TaskRun,
    task_type: &str,
    task_ref: &str,
    name_prefix: &str,
    ssh_secret: &str,
    host: &str,
    user: &str,
) -> Result<(), Error> {
    let user_task_name = user_task.name_any();
    let user_task_namespace = user_task
        .namespace()
        .ok_or_else(|| Error::UserInput("user task has no namespace".to_string()))?;

    let mut labels = std::collections::BTreeMap::new();
    labels.insert(keys::TASK_TYPE.to_string(), task_type.to_string());
    labels.insert(keys::USER_TASK_NAME.to_string(), user_task_name.clone());
    labels.insert(keys::USER_TASK_NAMESPACE.to_string(), user_task_namespace.clone());
    labels.insert(keys::MULTI_PLATFORM.to_string(), "true".to_string());

    let aux_task = TaskRun::new(
        &format!("{name_prefix}-{}", Uuid::new_v4()),
        TaskRunSpec {
            task_ref: Some(TaskRef {
                name: task_ref.to_string(),
            }),
            params: vec![
                Param {
                    name: "SECRET_NAME".to_string(),
                    value: crate::secrets::result_secret_name(&user_task_name),
                },
                Param {
                    name: "TASKRUN_NAME".to_string(),
                    value: user_task_name,
                },
                Param {
                    name: "NAMESPACE".to_string(),
                    value: user_task_namespace,
                },
                Param {
                    name: "HOST".to_string(),
                    value: host.to_string(),
                },
                Param {
                    name: "USER".to_string(),
                    value: user.to_string(),
                },
            ],
            workspaces: vec![WorkspaceBinding {
                name: keys::SSH_WORKSPACE.to_string(),
                secret_name: ssh_secret.to_string(),
            }],
            service_account_name: None,
        },
    );
    let mut aux_task = aux_task;
    aux_task.meta_mut().labels = Some(labels);

    let api: Api<TaskRun> = Api::namespaced(client, operator_namespace);
    api.create(&PostParams::default(), &aux_task).await?;
    Ok(())
}
