use crate::secrets;
use crate::util::{Error, messages, patch::patch_metadata};
use kube::{Api, Client, ResourceExt};
use multi_platform_types::{TaskRun, keys};

/// Decision for an auxiliary (provisioning/cleanup) task-run — see §4.2.
#[derive(Debug, PartialEq)]
pub enum Action {
    NoOp,
    CleanupDone,
    ProvisionSucceeded,
    ProvisionSucceededNoSecret,
    ProvisionFailed,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::NoOp => "NoOp",
            Action::CleanupDone => "CleanupDone",
            Action::ProvisionSucceeded => "ProvisionSucceeded",
            Action::ProvisionSucceededNoSecret => "ProvisionSucceededNoSecret",
            Action::ProvisionFailed => "ProvisionFailed",
        }
    }
}

pub async fn determine_action(client: Client, aux_task: &TaskRun) -> Result<Action, Error> {
    if !aux_task.is_completed() {
        return Ok(Action::NoOp);
    }

    if aux_task.labels().get(keys::TASK_TYPE).map(String::as_str) == Some(keys::TASK_TYPE_CLEAN) {
        return Ok(Action::CleanupDone);
    }

    // Provisioning task. A missing or `Unknown` Succeeded condition on a
    // completed task-run is treated the same as failure: crediting a user
    // task with a host it can't confirm it received is the wrong default.
    if aux_task.succeeded() == Some(true) {
        let (user_task_name, user_task_namespace) = user_task_ref(aux_task)?;
        if secrets::exists(client, &user_task_namespace, &user_task_name).await? {
            Ok(Action::ProvisionSucceeded)
        } else {
            Ok(Action::ProvisionSucceededNoSecret)
        }
    } else {
        Ok(Action::ProvisionFailed)
    }
}

pub async fn apply(
    client: Client,
    operator_namespace: &str,
    aux_task: &TaskRun,
    action: &Action,
) -> Result<(), Error> {
    match action {
        Action::NoOp => Ok(()),
        Action::CleanupDone | Action::ProvisionSucceeded => {
            delete_aux(client, operator_namespace, aux_task).await
        }
        Action::ProvisionSucceededNoSecret => {
            let user_task = fetch_user_task(client.clone(), aux_task).await?;
            secrets::put_error_secret(client.clone(), &user_task, messages::PROVISION_SUCCEEDED_NO_SECRET)
                .await?;
            delete_aux(client, operator_namespace, aux_task).await
        }
        Action::ProvisionFailed => {
            let user_task = fetch_user_task(client.clone(), aux_task).await?;
            let host = aux_task
                .spec
                .param("HOST")
                .map(str::to_string)
                .or_else(|| user_task.labels().get(keys::ASSIGNED_HOST).cloned());

            patch_metadata(client.clone(), &user_task, |tr| {
                if let Some(host) = &host {
                    append_failed_host(tr, host);
                }
                tr.labels_mut().remove(keys::ASSIGNED_HOST);
                tr.annotations_mut().remove(keys::CLOUD_INSTANCE_ID);
            })
            .await?;
            delete_aux(client, operator_namespace, aux_task).await
        }
    }
}

/// Appends `host` to the `FailedHosts` annotation, de-duplicating so
/// repeated delivery of the same failure is idempotent (§5).
fn append_failed_host(tr: &mut TaskRun, host: &str) {
    let existing = tr.annotations().get(keys::FAILED_HOSTS).cloned().unwrap_or_default();
    let mut hosts: Vec<&str> = existing.split(',').filter(|s| !s.is_empty()).collect();
    if !hosts.contains(&host) {
        hosts.push(host);
    }
    tr.annotations_mut()
        .insert(keys::FAILED_HOSTS.to_string(), hosts.join(","));
}

fn user_task_ref(aux_task: &TaskRun) -> Result<(String, String), Error> {
    let name = aux_task
        .labels()
        .get(keys::USER_TASK_NAME)
        .cloned()
        .ok_or_else(|| Error::UserInput("aux task is missing the user-task-name label".to_string()))?;
    let namespace = aux_task
        .labels()
        .get(keys::USER_TASK_NAMESPACE)
        .cloned()
        .ok_or_else(|| {
            Error::UserInput("aux task is missing the user-task-namespace label".to_string())
        })?;
    Ok((name, namespace))
}

async fn fetch_user_task(client: Client, aux_task: &TaskRun) -> Result<TaskRun, Error> {
    let (name, namespace) = user_task_ref(aux_task)?;
    let api: Api<TaskRun> = Api::namespaced(client, &namespace);
    Ok(api.get(&name).await?)
}

async fn delete_aux(client: Client, operator_namespace: &str, aux_task: &TaskRun) -> Result<(), Error> {
    let api: Api<TaskRun> = Api::namespaced(client, operator_namespace);
    api.delete(&aux_task.name_any(), &Default::default()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_failed_host_is_idempotent() {
        let mut tr = TaskRun::new("t", Default::default());
        append_failed_host(&mut tr, "host1");
        append_failed_host(&mut tr, "host1");
        append_failed_host(&mut tr, "host2");
        assert_eq!(
            tr.annotations().get(keys::FAILED_HOSTS).unwrap(),
            "host1,host2"
        );
    }
}
