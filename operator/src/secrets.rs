use crate::util::{Error, MANAGER_NAME};
use k8s_openapi::api::core::v1::Secret;
use kube::{
    Api, Client, Resource, ResourceExt,
    api::{ObjectMeta, Patch, PatchParams},
};
use multi_platform_types::TaskRun;
use std::collections::BTreeMap;

/// The ResultSecret's name is derived entirely from the user task's name, so
/// both the allocator and the AuxTask reconciliation branch can compute it
/// without a round-trip.
pub fn result_secret_name(user_task_name: &str) -> String {
    format!("multi-platform-ssh-{user_task_name}")
}

fn secret(user_task: &TaskRun, data: BTreeMap<String, String>) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(result_secret_name(&user_task.name_any())),
            namespace: user_task.namespace(),
            owner_references: Some(vec![user_task.controller_owner_ref(&()).unwrap()]),
            ..Default::default()
        },
        string_data: Some(data),
        ..Default::default()
    }
}

/// Writes the terminal error ResultSecret. Presence of the `error` key is
/// itself the failure signal observed by the user task; once written, the
/// task is never subsequently bound to a host.
pub async fn put_error_secret(
    client: Client,
    user_task: &TaskRun,
    message: impl Into<String>,
) -> Result<(), Error> {
    let mut data = BTreeMap::new();
    data.insert("error".to_string(), message.into());
    apply(client, user_task, data).await
}

async fn apply(client: Client, user_task: &TaskRun, data: BTreeMap<String, String>) -> Result<(), Error> {
    let namespace = user_task
        .namespace()
        .ok_or_else(|| Error::UserInput("user task has no namespace".to_string()))?;
    let api: Api<Secret> = Api::namespaced(client, &namespace);
    let name = result_secret_name(&user_task.name_any());
    let secret = secret(user_task, data);
    api.patch(&name, &PatchParams::apply(MANAGER_NAME), &Patch::Apply(&secret))
        .await?;
    Ok(())
}

/// Whether a ResultSecret exists for this user task, regardless of content.
pub async fn exists(client: Client, namespace: &str, user_task_name: &str) -> Result<bool, Error> {
    let api: Api<Secret> = Api::namespaced(client, namespace);
    match api.get(&result_secret_name(user_task_name)).await {
        Ok(_) => Ok(true),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Deletes the ResultSecret, ignoring a 404 (already gone).
pub async fn delete(client: Client, namespace: &str, user_task_name: &str) -> Result<(), Error> {
    let api: Api<Secret> = Api::namespaced(client, namespace);
    match api
        .delete(&result_secret_name(user_task_name), &Default::default())
        .await
    {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}
