use super::MANAGER_NAME;
use kube::{
    Api, Client, Error,
    api::{Patch, PatchParams, Resource},
    core::NamespaceResourceScope,
};
use multi_platform_types::{TaskRun, TaskRunStatus};
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;

pub trait Object<S> {
    /// Returns a mutable reference to the status object, initializing it
    /// with the default value if it does not exist.
    fn mut_status(&mut self) -> &mut S;
}

impl Object<TaskRunStatus> for TaskRun {
    fn mut_status(&mut self) -> &mut TaskRunStatus {
        self.status.get_or_insert_with(Default::default)
    }
}

/// Patches the resource's status with the provided function and returns the
/// server's view of the updated object. `f` mutates a clone; the diff
/// against the original is sent as a JSON patch so concurrent writers to
/// other fields are not clobbered.
pub async fn patch_status<S, T>(
    client: Client,
    instance: &T,
    f: impl FnOnce(&mut S),
) -> Result<T, Error>
where
    <T as Resource>::DynamicType: Default,
    T: Clone
        + Resource
        + Object<S>
        + Serialize
        + DeserializeOwned
        + Debug
        + Resource<Scope = NamespaceResourceScope>,
{
    let patch = Patch::Json::<T>({
        let mut modified = instance.clone();
        f(modified.mut_status());
        json_patch::diff(
            &serde_json::to_value(instance).unwrap(),
            &serde_json::to_value(&modified).unwrap(),
        )
    });
    let name = instance.meta().name.as_deref().unwrap();
    let namespace = instance.meta().namespace.as_deref().unwrap();
    let api: Api<T> = Api::namespaced(client, namespace);
    api.patch_status(name, &PatchParams::apply(MANAGER_NAME), &patch)
        .await
}

/// Patches everything but the status (labels, annotations, finalizers) by
/// the same clone-mutate-diff recipe as [`patch_status`]. Used for the
/// allocator's bookkeeping writes (`AssignedHost`, `FailedHosts`,
/// `CloudInstanceId`, the teardown finalizer, ...).
pub async fn patch_metadata<T>(client: Client, instance: &T, f: impl FnOnce(&mut T)) -> Result<T, Error>
where
    <T as Resource>::DynamicType: Default,
    T: Clone
        + Resource
        + Serialize
        + DeserializeOwned
        + Debug
        + Resource<Scope = NamespaceResourceScope>,
{
    let patch = Patch::Json::<T>({
        let mut modified = instance.clone();
        f(&mut modified);
        json_patch::diff(
            &serde_json::to_value(instance).unwrap(),
            &serde_json::to_value(&modified).unwrap(),
        )
    });
    let name = instance.meta().name.as_deref().unwrap();
    let namespace = instance.meta().namespace.as_deref().unwrap();
    let api: Api<T> = Api::namespaced(client, namespace);
    api.patch(name, &PatchParams::apply(MANAGER_NAME), &patch)
        .await
}
