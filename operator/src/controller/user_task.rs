use crate::allocator::{PlatformConfig, dynamic_pool, static_pool};
use crate::secrets;
use crate::util::{Error, messages, patch::patch_metadata};
use kube::{Api, Client, ResourceExt, api::ListParams};
use multi_platform_types::{TaskRun, keys};
use std::collections::HashMap;
use std::time::Duration;

/// Decision for a user task, derived fresh from its labels/annotations/
/// status every reconcile — see §4.3.
#[derive(Debug, PartialEq)]
pub enum Action {
    /// Phase B: a provisioning AuxTask already exists (static) or is being
    /// driven by a separate pass (dynamic, address already resolved).
    NoOp,
    Requeue(Duration),
    /// Phase A: the user task finished; tear everything down.
    Teardown,
    /// Phase C, static pool configured for this platform.
    AllocateStatic(String),
    /// Phase C, dynamic pool configured for this platform.
    AllocateDynamic(String),
    /// Phase B, dynamic: `CloudInstanceId` is set but no provisioning
    /// AuxTask exists yet; resolve the address and create one.
    ContinueDynamic(String),
    /// Phase C, nothing configured for the requested platform at all.
    NoConfigForPlatform(String),
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::NoOp => "NoOp",
            Action::Requeue(_) => "Requeue",
            Action::Teardown => "Teardown",
            Action::AllocateStatic(_) => "AllocateStatic",
            Action::AllocateDynamic(_) => "AllocateDynamic",
            Action::ContinueDynamic(_) => "ContinueDynamic",
            Action::NoConfigForPlatform(_) => "NoConfigForPlatform",
        }
    }
}

fn platform_param(user_task: &TaskRun) -> Result<&str, Error> {
    user_task
        .spec
        .param(keys::PLATFORM_PARAM)
        .ok_or_else(|| Error::UserInput("user task has no PLATFORM param".to_string()))
}

/// Read phase: classifies which of phases A/B/C the task is in and what
/// should happen next. Performs no writes.
pub async fn determine_action(
    client: Client,
    operator_namespace: &str,
    config: &HashMap<String, PlatformConfig>,
    user_task: &TaskRun,
) -> Result<Action, Error> {
    if user_task.is_completed() {
        return Ok(Action::Teardown);
    }

    if let Some(instance_id) = user_task.annotations().get(keys::CLOUD_INSTANCE_ID) {
        if aux_task_exists(
            client,
            operator_namespace,
            &user_task.name_any(),
            keys::TASK_TYPE_PROVISION,
        )
        .await?
        {
            return Ok(Action::NoOp);
        }
        return Ok(Action::ContinueDynamic(instance_id.clone()));
    }

    if user_task.labels().contains_key(keys::ASSIGNED_HOST) {
        // A provisioning AuxTask was already created synchronously by the
        // static allocator's bind step; nothing to do until it completes.
        return Ok(Action::NoOp);
    }

    let platform = platform_param(user_task)?.to_string();
    match config.get(&platform) {
        None => Ok(Action::NoConfigForPlatform(platform)),
        Some(PlatformConfig::StaticPool(_)) => Ok(Action::AllocateStatic(platform)),
        Some(PlatformConfig::DynamicPool(_)) => Ok(Action::AllocateDynamic(platform)),
    }
}

async fn aux_task_exists(
    client: Client,
    operator_namespace: &str,
    user_task_name: &str,
    task_type: &str,
) -> Result<bool, Error> {
    let api: Api<TaskRun> = Api::namespaced(client, operator_namespace);
    let selector = format!(
        "{}={},{}={}",
        keys::USER_TASK_NAME,
        user_task_name,
        keys::TASK_TYPE,
        task_type
    );
    let lp = ListParams::default().labels(&selector);
    let list = api.list(&lp).await?;
    Ok(!list.items.is_empty())
}

/// Write phase: carries out the given `Action`, including the allocator
/// dispatch for phase C.
pub async fn apply(
    client: Client,
    operator_namespace: &str,
    config: &HashMap<String, PlatformConfig>,
    user_task: &TaskRun,
    action: &Action,
) -> Result<Option<Duration>, Error> {
    match action {
        Action::NoOp => Ok(None),
        Action::Requeue(d) => Ok(Some(*d)),
        Action::Teardown => {
            teardown(client, operator_namespace, config, user_task).await?;
            Ok(None)
        }
        Action::NoConfigForPlatform(platform) => {
            secrets::put_error_secret(client, user_task, messages::no_config_for_platform(platform)).await?;
            Ok(None)
        }
        Action::AllocateStatic(platform) => {
            let Some(PlatformConfig::StaticPool(pool)) = config.get(platform) else {
                return Err(Error::Configuration(format!(
                    "platform '{platform}' is no longer a static pool"
                )));
            };
            match pool.allocate(client, operator_namespace, user_task, platform).await? {
                static_pool::AllocateOutcome::Bound => Ok(None),
                static_pool::AllocateOutcome::Waiting { requeue_after } => Ok(Some(requeue_after)),
                static_pool::AllocateOutcome::Exhausted => Ok(None),
            }
        }
        Action::AllocateDynamic(platform) => {
            let Some(PlatformConfig::DynamicPool(cfg)) = config.get(platform) else {
                return Err(Error::Configuration(format!(
                    "platform '{platform}' is no longer a dynamic pool"
                )));
            };
            match cfg.allocate(client, user_task).await? {
                dynamic_pool::AllocateOutcome::Launched => Ok(None),
                dynamic_pool::AllocateOutcome::Waiting { requeue_after } => Ok(Some(requeue_after)),
            }
        }
        Action::ContinueDynamic(instance_id) => {
            let platform = platform_param(user_task)?;
            let Some(PlatformConfig::DynamicPool(cfg)) = config.get(platform) else {
                return Err(Error::Configuration(format!(
                    "platform '{platform}' is no longer a dynamic pool"
                )));
            };
            match cfg
                .continue_provisioning(client, operator_namespace, user_task, instance_id)
                .await?
            {
                dynamic_pool::ContinueOutcome::Provisioned => Ok(None),
                dynamic_pool::ContinueOutcome::AddressPending { requeue_after } => Ok(Some(requeue_after)),
            }
        }
    }
}

/// Implements §4.3 Phase A: releases the host (cleanup task or cloud
/// termination), deletes the ResultSecret, wakes up anyone waiting on this
/// platform, and removes the finalizer.
async fn teardown(
    client: Client,
    operator_namespace: &str,
    config: &HashMap<String, PlatformConfig>,
    user_task: &TaskRun,
) -> Result<(), Error> {
    let namespace = user_task
        .namespace()
        .ok_or_else(|| Error::UserInput("user task has no namespace".to_string()))?;
    let name = user_task.name_any();
    let platform = user_task.spec.param(keys::PLATFORM_PARAM).map(str::to_string);

    if let Some(host) = user_task.labels().get(keys::ASSIGNED_HOST).cloned() {
        if let Some(PlatformConfig::StaticPool(pool)) = platform.as_deref().and_then(|p| config.get(p)) {
            pool.deallocate(client.clone(), operator_namespace, user_task, &host).await?;
        }
    } else if let Some(instance_id) = user_task.annotations().get(keys::CLOUD_INSTANCE_ID).cloned() {
        if let Some(PlatformConfig::DynamicPool(cfg)) = platform.as_deref().and_then(|p| config.get(p)) {
            cfg.terminate(&instance_id).await?;
        }
    }

    secrets::delete(client.clone(), &namespace, &name).await?;
    if let Some(platform) = &platform {
        clear_waiting_label(client.clone(), platform).await?;
    }

    patch_metadata(client, user_task, |tr| {
        tr.labels_mut().remove(keys::ASSIGNED_HOST);
        tr.annotations_mut().remove(keys::CLOUD_INSTANCE_ID);
        tr.finalizers_mut().retain(|f| f != keys::FINALIZER);
    })
    .await?;
    Ok(())
}

/// Clears `WaitingForPlatform` on every task-run queued on `platform`,
/// which is the wake-up signal that triggers their next allocation attempt.
async fn clear_waiting_label(client: Client, platform: &str) -> Result<(), Error> {
    let label_value = keys::label_safe_platform(platform);
    let api: Api<TaskRun> = Api::all(client.clone());
    let selector = format!("{}={}", keys::WAITING_FOR_PLATFORM, label_value);
    let lp = ListParams::default().labels(&selector);
    let list = api.list(&lp).await?;
    for waiting in &list {
        patch_metadata(client.clone(), waiting, |tr| {
            tr.labels_mut().remove(keys::WAITING_FOR_PLATFORM);
        })
        .await?;
    }
    Ok(())
}
