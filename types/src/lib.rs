use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Well-known labels and annotations that make up the externally observable
/// contract between this controller and the objects it reconciles. Nothing
/// in this module is private controller state: every key here can be read
/// (and, for a handful, written) by users and by the task definitions the
/// controller launches.
pub mod keys {
    /// Label marking a [`TaskRun`] as one this controller should schedule.
    pub const MULTI_PLATFORM: &str = "multi-platform";
    /// Param carrying the user's requested platform string, e.g. `linux/arm64`.
    pub const PLATFORM_PARAM: &str = "PLATFORM";
    /// Label naming the static host a user task has been bound to.
    pub const ASSIGNED_HOST: &str = "assigned-host";
    /// Annotation carrying the opaque identifier of a dynamically launched
    /// cloud instance.
    pub const CLOUD_INSTANCE_ID: &str = "cloud-instance-id";
    /// Label marking the platform a task is queued on. Its value is the
    /// platform string with `/` replaced by `-` (label values may not
    /// contain `/`).
    pub const WAITING_FOR_PLATFORM: &str = "waiting-for-platform";
    /// Annotation listing hosts already exhausted by provisioning failure
    /// for this task, comma separated.
    pub const FAILED_HOSTS: &str = "failed-hosts";
    /// Label distinguishing an auxiliary task (`provision` or `clean`) from
    /// a user task (label absent).
    pub const TASK_TYPE: &str = "task-type";
    /// Label on an aux task pointing back to the user task's name.
    pub const USER_TASK_NAME: &str = "user-task-name";
    /// Label on an aux task pointing back to the user task's namespace.
    pub const USER_TASK_NAMESPACE: &str = "user-task-namespace";

    pub const TASK_TYPE_PROVISION: &str = "provision";
    pub const TASK_TYPE_CLEAN: &str = "clean";

    /// Finalizer added while a host is bound, removed once teardown completes.
    pub const FINALIZER: &str = "tasks.multi-platform.dev/host-binding";

    /// Name of the `ssh` workspace every aux task binds to the host's
    /// credentials secret.
    pub const SSH_WORKSPACE: &str = "ssh";

    /// `TaskRef` names resolved by the external task library.
    pub const PROVISION_TASK_REF: &str = "provision-shared-host";
    pub const CLEAN_TASK_REF: &str = "clean-shared-host";

    /// Replaces `/` with `-` so a platform string is safe to use as a label
    /// value. Annotations are not subject to this restriction and always
    /// carry the platform string unmodified.
    pub fn label_safe_platform(platform: &str) -> String {
        platform.replace('/', "-")
    }
}

/// Reference to a task definition resolved by an external task library.
/// Only the name is consulted by this controller; the definition itself
/// is out of scope.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct TaskRef {
    pub name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct Param {
    pub name: String,
    pub value: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct WorkspaceBinding {
    pub name: String,
    #[serde(rename = "secretName")]
    pub secret_name: String,
}

/// A generic task-run, modeled after a Tekton-style `TaskRun`. Both the
/// user's build task and the provisioning/cleanup tasks this controller
/// launches are the same kind; which role an instance plays is determined
/// entirely by its labels (see [`keys`]), not by its Rust type.
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "tasks.multi-platform.dev",
    version = "v1",
    kind = "TaskRun",
    plural = "taskruns",
    derive = "PartialEq",
    status = "TaskRunStatus",
    namespaced
)]
#[kube(derive = "Default")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.completionTime\", \"name\": \"COMPLETED\", \"type\": \"date\" }"
)]
pub struct TaskRunSpec {
    #[serde(rename = "taskRef", skip_serializing_if = "Option::is_none")]
    pub task_ref: Option<TaskRef>,

    #[serde(default)]
    pub params: Vec<Param>,

    #[serde(default)]
    pub workspaces: Vec<WorkspaceBinding>,

    #[serde(rename = "serviceAccountName", skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
}

impl TaskRunSpec {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub const SUCCEEDED_CONDITION_TYPE: &str = "Succeeded";

/// Status object for the [`TaskRun`] resource.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default, JsonSchema)]
pub struct TaskRunStatus {
    /// Set once the task-run has finished running, regardless of outcome.
    #[serde(rename = "completionTime", skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<String>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TaskRun {
    /// Whether the underlying task-run has finished (successfully or not).
    pub fn is_completed(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.completion_time.is_some())
    }

    /// The `Succeeded` condition's status, if the task-run has reported one.
    pub fn succeeded_condition(&self) -> Option<ConditionStatus> {
        self.status
            .as_ref()?
            .conditions
            .iter()
            .find(|c| c.type_ == SUCCEEDED_CONDITION_TYPE)
            .map(|c| c.status)
    }

    /// `Some(true)`/`Some(false)` once resolved, `None` while still unknown
    /// or absent.
    pub fn succeeded(&self) -> Option<bool> {
        match self.succeeded_condition()? {
            ConditionStatus::True => Some(true),
            ConditionStatus::False => Some(false),
            ConditionStatus::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_run_with(completion_time: Option<&str>, succeeded: Option<ConditionStatus>) -> TaskRun {
        let mut tr = TaskRun::new("t", TaskRunSpec::default());
        tr.status = Some(TaskRunStatus {
            completion_time: completion_time.map(|s| s.to_string()),
            conditions: succeeded
                .into_iter()
                .map(|status| Condition {
                    type_: SUCCEEDED_CONDITION_TYPE.to_string(),
                    status,
                    message: None,
                })
                .collect(),
            message: None,
        });
        tr
    }

    #[test]
    fn not_completed_without_completion_time() {
        let tr = task_run_with(None, Some(ConditionStatus::True));
        assert!(!tr.is_completed());
    }

    #[test]
    fn completed_and_succeeded() {
        let tr = task_run_with(Some("2024-01-01T00:00:00Z"), Some(ConditionStatus::True));
        assert!(tr.is_completed());
        assert_eq!(tr.succeeded(), Some(true));
    }

    #[test]
    fn completed_and_failed() {
        let tr = task_run_with(Some("2024-01-01T00:00:00Z"), Some(ConditionStatus::False));
        assert_eq!(tr.succeeded(), Some(false));
    }

    #[test]
    fn label_safe_platform_replaces_slash() {
        assert_eq!(keys::label_safe_platform("linux/arm64"), "linux-arm64");
        assert_eq!(keys::label_safe_platform("powerpc"), "powerpc");
    }
}
