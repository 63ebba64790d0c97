use crate::launcher;
use crate::secrets;
use crate::util::{Error, WAITING_REQUEUE, messages, patch::patch_metadata};
use kube::{Api, Client, ResourceExt, api::ListParams};
use multi_platform_types::{TaskRun, keys};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// A single statically-configured remote build host.
#[derive(Clone, Debug, PartialEq)]
pub struct Host {
    pub name: String,
    pub address: String,
    pub user: String,
    pub secret: String,
    pub concurrency: u32,
    pub platform: String,
}

/// The full set of hosts carved out of the operator's config map, keyed by
/// host name. A given `Reconcile` filters this to the one target platform,
/// matching the upstream `readConfiguration` contract.
#[derive(Clone, Debug, Default)]
pub struct HostPool {
    pub hosts: HashMap<String, Host>,
}

/// Result of one allocation attempt against a static host pool.
pub enum AllocateOutcome {
    /// A host was bound and a provisioning AuxTask launched.
    Bound,
    /// No free capacity right now; caller should requeue after the given
    /// delay.
    Waiting { requeue_after: Duration },
    /// No candidate host exists at all (no match, or all in `FailedHosts`);
    /// an error ResultSecret has already been written.
    Exhausted,
}

impl HostPool {
    fn hosts_for(&self, platform: &str) -> impl Iterator<Item = &Host> {
        self.hosts.values().filter(move |h| h.platform == platform)
    }

    /// Implements §4.4: parses `FailedHosts`, computes current per-host load
    /// from the live cluster view, picks the host with most free capacity,
    /// and either binds it (launching a provisioning AuxTask) or marks the
    /// task waiting.
    pub async fn allocate(
        &self,
        client: Client,
        operator_namespace: &str,
        user_task: &TaskRun,
        platform: &str,
    ) -> Result<AllocateOutcome, Error> {
        let failed = failed_hosts(user_task);

        let candidates: Vec<&Host> = self
            .hosts_for(platform)
            .filter(|h| !failed.contains(h.name.as_str()))
            .collect();

        if candidates.is_empty() {
            let attempted: Vec<String> = self.hosts_for(platform).map(|h| h.name.clone()).collect();
            let message = if attempted.is_empty() {
                messages::no_config_for_platform(platform)
            } else {
                messages::hosts_exhausted(platform, &attempted)
            };
            secrets::put_error_secret(client, user_task, message).await?;
            return Ok(AllocateOutcome::Exhausted);
        }

        let load = current_load(client.clone()).await?;
        let chosen = candidates
            .into_iter()
            .max_by_key(|h| h.concurrency as i64 - *load.get(h.name.as_str()).unwrap_or(&0) as i64)
            .expect("candidates is non-empty");
        let free = chosen.concurrency as i64 - *load.get(chosen.name.as_str()).unwrap_or(&0) as i64;

        if free <= 0 {
            let label_value = keys::label_safe_platform(platform);
            if user_task
                .labels()
                .get(keys::WAITING_FOR_PLATFORM)
                .map(String::as_str)
                == Some(label_value.as_str())
            {
                return Ok(AllocateOutcome::Waiting {
                    requeue_after: WAITING_REQUEUE,
                });
            }
            patch_metadata(client, user_task, |tr| {
                tr.labels_mut()
                    .insert(keys::WAITING_FOR_PLATFORM.to_string(), label_value);
            })
            .await?;
            return Ok(AllocateOutcome::Waiting {
                requeue_after: WAITING_REQUEUE,
            });
        }

        let chosen_name = chosen.name.clone();
        let bound_task = patch_metadata(client.clone(), user_task, |tr| {
            tr.labels_mut()
                .insert(keys::ASSIGNED_HOST.to_string(), chosen_name.clone());
            tr.labels_mut().remove(keys::WAITING_FOR_PLATFORM);
            tr.finalizers_mut().push(keys::FINALIZER.to_string());
        })
        .await?;

        match launcher::launch_provisioning_task(
            client.clone(),
            operator_namespace,
            &bound_task,
            &chosen.secret,
            &chosen.address,
            &chosen.user,
        )
        .await
        {
            Ok(()) => Ok(AllocateOutcome::Bound),
            Err(e) => {
                let _ = patch_metadata(client.clone(), &bound_task, |tr| {
                    tr.labels_mut().remove(keys::ASSIGNED_HOST);
                })
                .await;
                let _ = secrets::put_error_secret(
                    client,
                    &bound_task,
                    format!("failed to launch provisioning task: {e}"),
                )
                .await;
                Err(e)
            }
        }
    }

    /// Implements the static side of §4.4.8/teardown: creates a cleanup
    /// AuxTask against the host the user task was bound to.
    pub async fn deallocate(
        &self,
        client: Client,
        operator_namespace: &str,
        user_task: &TaskRun,
        assigned_host: &str,
    ) -> Result<(), Error> {
        let host = self.hosts.get(assigned_host).ok_or_else(|| {
            Error::Configuration(format!("host '{assigned_host}' is no longer configured"))
        })?;
        launcher::launch_cleanup_task(
            client,
            operator_namespace,
            user_task,
            &host.secret,
            &host.address,
            &host.user,
        )
        .await
    }
}

fn failed_hosts(user_task: &TaskRun) -> HashSet<String> {
    user_task
        .annotations()
        .get(keys::FAILED_HOSTS)
        .map(|v| v.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

/// Builds `load[host] = count of user tasks (no TaskType label) currently
/// assigned to host`, scanning every task-run in the cluster. This list may
/// be slightly stale; per-host concurrency is eventual, not strict.
async fn current_load(client: Client) -> Result<HashMap<String, u32>, Error> {
    let api: Api<TaskRun> = Api::all(client);
    let lp = ListParams::default().labels(keys::ASSIGNED_HOST);
    let list = api.list(&lp).await?;
    let mut load = HashMap::new();
    for tr in list {
        if tr.labels().contains_key(keys::TASK_TYPE) {
            continue;
        }
        if let Some(host) = tr.labels().get(keys::ASSIGNED_HOST) {
            *load.entry(host.clone()).or_insert(0u32) += 1;
        }
    }
    Ok(load)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(name: &str, platform: &str, concurrency: u32) -> Host {
        Host {
            name: name.to_string(),
            address: format!("{name}.example.com"),
            user: "ec2-user".to_string(),
            secret: format!("{name}-ssh"),
            concurrency,
            platform: platform.to_string(),
        }
    }

    #[test]
    fn failed_hosts_parses_comma_separated_annotation() {
        let mut tr = TaskRun::new("t", Default::default());
        tr.annotations_mut()
            .insert(keys::FAILED_HOSTS.to_string(), "host1,host2".to_string());
        let failed = failed_hosts(&tr);
        assert!(failed.contains("host1"));
        assert!(failed.contains("host2"));
        assert_eq!(failed.len(), 2);
    }

    #[test]
    fn failed_hosts_empty_when_annotation_absent() {
        let tr = TaskRun::new("t", Default::default());
        assert!(failed_hosts(&tr).is_empty());
    }

    #[test]
    fn hosts_for_filters_by_platform() {
        let mut pool = HostPool::default();
        pool.hosts.insert("h1".to_string(), host("h1", "linux/arm64", 4));
        pool.hosts.insert("h2".to_string(), host("h2", "linux/amd64", 4));
        let matched: Vec<_> = pool.hosts_for("linux/arm64").collect();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "h1");
    }
}
