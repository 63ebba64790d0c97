pub mod aux_task;
pub mod user_task;

use crate::allocator::PlatformConfig;
use crate::util::{
    self, Error,
    colors::{FG1, FG2},
};
use futures::stream::StreamExt;
use kube::{
    Api, ResourceExt,
    client::Client,
    runtime::{Controller, controller::Action as ControllerAction},
};
use kube_leader_election::{LeaseLock, LeaseLockParams};
use multi_platform_types::{TaskRun, keys};
use owo_colors::OwoColorize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "metrics")]
use crate::util::metrics::ControllerMetrics;

/// Entrypoint for the `TaskRun` controller. Runs leader election against a
/// `Lease` object and starts/stops the `kube_runtime::Controller` loop as
/// leadership is gained or lost, matching this codebase's other operators.
pub async fn run(
    client: Client,
    operator_namespace: String,
    config: HashMap<String, PlatformConfig>,
) -> Result<(), Error> {
    println!("{}", "Starting multi-platform-controller...".green());

    let context: Arc<ContextData> = Arc::new(ContextData::new(
        client.clone(),
        operator_namespace.clone(),
        config,
    ));

    let holder_id = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("multi-platform-controller-{}", uuid::Uuid::new_v4()));
    let lease_name = "multi-platform-controller-lock".to_string();
    let lease_ttl = Duration::from_secs(15);
    let renew_every = Duration::from_secs(5);
    let leadership = LeaseLock::new(
        client.clone(),
        &operator_namespace,
        LeaseLockParams {
            holder_id,
            lease_name,
            lease_ttl,
        },
    );

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        multi_platform_common::shutdown::shutdown_signal().await;
        shutdown_signal.cancel();
    });
    multi_platform_common::signal_ready();

    let mut controller_task: Option<tokio::task::JoinHandle<()>> = None;
    let mut tick = tokio::time::interval(renew_every);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                if let Some(task) = controller_task.take() {
                    task.abort();
                    task.await.ok();
                }
                break Ok(());
            },
            _ = tick.tick() => {}
        }
        let lease = match leadership.try_acquire_or_renew().await {
            Ok(l) => l,
            Err(e) => {
                eprintln!("leader election renew/acquire failed: {e}");
                if let Some(task) = controller_task.take() {
                    task.abort();
                    eprintln!("aborted controller due to leader election error");
                }
                continue;
            }
        };
        if lease.acquired_lease {
            if controller_task.is_none() {
                println!("acquired leadership; starting controller");
                let client_for_controller = client.clone();
                let context_for_controller = context.clone();
                let task_runs: Api<TaskRun> = Api::all(client_for_controller.clone());
                controller_task = Some(tokio::spawn(async move {
                    println!("{}", "multi-platform-controller started.".green());
                    Controller::new(task_runs, Default::default())
                        .run(reconcile, on_error, context_for_controller)
                        .for_each(|_res| async move {})
                        .await;
                }));
            }
        } else if let Some(task) = controller_task.take() {
            eprintln!("lost leadership; stopping controller");
            task.abort();
        }
    }
}

struct ContextData {
    client: Client,
    operator_namespace: String,
    config: HashMap<String, PlatformConfig>,

    #[cfg(feature = "metrics")]
    metrics: ControllerMetrics,
}

impl ContextData {
    fn new(client: Client, operator_namespace: String, config: HashMap<String, PlatformConfig>) -> Self {
        #[cfg(feature = "metrics")]
        {
            ContextData {
                client,
                operator_namespace,
                config,
                metrics: ControllerMetrics::new("multi_platform"),
            }
        }
        #[cfg(not(feature = "metrics"))]
        {
            ContextData {
                client,
                operator_namespace,
                config,
            }
        }
    }
}

/// Object classification by labels (§4.1): an AuxTask if `TaskType` is set,
/// a UserTask if the multi-platform marker is set, otherwise ignored.
enum Classification {
    AuxTask,
    UserTask,
    Ignore,
}

fn classify(tr: &TaskRun) -> Classification {
    if tr.labels().contains_key(keys::TASK_TYPE) {
        Classification::AuxTask
    } else if tr.labels().contains_key(keys::MULTI_PLATFORM) {
        Classification::UserTask
    } else {
        Classification::Ignore
    }
}

async fn reconcile(instance: Arc<TaskRun>, context: Arc<ContextData>) -> Result<ControllerAction, Error> {
    let client: Client = context.client.clone();
    let name = instance.name_any();
    let namespace = instance.namespace().unwrap_or_default();

    match classify(&instance) {
        Classification::Ignore => Ok(ControllerAction::await_change()),
        Classification::AuxTask => reconcile_aux_task(client, context, &instance, &name, &namespace).await,
        Classification::UserTask => reconcile_user_task(client, context, &instance, &name, &namespace).await,
    }
}

async fn reconcile_aux_task(
    client: Client,
    context: Arc<ContextData>,
    instance: &TaskRun,
    name: &str,
    namespace: &str,
) -> Result<ControllerAction, Error> {
    #[cfg(feature = "metrics")]
    context
        .metrics
        .reconcile_counter
        .with_label_values(&[name, namespace])
        .inc();
    #[cfg(feature = "metrics")]
    let start = std::time::Instant::now();

    let action = aux_task::determine_action(client.clone(), instance).await?;

    if action != aux_task::Action::NoOp {
        println!(
            "{}{}{}{}{}",
            namespace.color(FG2),
            "/".color(FG1),
            name.color(FG2),
            " AUX ACTION: ".color(FG1),
            action.as_str().color(FG2),
        );
    }

    #[cfg(feature = "metrics")]
    context
        .metrics
        .read_histogram
        .with_label_values(&[name, namespace, action.as_str()])
        .observe(start.elapsed().as_secs_f64());
    #[cfg(feature = "metrics")]
    context
        .metrics
        .action_counter
        .with_label_values(&[name, namespace, action.as_str()])
        .inc();

    #[cfg(feature = "metrics")]
    let timer = match action {
        aux_task::Action::NoOp => None,
        _ => Some(
            context
                .metrics
                .write_histogram
                .with_label_values(&[name, namespace, action.as_str()])
                .start_timer(),
        ),
    };

    aux_task::apply(client, &context.operator_namespace, instance, &action).await?;

    #[cfg(feature = "metrics")]
    if let Some(timer) = timer {
        timer.observe_duration();
    }

    Ok(ControllerAction::requeue(util::PROBE_INTERVAL))
}

async fn reconcile_user_task(
    client: Client,
    context: Arc<ContextData>,
    instance: &TaskRun,
    name: &str,
    namespace: &str,
) -> Result<ControllerAction, Error> {
    #[cfg(feature = "metrics")]
    context
        .metrics
        .reconcile_counter
        .with_label_values(&[name, namespace])
        .inc();
    #[cfg(feature = "metrics")]
    let start = std::time::Instant::now();

    let action = user_task::determine_action(
        client.clone(),
        &context.operator_namespace,
        &context.config,
        instance,
    )
    .await?;

    if action != user_task::Action::NoOp {
        println!(
            "{}{}{}{}{}",
            namespace.color(FG2),
            "/".color(FG1),
            name.color(FG2),
            " ACTION: ".color(FG1),
            format!("{action:?}").color(FG2),
        );
    }

    #[cfg(feature = "metrics")]
    context
        .metrics
        .read_histogram
        .with_label_values(&[name, namespace, action.as_str()])
        .observe(start.elapsed().as_secs_f64());
    #[cfg(feature = "metrics")]
    context
        .metrics
        .action_counter
        .with_label_values(&[name, namespace, action.as_str()])
        .inc();

    #[cfg(feature = "metrics")]
    let timer = match action {
        user_task::Action::NoOp => None,
        _ => Some(
            context
                .metrics
                .write_histogram
                .with_label_values(&[name, namespace, action.as_str()])
                .start_timer(),
        ),
    };

    let requeue_after = user_task::apply(
        client,
        &context.operator_namespace,
        &context.config,
        instance,
        &action,
    )
    .await?;

    #[cfg(feature = "metrics")]
    if let Some(timer) = timer {
        timer.observe_duration();
    }

    Ok(match requeue_after {
        Some(delay) => ControllerAction::requeue(delay),
        None => ControllerAction::requeue(util::PROBE_INTERVAL),
    })
}

fn on_error(instance: Arc<TaskRun>, error: &Error, _context: Arc<ContextData>) -> ControllerAction {
    eprintln!(
        "{}",
        format!("Reconciliation error: {:?} {:?}", error, instance.name_any()).red()
    );
    ControllerAction::requeue(Duration::from_secs(5))
}
