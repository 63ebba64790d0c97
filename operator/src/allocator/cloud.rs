use crate::util::Error;
use std::collections::HashMap;
use std::sync::Arc;

/// Opaque identifier returned by a cloud provider on launch and threaded
/// back through `CloudInstanceId` on the user task. Providers are free to
/// use whatever format they like; the controller never parses it.
pub type InstanceIdentifier = String;

/// The capability the dynamic allocator consumes. Implementations are
/// expected to be cheap to clone (an `Arc` internally, or similar) since one
/// instance is shared across every reconcile for a platform.
#[async_trait::async_trait]
pub trait CloudProvider: Send + Sync {
    /// Count currently live instances tagged with `instance_tag`.
    async fn count_instances(&self, instance_tag: &str) -> Result<u32, Error>;

    /// Launch a new instance tagged with `instance_tag`, named `name`.
    async fn launch_instance(
        &self,
        name: &str,
        instance_tag: &str,
    ) -> Result<InstanceIdentifier, Error>;

    /// Resolve the instance's address. Returns `None` while the address is
    /// not yet assigned (not an error: the caller should requeue).
    async fn get_instance_address(&self, id: &InstanceIdentifier) -> Result<Option<String>, Error>;

    /// Terminate the instance. Idempotent: terminating an already-gone
    /// instance is not an error.
    async fn terminate_instance(&self, id: &InstanceIdentifier) -> Result<(), Error>;

    /// The SSH user the provisioning task should use to connect.
    fn ssh_user(&self) -> &str;
}

/// Constructs a [`CloudProvider`] from the config-map fragment for one
/// dynamic platform entry. `operator_namespace` is passed through so a
/// provider can resolve secrets (e.g. AWS credentials) relative to it.
pub type CloudProviderFactory = fn(
    config: &HashMap<String, String>,
    operator_namespace: &str,
) -> Result<Arc<dyn CloudProvider>, Error>;

/// Maps a provider `type` string (e.g. `aws-ec2`, `mock`) to its factory.
/// Built once at startup and handed to the reconciler context explicitly —
/// there is no process-wide registry.
pub type CloudProviderRegistry = HashMap<String, CloudProviderFactory>;
