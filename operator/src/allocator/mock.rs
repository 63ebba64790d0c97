use super::cloud::{CloudProvider, CloudProviderFactory, InstanceIdentifier};
use crate::util::Error;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Registered under the `"mock"` key in the [`CloudProviderRegistry`]; used
/// by config maps in integration tests, never in production.
pub const FACTORY: CloudProviderFactory = mock_factory;

fn mock_factory(
    config: &HashMap<String, String>,
    _operator_namespace: &str,
) -> Result<Arc<dyn CloudProvider>, Error> {
    let ssh_user = config.get("ssh-user").cloned().unwrap_or_else(|| "root".to_string());
    let address_suffix = config
        .get("address-suffix")
        .cloned()
        .unwrap_or_else(|| ".host.com".to_string());
    Ok(Arc::new(MockCloudProvider::new(ssh_user, address_suffix)))
}

/// In-memory [`CloudProvider`] used by the reconciler's own test suite,
/// mirroring the `MockCloud` fixture the upstream test suite this allocator
/// is grounded on uses: launching an instance just records an address for
/// it, counting instances is a map length, and termination removes the
/// entry.
pub struct MockCloudProvider {
    addresses: Mutex<std::collections::HashMap<InstanceIdentifier, String>>,
    pub terminated: Mutex<u32>,
    ssh_user: String,
    address_suffix: String,
}

impl MockCloudProvider {
    pub fn new(ssh_user: impl Into<String>, address_suffix: impl Into<String>) -> Self {
        MockCloudProvider {
            addresses: Mutex::new(std::collections::HashMap::new()),
            terminated: Mutex::new(0),
            ssh_user: ssh_user.into(),
            address_suffix: address_suffix.into(),
        }
    }
}

#[async_trait::async_trait]
impl CloudProvider for MockCloudProvider {
    async fn count_instances(&self, _instance_tag: &str) -> Result<u32, Error> {
        Ok(self.addresses.lock().unwrap().len() as u32)
    }

    async fn launch_instance(
        &self,
        name: &str,
        instance_tag: &str,
    ) -> Result<InstanceIdentifier, Error> {
        let id = format!("{instance_tag}-{name}");
        let address = format!("{id}{}", self.address_suffix);
        self.addresses.lock().unwrap().insert(id.clone(), address);
        Ok(id)
    }

    async fn get_instance_address(&self, id: &InstanceIdentifier) -> Result<Option<String>, Error> {
        Ok(self.addresses.lock().unwrap().get(id).cloned())
    }

    async fn terminate_instance(&self, id: &InstanceIdentifier) -> Result<(), Error> {
        self.addresses.lock().unwrap().remove(id);
        *self.terminated.lock().unwrap() += 1;
        Ok(())
    }

    fn ssh_user(&self) -> &str {
        &self.ssh_user
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn launch_then_resolve_address() {
        let provider = MockCloudProvider::new("root", ".host.com");
        let id = provider
            .launch_instance("test", "multi-platform-builder")
            .await
            .unwrap();
        assert_eq!(id, "multi-platform-builder-test");
        let addr = provider.get_instance_address(&id).await.unwrap();
        assert_eq!(addr.as_deref(), Some("multi-platform-builder-test.host.com"));
    }

    #[tokio::test]
    async fn terminate_removes_address_and_counts() {
        let provider = MockCloudProvider::new("root", ".host.com");
        let id = provider.launch_instance("test", "tag").await.unwrap();
        assert_eq!(provider.count_instances("tag").await.unwrap(), 1);
        provider.terminate_instance(&id).await.unwrap();
        assert_eq!(provider.count_instances("tag").await.unwrap(), 0);
        assert_eq!(*provider.terminated.lock().unwrap(), 1);
    }
}
