pub mod cloud;
pub mod dynamic_pool;
pub mod ec2;
pub mod mock;
pub mod static_pool;

pub use cloud::{CloudProvider, CloudProviderFactory, CloudProviderRegistry, InstanceIdentifier};
pub use dynamic_pool::DynamicPoolConfig;
pub use static_pool::{Host, HostPool};

/// A parsed, platform-keyed entry from the config map: either a shared pool
/// of statically-configured hosts or a cloud-backed dynamic pool. This is
/// the only sum type in the allocator — both variants expose `allocate`/
/// the relevant teardown call directly, with no further dynamic dispatch.
#[derive(Clone)]
pub enum PlatformConfig {
    StaticPool(HostPool),
    DynamicPool(DynamicPoolConfig),
}

/// The registry shipped by default: `"aws-ec2"` and `"mock"`. Callers that
/// need only one, or an additional third-party provider, are free to build
/// their own `CloudProviderRegistry` instead of calling this.
pub fn default_registry() -> CloudProviderRegistry {
    let mut registry: CloudProviderRegistry = HashMap::new();
    registry.insert("aws-ec2".to_string(), ec2::FACTORY);
    registry.insert("mock".to_string(), mock::FACTORY);
    registry
}

use std::collections::HashMap;
