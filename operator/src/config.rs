use crate::allocator::{CloudProviderRegistry, DynamicPoolConfig, Host, HostPool, PlatformConfig};
use crate::util::Error;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{Api, Client};
use multi_platform_types::keys::label_safe_platform;
use std::collections::HashMap;

/// Reads the operator's config map and produces a platform-keyed,
/// ready-to-use set of allocators. Owned by this crate: the config-map
/// *format* is fixed (§6), but the parser that turns it into `HostPool`/
/// `DynamicPoolConfig` values lives here.
pub async fn load_platform_config(
    client: Client,
    namespace: &str,
    name: &str,
    operator_namespace: &str,
    registry: &CloudProviderRegistry,
) -> Result<HashMap<String, PlatformConfig>, Error> {
    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    let cm = config_maps.get(name).await?;
    let data = cm.data.unwrap_or_default();

    let mut result = parse_static_pools(&data)?;
    parse_dynamic_pools(client, &data, operator_namespace, registry, &mut result).await?;
    Ok(result)
}

fn parse_static_pools(data: &HashMap<String, String>) -> Result<HashMap<String, PlatformConfig>, Error> {
    let mut hosts: HashMap<String, Host> = HashMap::new();

    for (key, value) in data {
        let Some(rest) = key.strip_prefix("host.") else {
            continue;
        };
        let Some((host_name, field)) = rest.split_once('.') else {
            continue;
        };
        let host = hosts.entry(host_name.to_string()).or_insert_with(|| Host {
            name: host_name.to_string(),
            address: String::new(),
            user: String::new(),
            secret: String::new(),
            concurrency: 0,
            platform: String::new(),
        });
        match field {
            "address" => host.address = value.clone(),
            "secret" => host.secret = value.clone(),
            "user" => host.user = value.clone(),
            "platform" => host.platform = value.clone(),
            "concurrency" => {
                host.concurrency = value.parse().map_err(|_| {
                    Error::Configuration(format!(
                        "host.{host_name}.concurrency is not an integer: '{value}'"
                    ))
                })?
            }
            _ => {}
        }
    }

    for host in hosts.values() {
        if host.address.is_empty() || host.secret.is_empty() || host.user.is_empty() || host.platform.is_empty() {
            return Err(Error::Configuration(format!(
                "host '{}' is missing one of address/secret/user/platform",
                host.name
            )));
        }
    }

    let mut result: HashMap<String, PlatformConfig> = HashMap::new();
    for host in hosts.into_values() {
        let entry = result
            .entry(host.platform.clone())
            .or_insert_with(|| PlatformConfig::StaticPool(HostPool::default()));
        if let PlatformConfig::StaticPool(pool) = entry {
            pool.hosts.insert(host.name.clone(), host);
        }
    }
    Ok(result)
}

async fn parse_dynamic_pools(
    client: Client,
    data: &HashMap<String, String>,
    operator_namespace: &str,
    registry: &CloudProviderRegistry,
    result: &mut HashMap<String, PlatformConfig>,
) -> Result<(), Error> {
    let Some(platforms) = data.get("dynamic-platforms") else {
        return Ok(());
    };

    for platform in platforms.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let key_plat = label_safe_platform(platform);
        let prefix = format!("dynamic.{key_plat}.");

        let mut provider_config: HashMap<String, String> = HashMap::new();
        for optional_field in ["region", "ami", "instance-type", "key-name", "ssh-user", "address-suffix"] {
            if let Some(v) = data.get(&format!("{prefix}{optional_field}")) {
                provider_config.insert(optional_field.to_string(), v.clone());
            }
        }
        if let Some(aws_secret_name) = data.get(&format!("{prefix}aws-secret")) {
            let (access_key_id, secret_access_key) =
                read_aws_credentials(client.clone(), operator_namespace, aws_secret_name).await?;
            provider_config.insert("access-key-id".to_string(), access_key_id);
            provider_config.insert("secret-access-key".to_string(), secret_access_key);
        }

        let dynamic_pool = dynamic_pool_from_fields(platform, &key_plat, data, &provider_config, operator_namespace, registry)?;
        result.insert(platform.to_string(), PlatformConfig::DynamicPool(dynamic_pool));
    }
    Ok(())
}

/// Pure part of dynamic-pool parsing: everything except resolving the
/// `aws-secret` reference, which needs a live cluster read and is handled
/// by the caller before this runs.
fn dynamic_pool_from_fields(
    platform: &str,
    key_plat: &str,
    data: &HashMap<String, String>,
    provider_config: &HashMap<String, String>,
    operator_namespace: &str,
    registry: &CloudProviderRegistry,
) -> Result<DynamicPoolConfig, Error> {
    let prefix = format!("dynamic.{key_plat}.");
    let field = |name: &str| -> Result<String, Error> {
        data.get(&format!("{prefix}{name}")).cloned().ok_or_else(|| {
            Error::Configuration(format!("dynamic.{key_plat}.{name} is required"))
        })
    };

    let provider_type = field("type")?;
    let factory = registry.get(provider_type.as_str()).ok_or_else(|| {
        Error::Configuration(format!("unknown cloud provider type '{provider_type}'"))
    })?;
    let provider = factory(provider_config, operator_namespace)?;
    let ssh_secret = field("ssh-secret")?;
    let max_instances: u32 = field("max-instances")?.parse().map_err(|_| {
        Error::Configuration(format!("dynamic.{key_plat}.max-instances is not an integer"))
    })?;

    Ok(DynamicPoolConfig {
        platform: platform.to_string(),
        provider,
        instance_tag: "multi-platform-builder".to_string(),
        max_instances,
        ssh_secret,
    })
}

async fn read_aws_credentials(
    client: Client,
    namespace: &str,
    secret_name: &str,
) -> Result<(String, String), Error> {
    let secrets: Api<Secret> = Api::namespaced(client, namespace);
    let secret = secrets.get(secret_name).await?;
    let data = secret.data.unwrap_or_default();
    let get = |key: &str| -> Result<String, Error> {
        data.get(key)
            .map(|v| String::from_utf8_lossy(&v.0).into_owned())
            .ok_or_else(|| Error::Configuration(format!("secret '{secret_name}' is missing key '{key}'")))
    };
    Ok((get("access-key-id")?, get("secret-access-key")?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::default_registry;

    #[test]
    fn parses_two_hosts_for_one_platform() {
        let mut data = HashMap::new();
        data.insert("host.host1.address".to_string(), "ec2-34.example.com".to_string());
        data.insert("host.host1.secret".to_string(), "host1-ssh".to_string());
        data.insert("host.host1.user".to_string(), "ec2-user".to_string());
        data.insert("host.host1.platform".to_string(), "linux/arm64".to_string());
        data.insert("host.host1.concurrency".to_string(), "4".to_string());
        data.insert("host.host2.address".to_string(), "ec2-54.example.com".to_string());
        data.insert("host.host2.secret".to_string(), "host2-ssh".to_string());
        data.insert("host.host2.user".to_string(), "ec2-user".to_string());
        data.insert("host.host2.platform".to_string(), "linux/arm64".to_string());
        data.insert("host.host2.concurrency".to_string(), "4".to_string());

        let parsed = parse_static_pools(&data).unwrap();
        match parsed.get("linux/arm64").unwrap() {
            PlatformConfig::StaticPool(pool) => assert_eq!(pool.hosts.len(), 2),
            _ => panic!("expected a static pool"),
        }
    }

    #[test]
    fn rejects_non_integer_concurrency() {
        let mut data = HashMap::new();
        data.insert("host.host1.address".to_string(), "a".to_string());
        data.insert("host.host1.secret".to_string(), "s".to_string());
        data.insert("host.host1.user".to_string(), "u".to_string());
        data.insert("host.host1.platform".to_string(), "linux/arm64".to_string());
        data.insert("host.host1.concurrency".to_string(), "four".to_string());
        assert!(matches!(parse_static_pools(&data), Err(Error::Configuration(_))));
    }

    #[test]
    fn parses_dynamic_platform_with_mock_provider() {
        let mut data = HashMap::new();
        data.insert("dynamic-platforms".to_string(), "linux/arm64".to_string());
        data.insert("dynamic.linux-arm64.type".to_string(), "mock".to_string());
        data.insert("dynamic.linux-arm64.ssh-secret".to_string(), "dynamic-ssh".to_string());
        data.insert("dynamic.linux-arm64.max-instances".to_string(), "2".to_string());

        let registry = default_registry();
        let cfg = dynamic_pool_from_fields(
            "linux/arm64",
            "linux-arm64",
            &data,
            &HashMap::new(),
            "operator-ns",
            &registry,
        )
        .unwrap();
        assert_eq!(cfg.max_instances, 2);
        assert_eq!(cfg.platform, "linux/arm64");
    }

    #[test]
    fn rejects_unknown_provider_type() {
        let mut data = HashMap::new();
        data.insert("dynamic.linux-arm64.type".to_string(), "azure".to_string());
        data.insert("dynamic.linux-arm64.ssh-secret".to_string(), "dynamic-ssh".to_string());
        data.insert("dynamic.linux-arm64.max-instances".to_string(), "2".to_string());
        let registry = default_registry();
        let result = dynamic_pool_from_fields(
            "linux/arm64",
            "linux-arm64",
            &data,
            &HashMap::new(),
            "operator-ns",
            &registry,
        );
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
