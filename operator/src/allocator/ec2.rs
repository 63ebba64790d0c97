use super::cloud::{CloudProvider, CloudProviderFactory, InstanceIdentifier};
use crate::util::Error;
use aws_sdk_ec2::Client as Ec2Client;
use aws_sdk_ec2::config::{BehaviorVersion, Credentials as Ec2Credentials, Region};
use aws_sdk_ec2::types::{Filter, InstanceStateName, ResourceType, Tag, TagSpecification};
use std::collections::HashMap;
use std::sync::Arc;

/// Backs the `CloudProvider` capability with an EC2 instance pool. Instances
/// are tagged with the instance tag on launch; `CountInstances` /
/// `TerminateInstance` scope their calls to that tag via an EC2 filter.
pub struct Ec2CloudProvider {
    client: Ec2Client,
    region: String,
    ami: String,
    instance_type: String,
    key_name: String,
    ssh_user: String,
}

/// Registered under the `"aws-ec2"` key in the [`CloudProviderRegistry`].
/// Credentials are resolved by the config loader (reading the secret named
/// in `.aws-secret`) before this runs, so construction here is entirely
/// synchronous.
pub const FACTORY: CloudProviderFactory = ec2_factory;

fn ec2_factory(
    config: &HashMap<String, String>,
    _operator_namespace: &str,
) -> Result<Arc<dyn CloudProvider>, Error> {
    let field = |name: &str| -> Result<&String, Error> {
        config
            .get(name)
            .ok_or_else(|| Error::Configuration(format!("dynamic platform is missing '{name}'")))
    };
    Ok(Arc::new(Ec2CloudProvider::new(
        field("region")?,
        field("ami")?,
        field("instance-type")?,
        field("key-name")?,
        field("access-key-id")?,
        field("secret-access-key")?,
    )))
}

impl Ec2CloudProvider {
    pub fn new(
        region: impl Into<String>,
        ami: impl Into<String>,
        instance_type: impl Into<String>,
        key_name: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        let region = region.into();
        let creds = Ec2Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            "multi-platform-controller",
        );
        let config = aws_sdk_ec2::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .credentials_provider(creds)
            .build();
        Ec2CloudProvider {
            client: Ec2Client::from_conf(config),
            region,
            ami: ami.into(),
            instance_type: instance_type.into(),
            key_name: key_name.into(),
            ssh_user: "ec2-user".to_string(),
        }
    }

    fn tag_filter(instance_tag: &str) -> Filter {
        Filter::builder()
            .name("tag:multi-platform-instance-tag")
            .values(instance_tag)
            .build()
    }
}

#[async_trait::async_trait]
impl CloudProvider for Ec2CloudProvider {
    async fn count_instances(&self, instance_tag: &str) -> Result<u32, Error> {
        let resp = self
            .client
            .describe_instances()
            .filters(Self::tag_filter(instance_tag))
            .filters(
                Filter::builder()
                    .name("instance-state-name")
                    .values("pending")
                    .values("running")
                    .build(),
            )
            .send()
            .await
            .map_err(|e| Error::Cloud(format!("describe_instances ({}): {e}", self.region)))?;
        let count = resp
            .reservations()
            .iter()
            .map(|r| r.instances().len())
            .sum::<usize>();
        Ok(count as u32)
    }

    async fn launch_instance(
        &self,
        name: &str,
        instance_tag: &str,
    ) -> Result<InstanceIdentifier, Error> {
        let tags = TagSpecification::builder()
            .resource_type(ResourceType::Instance)
            .tags(Tag::builder().key("Name").value(name).build())
            .tags(
                Tag::builder()
                    .key("multi-platform-instance-tag")
                    .value(instance_tag)
                    .build(),
            )
            .build();
        let resp = self
            .client
            .run_instances()
            .image_id(&self.ami)
            .instance_type(self.instance_type.as_str().into())
            .key_name(&self.key_name)
            .min_count(1)
            .max_count(1)
            .tag_specifications(tags)
            .send()
            .await
            .map_err(|e| Error::Cloud(format!("run_instances: {e}")))?;
        let instance = resp
            .instances()
            .first()
            .ok_or_else(|| Error::Cloud("run_instances returned no instance".to_string()))?;
        let id = instance
            .instance_id()
            .ok_or_else(|| Error::Cloud("launched instance has no id".to_string()))?;
        Ok(id.to_string())
    }

    async fn get_instance_address(&self, id: &InstanceIdentifier) -> Result<Option<String>, Error> {
        let resp = self
            .client
            .describe_instances()
            .instance_ids(id)
            .send()
            .await
            .map_err(|e| Error::Cloud(format!("describe_instances({id}): {e}")))?;
        let instance = resp
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .next();
        let Some(instance) = instance else {
            return Ok(None);
        };
        if instance.state().and_then(|s| s.name()) != Some(&InstanceStateName::Running) {
            return Ok(None);
        }
        Ok(instance.public_dns_name().filter(|s| !s.is_empty()).map(str::to_string))
    }

    async fn terminate_instance(&self, id: &InstanceIdentifier) -> Result<(), Error> {
        self.client
            .terminate_instances()
            .instance_ids(id)
            .send()
            .await
            .map_err(|e| Error::Cloud(format!("terminate_instances({id}): {e}")))?;
        Ok(())
    }

    fn ssh_user(&self) -> &str {
        &self.ssh_user
    }
}
