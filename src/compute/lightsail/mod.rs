//! AWS Lightsail implementation of the compute abstraction.
//!
//! Credentials are resolved by the SDK's default provider chain
//! (environment, shared profile, web identity, instance metadata).

mod error;

use std::collections::BTreeMap;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_lightsail::Client;
use aws_sdk_lightsail::types::{InstanceAccessProtocol, InstanceSnapshot, NetworkProtocol, PortInfo, Tag};
use tracing::debug;

use super::{
    AccessDetails, ComputeApi, ComputeFuture, InstanceDetails, LaunchRequest, OperationResult,
    Snapshot,
};
use crate::firewall::PortRule;

pub use error::LightsailError;

/// Compute client backed by the Lightsail API.
#[derive(Clone, Debug)]
pub struct LightsailApi {
    client: Client,
}

impl LightsailApi {
    /// Wraps an existing SDK client.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client for `region` using the default credential chain.
    pub async fn from_region(region: &str) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_owned()))
            .load()
            .await;
        Self::new(Client::new(&sdk_config))
    }

    async fn fetch_snapshots(&self) -> Result<Vec<Snapshot>, LightsailError> {
        let mut snapshots = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let output = self
                .client
                .get_instance_snapshots()
                .set_page_token(page_token.take())
                .send()
                .await
                .map_err(|err| LightsailError::provider("get_instance_snapshots", &err))?;

            snapshots.extend(output.instance_snapshots().iter().map(snapshot_record));

            match output.next_page_token() {
                Some(token) if !token.is_empty() => page_token = Some(token.to_owned()),
                _ => return Ok(snapshots),
            }
        }
    }
}

fn sdk_tags(tags: &BTreeMap<String, String>) -> Vec<Tag> {
    tags.iter()
        .map(|(key, value)| Tag::builder().key(key).value(value).build())
        .collect()
}

fn port_info(rule: &PortRule) -> PortInfo {
    PortInfo::builder()
        .from_port(i32::from(rule.from_port))
        .to_port(i32::from(rule.to_port))
        .protocol(NetworkProtocol::from(rule.protocol.as_str()))
        .set_cidrs(Some(rule.cidrs.clone()))
        .build()
}

fn snapshot_record(snapshot: &InstanceSnapshot) -> Snapshot {
    Snapshot {
        name: snapshot.name().unwrap_or_default().to_owned(),
        state: snapshot
            .state()
            .map(|state| state.as_str().to_owned())
            .unwrap_or_default(),
        from_instance_name: snapshot.from_instance_name().map(str::to_owned),
        created_at: snapshot.created_at().map_or(0, |created| created.secs()),
    }
}

fn required(
    value: Option<&str>,
    operation: &'static str,
    field: &'static str,
) -> Result<String, LightsailError> {
    value
        .map(str::to_owned)
        .ok_or(LightsailError::MissingField { operation, field })
}

impl ComputeApi for LightsailApi {
    type Error = LightsailError;

    fn create_from_blueprint<'a>(
        &'a self,
        request: &'a LaunchRequest,
        blueprint_id: &'a str,
    ) -> ComputeFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.client
                .create_instances()
                .instance_names(&request.name)
                .availability_zone(&request.availability_zone)
                .bundle_id(&request.bundle_id)
                .blueprint_id(blueprint_id)
                .user_data(&request.user_data)
                .set_tags(Some(sdk_tags(&request.tags)))
                .send()
                .await
                .map_err(|err| LightsailError::provider("create_instances", &err))?;
            Ok(())
        })
    }

    fn create_from_snapshot<'a>(
        &'a self,
        request: &'a LaunchRequest,
        snapshot_name: &'a str,
    ) -> ComputeFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.client
                .create_instances_from_snapshot()
                .instance_names(&request.name)
                .availability_zone(&request.availability_zone)
                .bundle_id(&request.bundle_id)
                .instance_snapshot_name(snapshot_name)
                .user_data(&request.user_data)
                .set_tags(Some(sdk_tags(&request.tags)))
                .send()
                .await
                .map_err(|err| LightsailError::provider("create_instances_from_snapshot", &err))?;
            Ok(())
        })
    }

    fn instance_state<'a>(
        &'a self,
        name: &'a str,
    ) -> ComputeFuture<'a, Option<String>, Self::Error> {
        Box::pin(async move {
            match self.client.get_instance_state().instance_name(name).send().await {
                Ok(output) => Ok(output
                    .state()
                    .and_then(|state| state.name())
                    .map(str::to_owned)),
                Err(err)
                    if err
                        .as_service_error()
                        .is_some_and(|service| service.is_not_found_exception()) =>
                {
                    debug!(instance = name, "instance not found yet");
                    Ok(None)
                }
                Err(err) => Err(LightsailError::provider("get_instance_state", &err)),
            }
        })
    }

    fn instance<'a>(&'a self, name: &'a str) -> ComputeFuture<'a, InstanceDetails, Self::Error> {
        Box::pin(async move {
            let output = self
                .client
                .get_instance()
                .instance_name(name)
                .send()
                .await
                .map_err(|err| LightsailError::provider("get_instance", &err))?;
            let instance = output.instance().ok_or(LightsailError::MissingField {
                operation: "get_instance",
                field: "instance",
            })?;

            Ok(InstanceDetails {
                name: instance.name().unwrap_or(name).to_owned(),
                state: instance
                    .state()
                    .and_then(|state| state.name())
                    .map(str::to_owned),
                public_ip: instance.public_ip_address().map(str::to_owned),
            })
        })
    }

    fn access_details<'a>(
        &'a self,
        name: &'a str,
    ) -> ComputeFuture<'a, AccessDetails, Self::Error> {
        const OPERATION: &str = "get_instance_access_details";
        Box::pin(async move {
            let output = self
                .client
                .get_instance_access_details()
                .instance_name(name)
                .protocol(InstanceAccessProtocol::Ssh)
                .send()
                .await
                .map_err(|err| LightsailError::provider(OPERATION, &err))?;
            let details = output.access_details().ok_or(LightsailError::MissingField {
                operation: OPERATION,
                field: "access_details",
            })?;

            Ok(AccessDetails {
                username: required(details.username(), OPERATION, "username")?,
                ip_address: required(details.ip_address(), OPERATION, "ip_address")?,
                private_key: required(details.private_key(), OPERATION, "private_key")?,
                cert_key: required(details.cert_key(), OPERATION, "cert_key")?,
            })
        })
    }

    fn snapshots(&self) -> ComputeFuture<'_, Vec<Snapshot>, Self::Error> {
        Box::pin(self.fetch_snapshots())
    }

    fn put_public_ports<'a>(
        &'a self,
        name: &'a str,
        rules: &'a [PortRule],
    ) -> ComputeFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.client
                .put_instance_public_ports()
                .instance_name(name)
                .set_port_infos(Some(rules.iter().map(port_info).collect()))
                .send()
                .await
                .map_err(|err| LightsailError::provider("put_instance_public_ports", &err))?;
            Ok(())
        })
    }

    fn delete_instance<'a>(
        &'a self,
        name: &'a str,
    ) -> ComputeFuture<'a, Vec<OperationResult>, Self::Error> {
        Box::pin(async move {
            let output = self
                .client
                .delete_instance()
                .instance_name(name)
                .send()
                .await
                .map_err(|err| LightsailError::provider("delete_instance", &err))?;

            Ok(output
                .operations()
                .iter()
                .map(|operation| OperationResult {
                    error_code: operation.error_code().map(str::to_owned),
                    error_details: operation.error_details().map(str::to_owned),
                })
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_lightsail::primitives::DateTime;
    use aws_sdk_lightsail::types::InstanceSnapshotState;

    #[test]
    fn converts_tags_in_key_order() {
        let tags = BTreeMap::from([
            (String::from("stack"), String::from("vista")),
            (String::from("repo"), String::from("acme/web")),
        ]);
        let converted = sdk_tags(&tags);
        let keys: Vec<Option<&str>> = converted.iter().map(Tag::key).collect();
        assert_eq!(keys, vec![Some("repo"), Some("stack")]);
    }

    #[test]
    fn converts_snapshot_metadata() {
        let snapshot = InstanceSnapshot::builder()
            .name("preview-snap")
            .state(InstanceSnapshotState::Available)
            .from_instance_name("feature-x")
            .created_at(DateTime::from_secs(1_700_000_000))
            .build();

        assert_eq!(
            snapshot_record(&snapshot),
            Snapshot {
                name: String::from("preview-snap"),
                state: String::from("available"),
                from_instance_name: Some(String::from("feature-x")),
                created_at: 1_700_000_000,
            }
        );
    }

    #[test]
    fn missing_fields_name_the_operation() {
        let err = required(None, "get_instance_access_details", "cert_key")
            .expect_err("absent value");
        assert_eq!(
            err.to_string(),
            "lightsail get_instance_access_details response is missing cert_key"
        );
    }
}
