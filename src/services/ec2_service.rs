//! src/services/ec2_service.rs
//!
//! Ec2Service — instance lifecycle on top of a small [`Ec2Backend`] trait.
//! The service owns the tool's rules (running-instance limit, state checks,
//! ownership tags); the backend only translates calls to the EC2 API.

use crate::{
    errors::{AppError, AppResult, aws_error},
    models::{
        CREATED_BY_TAG,
        instance::{Architecture, ImageRef, Instance, InstanceAction, InstanceState, LaunchRequest},
    },
    services::to_utc,
};
use async_trait::async_trait;
use aws_sdk_ec2::types::{
    Filter, InstanceNetworkInterfaceSpecification, InstanceType, ResourceType, Tag,
    TagSpecification,
};
use std::sync::Arc;
use tracing::{debug, info};

/// DescribeInstances filters the service needs.
#[derive(Clone, Debug, PartialEq)]
pub enum InstanceFilter {
    States(Vec<InstanceState>),
    Tag { key: String, value: String },
    Ids(Vec<String>),
}

impl InstanceFilter {
    fn to_sdk(&self) -> Filter {
        match self {
            InstanceFilter::States(states) => Filter::builder()
                .name("instance-state-name")
                .set_values(Some(states.iter().map(|s| s.as_str().to_string()).collect()))
                .build(),
            InstanceFilter::Tag { key, value } => Filter::builder()
                .name(format!("tag:{key}"))
                .values(value)
                .build(),
            InstanceFilter::Ids(ids) => Filter::builder()
                .name("instance-id")
                .set_values(Some(ids.clone()))
                .build(),
        }
    }
}

#[async_trait]
pub trait Ec2Backend: Send + Sync {
    /// Instances matching every filter (AND semantics, like the EC2 API).
    async fn describe_instances(&self, filters: &[InstanceFilter]) -> AppResult<Vec<Instance>>;

    /// Launch one instance and return its id.
    async fn run_instance(&self, request: &LaunchRequest) -> AppResult<String>;

    async fn start_instance(&self, id: &str) -> AppResult<()>;

    async fn stop_instance(&self, id: &str) -> AppResult<()>;

    async fn terminate_instance(&self, id: &str) -> AppResult<()>;
}

pub struct AwsEc2Backend {
    client: aws_sdk_ec2::Client,
}

impl AwsEc2Backend {
    pub fn new(client: aws_sdk_ec2::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Ec2Backend for AwsEc2Backend {
    async fn describe_instances(&self, filters: &[InstanceFilter]) -> AppResult<Vec<Instance>> {
        let mut pages = self
            .client
            .describe_instances()
            .set_filters(Some(filters.iter().map(InstanceFilter::to_sdk).collect()))
            .into_paginator()
            .send();

        let mut instances = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|err| aws_error("ec2:DescribeInstances", err))?;
            for reservation in page.reservations() {
                instances.extend(reservation.instances().iter().filter_map(instance_from_sdk));
            }
        }
        debug!("DescribeInstances returned {} instance(s)", instances.len());
        Ok(instances)
    }

    async fn run_instance(&self, request: &LaunchRequest) -> AppResult<String> {
        let tags = request
            .tags
            .iter()
            .map(|(key, value)| Tag::builder().key(key).value(value).build())
            .collect();

        let mut call = self
            .client
            .run_instances()
            .image_id(&request.image_id)
            .instance_type(InstanceType::from(request.instance_type.as_str()))
            .min_count(1)
            .max_count(1)
            .tag_specifications(
                TagSpecification::builder()
                    .resource_type(ResourceType::Instance)
                    .set_tags(Some(tags))
                    .build(),
            );
        if let Some(key_name) = &request.key_name {
            call = call.key_name(key_name);
        }
        if let Some(subnet_id) = &request.subnet_id {
            call = call.network_interfaces(
                InstanceNetworkInterfaceSpecification::builder()
                    .subnet_id(subnet_id)
                    .device_index(0)
                    .associate_public_ip_address(true)
                    .build(),
            );
        }

        debug!(name = %request.name, image = %request.image_id, "RunInstances");
        let output = call
            .send()
            .await
            .map_err(|err| aws_error("ec2:RunInstances", err))?;
        output
            .instances()
            .first()
            .and_then(|instance| instance.instance_id())
            .map(str::to_string)
            .ok_or_else(|| AppError::Aws {
                operation: "ec2:RunInstances".into(),
                code: None,
                message: "response did not include an instance".into(),
            })
    }

    async fn start_instance(&self, id: &str) -> AppResult<()> {
        self.client
            .start_instances()
            .instance_ids(id)
            .send()
            .await
            .map_err(|err| aws_error("ec2:StartInstances", err))?;
        Ok(())
    }

    async fn stop_instance(&self, id: &str) -> AppResult<()> {
        self.client
            .stop_instances()
            .instance_ids(id)
            .send()
            .await
            .map_err(|err| aws_error("ec2:StopInstances", err))?;
        Ok(())
    }

    async fn terminate_instance(&self, id: &str) -> AppResult<()> {
        self.client
            .terminate_instances()
            .instance_ids(id)
            .send()
            .await
            .map_err(|err| aws_error("ec2:TerminateInstances", err))?;
        Ok(())
    }
}

fn instance_from_sdk(instance: &aws_sdk_ec2::types::Instance) -> Option<Instance> {
    let tag = |key: &str| {
        instance
            .tags()
            .iter()
            .find(|tag| tag.key() == Some(key))
            .and_then(|tag| tag.value())
            .map(str::to_string)
    };

    Some(Instance {
        id: instance.instance_id()?.to_string(),
        name: tag("Name"),
        state: instance
            .state()
            .and_then(|state| state.name())
            .map(|name| InstanceState::parse(name.as_str()))
            .unwrap_or_else(|| InstanceState::Other("unknown".into())),
        instance_type: instance
            .instance_type()
            .map(|t| t.as_str().to_string())
            .unwrap_or_default(),
        public_ip: instance.public_ip_address().map(str::to_string),
        private_ip: instance.private_ip_address().map(str::to_string),
        launch_time: instance.launch_time().and_then(to_utc),
        created_by: tag(CREATED_BY_TAG),
    })
}

/// Parameters for [`Ec2Service::launch`].
#[derive(Clone, Debug)]
pub struct LaunchParams {
    pub name: String,
    pub image: ImageRef,
    pub instance_type: String,
    pub key_name: Option<String>,
    pub subnet_id: Option<String>,
}

#[derive(Clone)]
pub struct Ec2Service {
    backend: Arc<dyn Ec2Backend>,
    owner: String,
    max_running: usize,
}

impl Ec2Service {
    pub fn new(backend: Arc<dyn Ec2Backend>, owner: impl Into<String>, max_running: usize) -> Self {
        Self {
            backend,
            owner: owner.into(),
            max_running,
        }
    }

    /// Instances tagged as created by this tool, excluding terminated ones.
    pub async fn list_managed(&self) -> AppResult<Vec<Instance>> {
        let filters = [InstanceFilter::Tag {
            key: CREATED_BY_TAG.into(),
            value: self.owner.clone(),
        }];
        let mut instances = self.backend.describe_instances(&filters).await?;
        instances.retain(|i| !i.state.is_gone());
        Ok(instances)
    }

    /// All instances currently in one of `states`.
    pub async fn list_in_states(&self, states: &[InstanceState]) -> AppResult<Vec<Instance>> {
        self.backend
            .describe_instances(&[InstanceFilter::States(states.to_vec())])
            .await
    }

    /// Find instances by Name tag, falling back to the instance id.
    ///
    /// When `states` is non-empty only instances in those states match.
    /// Terminated instances never match.
    pub async fn find(&self, identifier: &str, states: &[InstanceState]) -> AppResult<Vec<Instance>> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(AppError::invalid("instance name or id cannot be empty"));
        }

        let with_states = |filter: InstanceFilter| {
            let mut filters = vec![filter];
            if !states.is_empty() {
                filters.push(InstanceFilter::States(states.to_vec()));
            }
            filters
        };

        let by_name = with_states(InstanceFilter::Tag {
            key: "Name".into(),
            value: identifier.to_string(),
        });
        let mut found = self.backend.describe_instances(&by_name).await?;
        if found.is_empty() {
            let by_id = with_states(InstanceFilter::Ids(vec![identifier.to_string()]));
            found = self.backend.describe_instances(&by_id).await?;
        }
        found.retain(|i| !i.state.is_gone());
        Ok(found)
    }

    /// Refuse when the running-instance limit has been reached.
    pub async fn ensure_capacity(&self) -> AppResult<()> {
        if self.max_running == 0 {
            return Ok(());
        }
        let running = self.list_in_states(&[InstanceState::Running]).await?.len();
        if running >= self.max_running {
            return Err(AppError::LimitReached {
                running,
                limit: self.max_running,
            });
        }
        Ok(())
    }

    /// Launch a single tagged instance and return its id.
    pub async fn launch(&self, params: LaunchParams) -> AppResult<String> {
        let name = params.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::invalid("instance name cannot be empty"));
        }
        let instance_type = params.instance_type.trim().to_ascii_lowercase();
        if instance_type.is_empty() || !instance_type.contains('.') {
            return Err(AppError::invalid(format!(
                "`{}` is not an instance type such as t3.nano",
                params.instance_type
            )));
        }

        self.ensure_capacity().await?;

        let arch = Architecture::of_instance_type(&instance_type);
        let request = LaunchRequest {
            image_id: params.image.image_id(arch),
            instance_type,
            key_name: params.key_name,
            subnet_id: params.subnet_id,
            tags: vec![
                ("Name".into(), name.clone()),
                ("Owner".into(), self.owner.clone()),
                (CREATED_BY_TAG.into(), self.owner.clone()),
            ],
            name,
        };

        let id = self.backend.run_instance(&request).await?;
        info!(instance_id = %id, image = %request.image_id, "launched instance");
        Ok(id)
    }

    /// Start or stop an instance after checking it is in the right state.
    pub async fn change_state(&self, instance: &Instance, action: InstanceAction) -> AppResult<()> {
        if instance.state != action.required_state() {
            return Err(AppError::InvalidState {
                id: instance.id.clone(),
                state: instance.state.to_string(),
                action: action.verb().into(),
            });
        }

        match action {
            InstanceAction::Start => {
                self.ensure_capacity().await?;
                self.backend.start_instance(&instance.id).await?;
            }
            InstanceAction::Stop => self.backend.stop_instance(&instance.id).await?,
        }
        info!(instance_id = %instance.id, "instance {}", action.past_tense());
        Ok(())
    }

    pub async fn terminate(&self, instance: &Instance) -> AppResult<()> {
        if instance.state.is_gone() {
            return Err(AppError::InvalidState {
                id: instance.id.clone(),
                state: instance.state.to_string(),
                action: "terminate".into(),
            });
        }
        self.backend.terminate_instance(&instance.id).await?;
        info!(instance_id = %instance.id, "instance terminating");
        Ok(())
    }
}
