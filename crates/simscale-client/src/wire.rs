//! JSON bodies exchanged with the batch service.
//!
//! Secrets are exposed only here, while building a request body.

use serde::{Deserialize, Serialize};

use simscale_core::{
    FileShareMount, JobSummary, NodeCounts, NodeId, NodeStateCounts, PoolId, PoolSpec, TaskSpec,
    TaskState, TaskSummary,
};

// ---------------------------------------------------------------------------
// Pools
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolAddParameter {
    pub id: String,
    pub vm_size: String,
    pub virtual_machine_configuration: VirtualMachineConfiguration,
    pub target_dedicated_nodes: u32,
    pub target_low_priority_nodes: u32,
    pub task_slots_per_node: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mount_configuration: Vec<MountConfiguration>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineConfiguration {
    pub image_reference: ImageReference,
    pub node_agent_sku_id: String,
    pub container_configuration: ContainerConfiguration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageReference {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConfiguration {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub container_image_names: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub container_registries: Vec<ContainerRegistry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRegistry {
    pub registry_server: String,
    pub user_name: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MountConfiguration {
    pub azure_file_share_configuration: AzureFileShareConfiguration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureFileShareConfiguration {
    pub account_name: String,
    pub azure_file_url: String,
    pub account_key: String,
    pub relative_mount_path: String,
    pub mount_options: String,
}

impl From<&FileShareMount> for MountConfiguration {
    fn from(mount: &FileShareMount) -> Self {
        Self {
            azure_file_share_configuration: AzureFileShareConfiguration {
                account_name: mount.account_name.clone(),
                azure_file_url: mount.url.clone(),
                account_key: mount.account_key.expose().to_string(),
                relative_mount_path: mount.relative_mount_path.clone(),
                mount_options: mount.mount_options.clone(),
            },
        }
    }
}

impl From<&PoolSpec> for PoolAddParameter {
    fn from(spec: &PoolSpec) -> Self {
        let image = &spec.image;
        Self {
            id: spec.id.to_string(),
            vm_size: spec.vm_size.clone(),
            virtual_machine_configuration: VirtualMachineConfiguration {
                image_reference: ImageReference {
                    publisher: image.publisher.clone(),
                    offer: image.offer.clone(),
                    sku: image.sku.clone(),
                    version: image.version.clone(),
                },
                node_agent_sku_id: spec.node_agent_sku.clone(),
                container_configuration: ContainerConfiguration {
                    kind: "dockerCompatible",
                    container_image_names: vec![spec.container.image.clone()],
                    container_registries: spec
                        .container
                        .registry
                        .iter()
                        .map(|r| ContainerRegistry {
                            registry_server: r.server.clone(),
                            user_name: r.username.clone(),
                            password: r.password.expose().to_string(),
                        })
                        .collect(),
                },
            },
            target_dedicated_nodes: spec.target.dedicated,
            target_low_priority_nodes: spec.target.low_priority,
            task_slots_per_node: spec.max_tasks_per_node,
            mount_configuration: spec.mount.iter().map(MountConfiguration::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CloudPool {
    pub id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeStateCountsDto {
    pub creating: u32,
    pub starting: u32,
    pub idle: u32,
    pub running: u32,
    pub unusable: u32,
    pub preempted: u32,
    pub total: u32,
}

impl From<NodeStateCountsDto> for NodeStateCounts {
    fn from(dto: NodeStateCountsDto) -> Self {
        Self {
            creating: dto.creating,
            starting: dto.starting,
            idle: dto.idle,
            running: dto.running,
            unusable: dto.unusable,
            preempted: dto.preempted,
            total: dto.total,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolNodeCounts {
    pub pool_id: String,
    #[serde(default)]
    pub dedicated: NodeStateCountsDto,
    #[serde(default)]
    pub low_priority: NodeStateCountsDto,
}

impl From<PoolNodeCounts> for NodeCounts {
    fn from(dto: PoolNodeCounts) -> Self {
        Self {
            pool_id: PoolId::new(dto.pool_id),
            dedicated: dto.dedicated.into(),
            low_priority: dto.low_priority.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolInformation {
    pub pool_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAddParameter {
    pub id: String,
    pub pool_info: PoolInformation,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudJob {
    pub id: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub pool_info: Option<PoolInformation>,
}

impl From<CloudJob> for JobSummary {
    fn from(job: CloudJob) -> Self {
        Self {
            id: job.id.into(),
            pool_id: job.pool_info.map(|p| PoolId::new(p.pool_id)),
            state: job.state.unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAddParameter {
    pub id: String,
    pub command_line: String,
    pub container_settings: TaskContainerSettings,
    pub environment_settings: Vec<EnvironmentSetting>,
    pub user_identity: UserIdentity,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskContainerSettings {
    pub image_name: String,
    pub container_run_options: String,
}

#[derive(Debug, Serialize)]
pub struct EnvironmentSetting {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub auto_user: AutoUserSpecification,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoUserSpecification {
    pub scope: &'static str,
    pub elevation_level: &'static str,
}

impl From<&TaskSpec> for TaskAddParameter {
    fn from(spec: &TaskSpec) -> Self {
        Self {
            id: spec.id.to_string(),
            command_line: spec.command_line.clone(),
            container_settings: TaskContainerSettings {
                image_name: spec.container.image.clone(),
                container_run_options: spec.container.run_options.clone(),
            },
            environment_settings: spec
                .environment
                .iter()
                .map(|e| EnvironmentSetting {
                    name: e.name.clone(),
                    value: e.value.expose().to_string(),
                })
                .collect(),
            user_identity: UserIdentity {
                auto_user: AutoUserSpecification {
                    scope: "task",
                    elevation_level: if spec.elevated { "admin" } else { "nonadmin" },
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudTask {
    pub id: String,
    pub state: String,
    #[serde(default)]
    pub node_info: Option<NodeInformation>,
    #[serde(default)]
    pub execution_info: Option<ExecutionInformation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInformation {
    #[serde(default)]
    pub node_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionInformation {
    #[serde(default)]
    pub exit_code: Option<i32>,
}

/// Map the service's task state onto ours. `active` and `preparing` are
/// both still waiting to run.
pub fn task_state(state: &str) -> TaskState {
    match state {
        "running" => TaskState::Running,
        "completed" => TaskState::Completed,
        _ => TaskState::Pending,
    }
}

impl From<CloudTask> for TaskSummary {
    fn from(task: CloudTask) -> Self {
        Self {
            id: task.id.into(),
            state: task_state(&task.state),
            node_id: task.node_info.and_then(|n| n.node_id).map(NodeId::new),
            exit_code: task.execution_info.and_then(|e| e.exit_code),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// One page of a list response.
#[derive(Debug, Deserialize)]
pub struct ListPage<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "odata.nextLink", default)]
    pub next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<ErrorMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorMessage {
    #[serde(default)]
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use simscale_core::{
        ContainerConfig, ContainerRegistry as CoreRegistry, ContainerSettings, Credentials,
        ImageReference as CoreImage, OsFamily, Secret, TargetNodes, TaskId,
    };

    fn pool_spec() -> PoolSpec {
        PoolSpec {
            id: PoolId::new("cartpolepool10"),
            vm_size: "Standard_E8s_v3".to_string(),
            node_agent_sku: "batch.node.ubuntu 20.04".to_string(),
            image: CoreImage {
                publisher: "microsoft-azure-batch".to_string(),
                offer: "ubuntu-server-container".to_string(),
                sku: "20-04-lts".to_string(),
                version: "latest".to_string(),
            },
            os_family: OsFamily::Linux,
            container: ContainerConfig {
                image: "simreg.azurecr.io/cartpole:1.2".to_string(),
                registry: Some(CoreRegistry {
                    server: "simreg.azurecr.io".to_string(),
                    username: "simreg".to_string(),
                    password: Secret::new("hunter2"),
                }),
            },
            target: TargetNodes::new(1, 9),
            max_tasks_per_node: 10,
            mount: Some(FileShareMount {
                account_name: "simstore".to_string(),
                url: "https://simstore.file.core.windows.net/logs".to_string(),
                account_key: Secret::new("k"),
                relative_mount_path: "azfileshare".to_string(),
                mount_options: FileShareMount::DEFAULT_MOUNT_OPTIONS.to_string(),
            }),
        }
    }

    #[test]
    fn test_pool_body() {
        let body = serde_json::to_value(PoolAddParameter::from(&pool_spec())).unwrap();

        assert_eq!(body["id"], "cartpolepool10");
        assert_eq!(body["vmSize"], "Standard_E8s_v3");
        assert_eq!(body["targetDedicatedNodes"], 1);
        assert_eq!(body["targetLowPriorityNodes"], 9);
        assert_eq!(body["taskSlotsPerNode"], 10);
        let vm = &body["virtualMachineConfiguration"];
        assert_eq!(vm["nodeAgentSkuId"], "batch.node.ubuntu 20.04");
        assert_eq!(vm["imageReference"]["sku"], "20-04-lts");
        assert_eq!(vm["containerConfiguration"]["type"], "dockerCompatible");
        assert_eq!(
            vm["containerConfiguration"]["containerImageNames"],
            json!(["simreg.azurecr.io/cartpole:1.2"])
        );
        assert_eq!(
            vm["containerConfiguration"]["containerRegistries"][0]["password"],
            "hunter2"
        );
        let share = &body["mountConfiguration"][0]["azureFileShareConfiguration"];
        assert_eq!(share["relativeMountPath"], "azfileshare");
        assert_eq!(share["mountOptions"], "/persistent:Yes");
    }

    #[test]
    fn test_pool_body_omits_absent_mount_and_registry() {
        let mut spec = pool_spec();
        spec.mount = None;
        spec.container.registry = None;
        let body = serde_json::to_value(PoolAddParameter::from(&spec)).unwrap();

        assert!(body.get("mountConfiguration").is_none());
        assert!(body["virtualMachineConfiguration"]["containerConfiguration"]
            .get("containerRegistries")
            .is_none());
    }

    #[test]
    fn test_task_body() {
        let spec = TaskSpec::new(
            TaskId::new("job_number0_sweep"),
            "python main.py",
            ContainerSettings {
                image: "reg.io/sim:1".to_string(),
                run_options: "--workdir /src/".to_string(),
            },
        )
        .with_credentials(&Credentials::new("ws-1", "key-1"));
        let body = serde_json::to_value(TaskAddParameter::from(&spec)).unwrap();

        assert_eq!(body["id"], "job_number0_sweep");
        assert_eq!(body["commandLine"], "python main.py");
        assert_eq!(body["containerSettings"]["containerRunOptions"], "--workdir /src/");
        assert_eq!(
            body["environmentSettings"],
            json!([
                { "name": "SIM_WORKSPACE", "value": "ws-1" },
                { "name": "SIM_ACCESS_KEY", "value": "key-1" },
            ])
        );
        assert_eq!(body["userIdentity"]["autoUser"]["scope"], "task");
        assert_eq!(body["userIdentity"]["autoUser"]["elevationLevel"], "admin");
    }

    #[test]
    fn test_task_state_mapping() {
        assert_eq!(task_state("active"), TaskState::Pending);
        assert_eq!(task_state("preparing"), TaskState::Pending);
        assert_eq!(task_state("running"), TaskState::Running);
        assert_eq!(task_state("completed"), TaskState::Completed);
    }

    #[test]
    fn test_task_page() {
        let page: ListPage<CloudTask> = serde_json::from_value(json!({
            "value": [
                { "id": "job_number0_sweep", "state": "completed",
                  "nodeInfo": { "nodeId": "tvm-1" },
                  "executionInfo": { "exitCode": 2 } },
                { "id": "job_number1_sweep", "state": "active" }
            ],
            "odata.nextLink": "https://acct.batch/jobs/j/tasks?$skiptoken=x"
        }))
        .unwrap();

        assert!(page.next_link.is_some());
        let tasks: Vec<TaskSummary> = page.value.into_iter().map(TaskSummary::from).collect();
        assert_eq!(tasks[0].state, TaskState::Completed);
        assert_eq!(tasks[0].node_id, Some(NodeId::new("tvm-1")));
        assert_eq!(tasks[0].exit_code, Some(2));
        assert_eq!(tasks[1].state, TaskState::Pending);
        assert_eq!(tasks[1].exit_code, None);
    }

    #[test]
    fn test_node_counts() {
        let page: ListPage<PoolNodeCounts> = serde_json::from_value(json!({
            "value": [{
                "poolId": "p",
                "dedicated": { "idle": 1, "total": 1, "rebooting": 0 },
                "lowPriority": { "running": 7, "preempted": 2, "total": 9 }
            }]
        }))
        .unwrap();

        let counts = NodeCounts::from(page.value.into_iter().next().unwrap());
        assert_eq!(counts.dedicated.idle, 1);
        assert_eq!(counts.low_priority.running, 7);
        assert_eq!(counts.low_priority.preempted, 2);
        assert_eq!(counts.low_priority.total, 9);
    }
}
