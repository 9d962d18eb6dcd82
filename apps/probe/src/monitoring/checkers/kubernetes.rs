//! Kubernetes workload health through the cluster REST API.

use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::CheckError;
use crate::models::monitor::Monitor;
use crate::monitoring::checker::Checker;
use crate::monitoring::types::{
    ClusterHealth, FailureReason, Observation, ResourceSnapshot, WorkloadHealth,
};
use crate::monitoring::validation::{validate_http_target, validate_namespace};

fn default_namespace() -> String {
    "default".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterAccess {
    api_server: String,
    token: Option<String>,
    #[serde(default = "default_namespace")]
    namespace: String,
    #[serde(default)]
    accept_invalid_certs: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KubernetesSettings {
    kubernetes_config: ClusterAccess,
    /// Older monitors keep the namespace next to the config
    kubernetes_namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
struct List<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContainerStatus {
    ready: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodStatus {
    phase: Option<String>,
    #[serde(default)]
    container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    metadata: Metadata,
    status: Option<PodStatus>,
}

impl Pod {
    fn is_healthy(&self) -> bool {
        match &self.status {
            Some(status) => match status.phase.as_deref() {
                Some("Succeeded") => true,
                Some("Running") => status.container_statuses.iter().all(|c| c.ready),
                _ => false,
            },
            None => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReplicaSpec {
    replicas: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplicaStatus {
    ready_replicas: Option<i32>,
}

/// Deployments and stateful sets share the replica fields we look at
#[derive(Debug, Deserialize)]
struct ReplicatedWorkload {
    metadata: Metadata,
    spec: Option<ReplicaSpec>,
    status: Option<ReplicaStatus>,
}

impl ReplicatedWorkload {
    fn is_healthy(&self) -> bool {
        let desired = self.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
        let ready = self.status.as_ref().and_then(|s| s.ready_replicas).unwrap_or(0);
        ready >= desired
    }
}

#[derive(Debug, Deserialize)]
struct JobCondition {
    #[serde(rename = "type")]
    kind: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct JobStatus {
    #[serde(default)]
    conditions: Vec<JobCondition>,
}

#[derive(Debug, Deserialize)]
struct Job {
    metadata: Metadata,
    status: Option<JobStatus>,
}

impl Job {
    fn is_healthy(&self) -> bool {
        !self.status.as_ref().is_some_and(|status| {
            status.conditions.iter().any(|c| c.kind == "Failed" && c.status == "True")
        })
    }
}

fn summarize<T>(
    items: &[T],
    name: impl Fn(&T) -> &str,
    healthy: impl Fn(&T) -> bool,
) -> WorkloadHealth {
    let mut summary = WorkloadHealth::default();
    for item in items {
        if healthy(item) {
            summary.healthy += 1;
        } else {
            summary.unhealthy.push(name(item).to_string());
        }
    }
    summary
}

/// Map a namespace summary to a status
pub fn assess(health: &ClusterHealth) -> Observation {
    let unhealthy = health.unhealthy_count();
    if unhealthy == 0 {
        return Observation::up();
    }

    let names: Vec<&str> = [&health.pods, &health.deployments, &health.stateful_sets, &health.jobs]
        .iter()
        .flat_map(|kind| kind.unhealthy.iter().map(String::as_str))
        .take(5)
        .collect();
    let message = format!(
        "{} of {} workloads unhealthy in {}: {}",
        unhealthy,
        unhealthy + health.healthy_count(),
        health.namespace,
        names.join(", ")
    );

    if health.healthy_count() > 0 {
        Observation::degraded(message)
    } else {
        Observation::down(FailureReason::CriteriaNotMet, message)
    }
}

/// Checker for `kubernetes` monitors
pub struct KubernetesChecker {
    client: reqwest::Client,
    insecure_client: reqwest::Client,
    timeout_ms: u64,
}

impl KubernetesChecker {
    pub fn new(timeout_ms: u64) -> Result<Self> {
        let timeout = Duration::from_millis(timeout_ms);
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            insecure_client: reqwest::Client::builder()
                .timeout(timeout)
                .danger_accept_invalid_certs(true)
                .build()?,
            timeout_ms,
        })
    }

    async fn list<T: DeserializeOwned>(
        &self,
        access: &ClusterAccess,
        namespace: &str,
        path: &str,
    ) -> Result<Vec<T>, CheckError> {
        let client = if access.accept_invalid_certs { &self.insecure_client } else { &self.client };
        let url = format!(
            "{}/{}",
            access.api_server.trim_end_matches('/'),
            path.replace("{ns}", namespace)
        );

        let mut request = client.get(&url);
        if let Some(token) = &access.token {
            request = request.bearer_auth(token);
        }

        let response =
            request.send().await.map_err(|e| CheckError::from_reqwest(e, self.timeout_ms))?;

        let status = response.status();
        match status.as_u16() {
            401 | 403 => {
                return Err(CheckError::InvalidConfig(format!(
                    "cluster rejected credentials ({}) for {}",
                    status, path
                )));
            }
            404 => {
                return Err(CheckError::InvalidConfig(format!("namespace {} not found", namespace)));
            }
            _ if !status.is_success() => {
                return Err(CheckError::Unreachable(format!(
                    "API server returned {} for {}",
                    status, url
                )));
            }
            _ => {}
        }

        let list: List<T> = response.json().await.map_err(|e| {
            if e.is_timeout() {
                CheckError::Timeout(self.timeout_ms)
            } else {
                CheckError::Internal(format!("unexpected API response for {}: {}", path, e))
            }
        })?;
        Ok(list.items)
    }
}

#[async_trait::async_trait]
impl Checker for KubernetesChecker {
    async fn check(&self, monitor: &Monitor) -> Result<Observation, CheckError> {
        let settings: KubernetesSettings = monitor.settings()?;
        let access = settings.kubernetes_config;
        validate_http_target(&access.api_server)
            .map_err(|e| CheckError::InvalidConfig(e.to_string()))?;
        let namespace = settings.kubernetes_namespace.unwrap_or_else(|| access.namespace.clone());
        validate_namespace(&namespace).map_err(|e| CheckError::InvalidConfig(e.to_string()))?;

        debug!("Kubernetes check for monitor {} in namespace {}", monitor.id, namespace);
        let start = Instant::now();

        let (pods, deployments, stateful_sets, jobs) = futures::try_join!(
            self.list::<Pod>(&access, &namespace, "api/v1/namespaces/{ns}/pods"),
            self.list::<ReplicatedWorkload>(
                &access,
                &namespace,
                "apis/apps/v1/namespaces/{ns}/deployments"
            ),
            self.list::<ReplicatedWorkload>(
                &access,
                &namespace,
                "apis/apps/v1/namespaces/{ns}/statefulsets"
            ),
            self.list::<Job>(&access, &namespace, "apis/batch/v1/namespaces/{ns}/jobs"),
        )?;

        let latency = start.elapsed().as_millis() as u64;

        let health = ClusterHealth {
            pods: summarize(&pods, |p| p.metadata.name.as_str(), Pod::is_healthy),
            deployments: summarize(
                &deployments,
                |d| d.metadata.name.as_str(),
                ReplicatedWorkload::is_healthy,
            ),
            stateful_sets: summarize(
                &stateful_sets,
                |s| s.metadata.name.as_str(),
                ReplicatedWorkload::is_healthy,
            ),
            jobs: summarize(&jobs, |j| j.metadata.name.as_str(), Job::is_healthy),
            namespace,
        };

        Ok(assess(&health)
            .with_latency(latency)
            .with_resources(ResourceSnapshot::Kubernetes(health)))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::monitor::MonitorKind;
    use crate::monitoring::types::MonitorStatus;

    fn kube_monitor(api_server: &str) -> Monitor {
        Monitor::new("k8s", MonitorKind::Kubernetes).with_setting(
            "kubernetesConfig",
            json!({"apiServer": api_server, "token": "abc", "namespace": "shop"}),
        )
    }

    async fn mock_list(
        server: &mut mockito::ServerGuard,
        path: &str,
        items: serde_json::Value,
    ) -> mockito::Mock {
        server
            .mock("GET", path)
            .match_header("authorization", "Bearer abc")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"items": items}).to_string())
            .create_async()
            .await
    }

    #[test]
    fn test_pod_health_rules() {
        let running_ready: Pod = serde_json::from_value(json!({
            "metadata": {"name": "a"},
            "status": {"phase": "Running", "containerStatuses": [{"ready": true}]}
        }))
        .unwrap();
        let running_not_ready: Pod = serde_json::from_value(json!({
            "metadata": {"name": "b"},
            "status": {"phase": "Running", "containerStatuses": [{"ready": false}]}
        }))
        .unwrap();
        let pending: Pod = serde_json::from_value(json!({
            "metadata": {"name": "c"}, "status": {"phase": "Pending"}
        }))
        .unwrap();

        assert!(running_ready.is_healthy());
        assert!(!running_not_ready.is_healthy());
        assert!(!pending.is_healthy());
    }

    #[test]
    fn test_replica_and_job_health_rules() {
        let ready: ReplicatedWorkload = serde_json::from_value(json!({
            "metadata": {"name": "web"}, "spec": {"replicas": 2}, "status": {"readyReplicas": 2}
        }))
        .unwrap();
        let short: ReplicatedWorkload = serde_json::from_value(json!({
            "metadata": {"name": "db"}, "spec": {"replicas": 3}, "status": {"readyReplicas": 1}
        }))
        .unwrap();
        let failed_job: Job = serde_json::from_value(json!({
            "metadata": {"name": "migrate"},
            "status": {"conditions": [{"type": "Failed", "status": "True"}]}
        }))
        .unwrap();

        assert!(ready.is_healthy());
        assert!(!short.is_healthy());
        assert!(!failed_job.is_healthy());
    }

    #[test]
    fn test_assess_levels() {
        let empty = ClusterHealth { namespace: "shop".into(), ..Default::default() };
        assert_eq!(assess(&empty).status, MonitorStatus::Up);

        let partial = ClusterHealth {
            namespace: "shop".into(),
            pods: WorkloadHealth { healthy: 2, unhealthy: vec!["cart-1".into()] },
            ..Default::default()
        };
        assert_eq!(assess(&partial).status, MonitorStatus::Degraded);

        let all_bad = ClusterHealth {
            namespace: "shop".into(),
            pods: WorkloadHealth { healthy: 0, unhealthy: vec!["cart-1".into()] },
            ..Default::default()
        };
        let observation = assess(&all_bad);
        assert_eq!(observation.status, MonitorStatus::Down);
        assert!(observation.failure.unwrap().1.contains("cart-1"));
    }

    #[tokio::test]
    async fn test_check_against_api_server() {
        let mut server = mockito::Server::new_async().await;
        let pods = mock_list(
            &mut server,
            "/api/v1/namespaces/shop/pods",
            json!([
                {
                    "metadata": {"name": "cart-0"},
                    "status": {"phase": "Running", "containerStatuses": [{"ready": true}]}
                },
                {"metadata": {"name": "cart-1"}, "status": {"phase": "CrashLoopBackOff"}}
            ]),
        )
        .await;
        let deployments = mock_list(
            &mut server,
            "/apis/apps/v1/namespaces/shop/deployments",
            json!([{
                "metadata": {"name": "cart"},
                "spec": {"replicas": 1},
                "status": {"readyReplicas": 1}
            }]),
        )
        .await;
        let stateful_sets =
            mock_list(&mut server, "/apis/apps/v1/namespaces/shop/statefulsets", json!([])).await;
        let jobs = mock_list(&mut server, "/apis/batch/v1/namespaces/shop/jobs", json!([])).await;

        let checker = KubernetesChecker::new(2_000).unwrap();
        let observation = checker.check(&kube_monitor(&server.url())).await.unwrap();

        assert_eq!(observation.status, MonitorStatus::Degraded);
        match observation.resources {
            Some(ResourceSnapshot::Kubernetes(health)) => {
                assert_eq!(health.pods.healthy, 1);
                assert_eq!(health.pods.unhealthy, vec!["cart-1".to_string()]);
                assert_eq!(health.deployments.healthy, 1);
            }
            other => panic!("unexpected resources: {other:?}"),
        }

        for mock in [pods, deployments, stateful_sets, jobs] {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn test_rejected_token_is_invalid_config() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let checker = KubernetesChecker::new(2_000).unwrap();
        let result = checker.check(&kube_monitor(&server.url())).await;
        assert!(matches!(result, Err(CheckError::InvalidConfig(_))), "{result:?}");
    }

    #[tokio::test]
    async fn test_missing_config_is_invalid() {
        let checker = KubernetesChecker::new(2_000).unwrap();
        let result = checker.check(&Monitor::new("k", MonitorKind::Kubernetes)).await;
        assert!(matches!(result, Err(CheckError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_namespace_outside_dns_label_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let untouched = server
            .mock("GET", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let monitor = kube_monitor(&server.url())
            .with_setting("kubernetesNamespace", json!("a/../../x"));
        let checker = KubernetesChecker::new(2_000).unwrap();

        let result = checker.check(&monitor).await;
        assert!(matches!(result, Err(CheckError::InvalidConfig(_))), "{result:?}");
        untouched.assert_async().await;
    }
}
