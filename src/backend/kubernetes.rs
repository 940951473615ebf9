pub mod types;

use crate::core::error::{Result, SubmitError};
use crate::core::job::{JobCategory, JobSpec};
use crate::core::submission::{BackendKind, SubmissionResult, DRY_RUN_JOB_ID};
use crate::process::{ProcessOutput, ProcessRunner};
use crate::utils::now_utc_iso;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;
use types::{
    BatchJob, BatchJobSpec, Container, EnvVar, ObjectMeta, Pod, PodSpec, PodTemplate,
    ResourceRequirements, TemplateMeta, Volume, VolumeMount, Workload, GPU_RESOURCE,
    WORKSPACE_MOUNT_PATH, WORKSPACE_VOLUME,
};

pub const SHARING_ANNOTATION: &str = "gpu.lenovo.com/sharing";
pub const INTERACTIVE_ANNOTATION: &str = "gpu.lenovo.com/interactive";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubernetesSettings {
    pub kubectl: String,
}

impl Default for KubernetesSettings {
    fn default() -> Self {
        Self {
            kubectl: "kubectl".to_string(),
        }
    }
}

/// Submits inference Jobs and interactive Pods through `kubectl`.
pub struct KubernetesBackend<'a, R> {
    runner: &'a R,
    settings: &'a KubernetesSettings,
}

impl<'a, R: ProcessRunner> KubernetesBackend<'a, R> {
    pub fn new(runner: &'a R, settings: &'a KubernetesSettings) -> Self {
        Self { runner, settings }
    }

    pub fn settings(&self) -> &KubernetesSettings {
        self.settings
    }

    pub fn is_available(&self) -> bool {
        self.runner.which(&self.settings.kubectl).is_some()
    }

    /// Resolve the namespace and build the object for `job`.
    pub fn render(&self, job: &JobSpec) -> Result<(String, Workload)> {
        let namespace = job.namespace().unwrap_or(job.team()).to_string();
        let name = job
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| stable_name(job));

        let workload = match job.category() {
            JobCategory::Inference => Workload::Job(inference_job(job, &name, &namespace)),
            JobCategory::Interactive => Workload::Pod(interactive_pod(job, &name, &namespace)),
            other => {
                return Err(SubmitError::UnsupportedCategory(format!(
                    "Kubernetes backend cannot handle job_type={other}"
                )))
            }
        };
        Ok((namespace, workload))
    }

    #[tracing::instrument(skip(self, job), fields(team = %job.team()))]
    pub async fn submit(&self, job: &JobSpec, dry_run: bool) -> Result<SubmissionResult> {
        let (namespace, workload) = self.render(job)?;

        if dry_run {
            let mut details = Map::new();
            details.insert("namespace".into(), Value::String(namespace));
            details.insert("manifest_object".into(), serde_json::to_value(&workload)?);
            return Ok(SubmissionResult {
                backend: BackendKind::Orchestrator,
                job_id: DRY_RUN_JOB_ID.to_string(),
                expected_start_time: now_utc_iso(),
                details,
            });
        }

        self.ensure_namespace(&namespace).await?;

        let output = {
            let mut manifest_file = tempfile::Builder::new()
                .prefix("hsubmit-")
                .suffix(".json")
                .tempfile()?;
            serde_json::to_writer_pretty(&mut manifest_file, &workload)?;
            manifest_file.flush()?;

            let path = manifest_file.path().to_string_lossy().into_owned();
            self.kubectl(&["apply", "-f", &path, "-n", &namespace]).await?
        };

        if !output.success() {
            return Err(SubmitError::SubmissionFailed(format!(
                "kubectl apply failed (rc={}): {}",
                output.code,
                output.diagnostic()
            )));
        }

        let name = workload.metadata().name.clone();
        tracing::info!(name = %name, namespace = %namespace, "Applied Kubernetes {}", workload.resource());

        let start = match self.probe_start_time(&workload, &namespace).await {
            Some(start) => start,
            None => now_utc_iso(),
        };

        let mut details = Map::new();
        details.insert("kubectl_apply".into(), Value::String(output.stdout));
        details.insert("namespace".into(), Value::String(namespace));
        Ok(SubmissionResult {
            backend: BackendKind::Orchestrator,
            job_id: name,
            expected_start_time: start,
            details,
        })
    }

    async fn kubectl(&self, args: &[&str]) -> Result<ProcessOutput> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.runner.run(&self.settings.kubectl, &args).await
    }

    /// Create the namespace when `get` cannot see it.
    ///
    /// The outcome of `create` is only logged: a namespace we may not list
    /// can still accept the apply, and a real failure surfaces there.
    async fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        if self.kubectl(&["get", "ns", namespace]).await?.success() {
            return Ok(());
        }

        let created = self.kubectl(&["create", "ns", namespace]).await?;
        if created.success() {
            tracing::info!(namespace, "Created namespace");
        } else {
            tracing::warn!(
                namespace,
                code = created.code,
                error = %created.diagnostic(),
                "Namespace creation failed, continuing with apply"
            );
        }
        Ok(())
    }

    /// Single immediate read of `.status.startTime`. Never fails.
    async fn probe_start_time(&self, workload: &Workload, namespace: &str) -> Option<String> {
        let name = &workload.metadata().name;
        let args = [
            "get",
            workload.resource(),
            name.as_str(),
            "-n",
            namespace,
            "-o",
            "jsonpath={.status.startTime}",
        ];
        match self.kubectl(&args).await {
            Ok(out) if out.success() && !out.stdout.is_empty() => Some(out.stdout),
            Ok(_) => None,
            Err(err) => {
                tracing::debug!(error = %err, "Start-time probe failed");
                None
            }
        }
    }
}

/// `{team}-{category}-{hash8}` where the hash covers team, user, category
/// and command. Identical inputs always yield the same name.
pub fn stable_name(job: &JobSpec) -> String {
    let category: &'static str = job.category().into();
    let digest = Sha256::digest(format!(
        "{}|{}|{}|{}",
        job.team(),
        job.user(),
        category,
        job.command()
    ));
    let hash = hex::encode(digest);
    format!("{}-{}-{}", job.team(), category, &hash[..8])
}

fn labels(job: &JobSpec, with_priority: bool) -> BTreeMap<String, String> {
    let category: &'static str = job.category().into();
    let mut labels = BTreeMap::from([
        ("team".to_string(), job.team().to_string()),
        ("job_type".to_string(), category.to_string()),
    ]);
    if with_priority {
        labels.insert("priority".to_string(), job.priority().to_string());
    }
    labels
}

fn container(job: &JobSpec) -> Container {
    let gpus = BTreeMap::from([(GPU_RESOURCE.to_string(), job.gpus())]);
    Container {
        name: "main".to_string(),
        image: job.image().to_string(),
        image_pull_policy: "IfNotPresent".to_string(),
        command: vec![
            "/bin/bash".to_string(),
            "-lc".to_string(),
            job.command().to_string(),
        ],
        env: job
            .env()
            .iter()
            .map(|(name, value)| EnvVar {
                name: name.clone(),
                value: value.clone(),
            })
            .collect(),
        resources: ResourceRequirements {
            limits: gpus.clone(),
            requests: gpus,
        },
        volume_mounts: vec![VolumeMount {
            name: WORKSPACE_VOLUME.to_string(),
            mount_path: WORKSPACE_MOUNT_PATH.to_string(),
        }],
        working_dir: WORKSPACE_MOUNT_PATH.to_string(),
    }
}

fn pod_spec(job: &JobSpec) -> PodSpec {
    PodSpec {
        restart_policy: "Never".to_string(),
        containers: vec![container(job)],
        volumes: vec![Volume::workspace()],
    }
}

/// Run-to-completion Job; the orchestrator never retries it.
pub fn inference_job(job: &JobSpec, name: &str, namespace: &str) -> BatchJob {
    BatchJob {
        api_version: "batch/v1".to_string(),
        kind: "Job".to_string(),
        metadata: ObjectMeta {
            name: name.to_string(),
            namespace: namespace.to_string(),
            labels: labels(job, true),
            annotations: BTreeMap::new(),
        },
        spec: BatchJobSpec {
            backoff_limit: 0,
            template: PodTemplate {
                metadata: TemplateMeta {
                    labels: labels(job, false),
                },
                spec: pod_spec(job),
            },
        },
    }
}

/// Long-lived Pod flagged for time-sliced GPU sharing.
pub fn interactive_pod(job: &JobSpec, name: &str, namespace: &str) -> Pod {
    Pod {
        api_version: "v1".to_string(),
        kind: "Pod".to_string(),
        metadata: ObjectMeta {
            name: name.to_string(),
            namespace: namespace.to_string(),
            labels: labels(job, true),
            annotations: BTreeMap::from([
                (SHARING_ANNOTATION.to_string(), "time-slicing".to_string()),
                (INTERACTIVE_ANNOTATION.to_string(), "true".to_string()),
            ]),
        },
        spec: pod_spec(job),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::Priority;
    use crate::process::fake::FakeRunner;
    use proptest::prelude::*;
    use serde_json::json;

    fn inference_spec() -> JobSpec {
        JobSpec::builder()
            .team("recsys-eu")
            .user("bob")
            .category(JobCategory::Inference)
            .gpus(2)
            .duration_hours(1.0)
            .image("ghcr.io/acme/ranker:1.2")
            .priority(Priority::High)
            .command("python serve.py --port 8080")
            .env_var("MODEL", "ranker-v2")
            .build()
            .unwrap()
    }

    fn interactive_spec() -> JobSpec {
        JobSpec::builder()
            .team("vision-china")
            .user("li")
            .category(JobCategory::Interactive)
            .gpus(1)
            .duration_hours(4.0)
            .image("jupyter/scipy-notebook")
            .priority(Priority::Normal)
            .command("jupyter lab")
            .namespace(Some("notebooks".into()))
            .name(Some("li-notebook".into()))
            .build()
            .unwrap()
    }

    #[test]
    fn stable_name_is_deterministic() {
        let a = stable_name(&inference_spec());
        let b = stable_name(&inference_spec());
        assert_eq!(a, b);
        assert!(a.starts_with("recsys-eu-inference-"));
        let hash = a.trim_start_matches("recsys-eu-inference-");
        assert_eq!(hash.len(), 8);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn stable_name_tracks_command() {
        let changed = JobSpec::builder()
            .team("recsys-eu")
            .user("bob")
            .category(JobCategory::Inference)
            .gpus(2)
            .duration_hours(1.0)
            .image("ghcr.io/acme/ranker:1.2")
            .priority(Priority::High)
            .command("python serve.py --port 9090")
            .build()
            .unwrap();
        assert_ne!(stable_name(&inference_spec()), stable_name(&changed));
    }

    #[test]
    fn renders_inference_job() {
        let runner = FakeRunner::default();
        let settings = KubernetesSettings::default();
        let backend = KubernetesBackend::new(&runner, &settings);
        let job = inference_spec();

        let (namespace, workload) = backend.render(&job).unwrap();
        assert_eq!(namespace, "recsys-eu");
        let name = stable_name(&job);
        let value = serde_json::to_value(&workload).unwrap();
        assert_eq!(
            value,
            json!({
                "apiVersion": "batch/v1",
                "kind": "Job",
                "metadata": {
                    "name": name,
                    "namespace": "recsys-eu",
                    "labels": {"team": "recsys-eu", "job_type": "inference", "priority": "high"}
                },
                "spec": {
                    "backoffLimit": 0,
                    "template": {
                        "metadata": {"labels": {"team": "recsys-eu", "job_type": "inference"}},
                        "spec": {
                            "restartPolicy": "Never",
                            "containers": [{
                                "name": "main",
                                "image": "ghcr.io/acme/ranker:1.2",
                                "imagePullPolicy": "IfNotPresent",
                                "command": ["/bin/bash", "-lc", "python serve.py --port 8080"],
                                "env": [{"name": "MODEL", "value": "ranker-v2"}],
                                "resources": {
                                    "limits": {"nvidia.com/gpu": 2},
                                    "requests": {"nvidia.com/gpu": 2}
                                },
                                "volumeMounts": [{"name": "workspace", "mountPath": "/workspace"}],
                                "workingDir": "/workspace"
                            }],
                            "volumes": [{"name": "workspace", "emptyDir": {}}]
                        }
                    }
                }
            })
        );
    }

    #[test]
    fn renders_interactive_pod_with_annotations() {
        let runner = FakeRunner::default();
        let settings = KubernetesSettings::default();
        let backend = KubernetesBackend::new(&runner, &settings);

        let (namespace, workload) = backend.render(&interactive_spec()).unwrap();
        assert_eq!(namespace, "notebooks");
        let Workload::Pod(pod) = workload else {
            panic!("interactive jobs render a Pod");
        };
        assert_eq!(pod.kind, "Pod");
        assert_eq!(pod.metadata.name, "li-notebook");
        assert_eq!(pod.metadata.annotations[SHARING_ANNOTATION], "time-slicing");
        assert_eq!(pod.metadata.annotations[INTERACTIVE_ANNOTATION], "true");
        assert_eq!(pod.spec.restart_policy, "Never");
        assert_eq!(pod.spec.containers[0].resources.limits[GPU_RESOURCE], 1);
    }

    #[test]
    fn training_is_not_handled() {
        let runner = FakeRunner::default();
        let settings = KubernetesSettings::default();
        let backend = KubernetesBackend::new(&runner, &settings);
        let job = crate::core::job::tests::training_builder().build().unwrap();
        assert!(matches!(
            backend.render(&job),
            Err(SubmitError::UnsupportedCategory(_))
        ));
    }

    #[tokio::test]
    async fn dry_run_has_no_side_effects() {
        let runner = FakeRunner::with_tools(&["kubectl"]);
        let settings = KubernetesSettings::default();
        let backend = KubernetesBackend::new(&runner, &settings);

        let result = backend.submit(&interactive_spec(), true).await.unwrap();
        assert_eq!(result.job_id, "DRY_RUN");
        assert_eq!(result.details["namespace"], "notebooks");
        assert_eq!(result.details["manifest_object"]["kind"], "Pod");
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn creates_missing_namespace_then_applies() {
        let runner = FakeRunner::with_tools(&["kubectl"])
            .reply("kubectl", 1, "", "namespaces \"recsys-eu\" not found")
            .reply("kubectl", 0, "namespace/recsys-eu created", "")
            .reply("kubectl", 0, "job.batch/x created", "")
            .reply("kubectl", 0, "2026-10-18T09:30:00Z", "");
        let settings = KubernetesSettings::default();
        let backend = KubernetesBackend::new(&runner, &settings);
        let job = inference_spec();
        let name = stable_name(&job);

        let result = backend.submit(&job, false).await.unwrap();
        assert_eq!(result.backend, BackendKind::Orchestrator);
        assert_eq!(result.job_id, name);
        assert_eq!(result.expected_start_time, "2026-10-18T09:30:00Z");
        assert_eq!(result.details["kubectl_apply"], "job.batch/x created");
        assert_eq!(result.details["namespace"], "recsys-eu");

        let calls = runner.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0], ["kubectl", "get", "ns", "recsys-eu"]);
        assert_eq!(calls[1], ["kubectl", "create", "ns", "recsys-eu"]);
        assert_eq!(calls[2][..3], ["kubectl", "apply", "-f"]);
        assert!(calls[2][3].ends_with(".json"));
        assert_eq!(calls[2][4..], ["-n", "recsys-eu"]);
        assert!(!std::path::Path::new(&calls[2][3]).exists());
        assert_eq!(
            calls[3],
            [
                "kubectl",
                "get",
                "job",
                name.as_str(),
                "-n",
                "recsys-eu",
                "-o",
                "jsonpath={.status.startTime}"
            ]
        );

        let applied: Workload = serde_json::from_str(&runner.artifacts()[0]).unwrap();
        assert_eq!(applied, backend.render(&job).unwrap().1);
    }

    #[tokio::test]
    async fn namespace_creation_failure_does_not_stop_apply() {
        let runner = FakeRunner::with_tools(&["kubectl"])
            .reply("kubectl", 1, "", "not found")
            .reply("kubectl", 1, "", "forbidden")
            .reply("kubectl", 0, "pod/li-notebook created", "");
        let settings = KubernetesSettings::default();
        let backend = KubernetesBackend::new(&runner, &settings);

        let before = now_utc_iso();
        let result = backend.submit(&interactive_spec(), false).await.unwrap();
        assert_eq!(result.job_id, "li-notebook");
        // Probe reply missing: falls back to the submission time.
        assert!(result.expected_start_time >= before);
        assert_eq!(runner.calls().len(), 4);
        assert_eq!(runner.calls()[3][2], "pod");
    }

    #[tokio::test]
    async fn apply_failure_is_submission_failure() {
        let runner = FakeRunner::with_tools(&["kubectl"])
            .reply("kubectl", 0, "namespace/notebooks", "")
            .reply("kubectl", 1, "", "error: quota exceeded in namespace");
        let settings = KubernetesSettings::default();
        let backend = KubernetesBackend::new(&runner, &settings);

        let err = backend.submit(&interactive_spec(), false).await.unwrap_err();
        match err {
            SubmitError::SubmissionFailed(msg) => assert_eq!(
                msg,
                "kubectl apply failed (rc=1): error: quota exceeded in namespace"
            ),
            other => panic!("unexpected error: {other:?}"),
        }
        // No probe after a failed apply.
        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1][3].ends_with(".json"));
        assert!(!std::path::Path::new(&calls[1][3]).exists());
    }

    proptest! {
        #[test]
        fn prop_stable_name_depends_on_identity(
            user in "[a-z]{1,8}",
            command in "[a-z ./-]{1,32}",
        ) {
            let build = |command: &str| {
                JobSpec::builder()
                    .team("nlp-us")
                    .user(user.clone())
                    .category(JobCategory::Interactive)
                    .gpus(1)
                    .duration_hours(1.0)
                    .image("img")
                    .priority(Priority::Normal)
                    .command(command)
                    .build()
            };
            let Ok(job) = build(&command) else {
                // Whitespace-only commands are rejected before naming.
                return Ok(());
            };
            let again = build(&command).unwrap();
            prop_assert_eq!(stable_name(&job), stable_name(&again));
        }
    }
}
