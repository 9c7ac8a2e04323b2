//! 场景执行测试（脚本化命令执行器，不访问真实集群和云服务）

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;
use vpst_command_runner::{CommandExecutor, CommandOutput, CommandSpec, RunnerError};
use vpst_executor::metrics::{CM_SIMPLE, CM_VOLUME_FROM_BACKUP};
use vpst_executor::*;

const TEST_ID: &str = "1a2b3c4d";
const VOLUME: &str = "ocid1.volume.oc1.phx.abc123";
const COMPARTMENT: &str = "ocid1.compartment.oc1..c1";

/// 按参数片段匹配命令，依次返回预设输出（最后一个输出重复使用）
#[derive(Default)]
struct ScriptedRunner {
    rules: Mutex<Vec<(String, Vec<String>, VecDeque<CommandOutput>)>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    fn on(self, program: &str, needle: &[&str], outputs: Vec<CommandOutput>) -> Self {
        self.rules.lock().unwrap().push((
            program.to_string(),
            needle.iter().map(|s| s.to_string()).collect(),
            outputs.into(),
        ));
        self
    }

    fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, program: &str, needle: &[&str]) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.program == program && c.has_args(needle))
            .count()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedRunner {
    async fn spawn(&self, spec: &CommandSpec) -> vpst_command_runner::Result<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());
        let mut rules = self.rules.lock().unwrap();
        for (program, needle, outputs) in rules.iter_mut() {
            let needle: Vec<&str> = needle.iter().map(String::as_str).collect();
            if &spec.program == program && spec.has_args(&needle) {
                let output = if outputs.len() > 1 {
                    outputs.pop_front()
                } else {
                    outputs.front().cloned()
                };
                if let Some(output) = output {
                    return Ok(output);
                }
            }
        }
        Err(RunnerError::SpawnError {
            command: spec.command_line(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no scripted output"),
        })
    }
}

fn ok(stdout: &str) -> CommandOutput {
    CommandOutput::success(stdout)
}

fn claims(status: &str, claim: &str) -> CommandOutput {
    ok(&format!(
        "NAME STATUS VOLUME CAPACITY\n{} {} {} 50Gi\n",
        claim, status, VOLUME
    ))
}

fn volumes(id: &str, state: &str) -> CommandOutput {
    ok(&format!(
        r#"[{{"id": "{}", "lifecycle-state": "{}", "display-name": "v"}}]"#,
        id, state
    ))
}

fn nodes() -> CommandOutput {
    ok(concat!(
        r#"{"items": [{"metadata": {"labels": "#,
        r#"{"failure-domain.beta.kubernetes.io/zone": "PHX"}}}]}"#,
    ))
}

fn write_templates(dir: &Path) {
    let templates = dir.join("templates");
    fs::create_dir_all(&templates).unwrap();
    fs::write(
        templates.join("example-claim.template"),
        "kind: PersistentVolumeClaim\nmetadata:\n  \
         name: demooci-{{TEST_ID}}\n  \
         region: \"{{REGION}}\"\n",
    )
    .unwrap();
    fs::write(
        templates.join("example-claim-from-backup.template"),
        "metadata:\n  \
         name: demooci-from-backup-{{TEST_ID}}\n  \
         region: \"{{REGION}}\"\n  \
         backup: \"{{BACKUP_ID}}\"\n",
    )
    .unwrap();
    fs::write(
        templates.join("replication-controller.yaml.template"),
        "metadata:\n  \
         name: nginx-controller-{{TEST_ID}}\n  \
         volume: \"{{VOLUME_NAME}}\"\n  \
         ad: \"{{AVAILABILITY_DOMAIN}}\"\n",
    )
    .unwrap();
}

fn context(dir: &TempDir, runner: Arc<ScriptedRunner>, check_oci: bool) -> RunContext {
    write_templates(dir.path());

    let mut config = RunConfig::default();
    config.poll.max_attempts = 3;
    config.poll.interval = Duration::from_millis(1);
    config.report.enabled = false;
    config.paths.templates_dir = dir.path().join("templates");
    config.paths.work_dir = Some(dir.path().join("out"));
    config.metrics_file = Some(dir.path().join("metrics.json"));

    let options = RunOptions::new(check_oci).with_test_id(TEST_ID);
    let mut ctx = RunContext::new(config, options, runner);
    ctx.compartment_id = Some(COMPARTMENT.to_string());
    ctx
}

fn block_runner() -> ScriptedRunner {
    ScriptedRunner::default()
        .on("kubectl", &["get", "nodes"], vec![nodes()])
        .on("kubectl", &["create", "-f"], vec![ok("")])
        .on("kubectl", &["delete", "-f"], vec![ok("")])
}

#[tokio::test]
async fn test_simple_scenario_passes() {
    let dir = tempfile::tempdir().unwrap();
    let claim = format!("demooci-{}", TEST_ID);
    let runner = Arc::new(
        block_runner()
            .on(
                "kubectl",
                &["get", "PersistentVolumeClaim"],
                vec![claims("Pending", &claim), claims("Bound", &claim)],
            )
            .on(
                "oci",
                &["bv", "volume", "list"],
                vec![volumes(VOLUME, "AVAILABLE"), volumes(VOLUME, "TERMINATED")],
            ),
    );
    let mut ctx = context(&dir, runner.clone(), true);

    let suite = Suite::builtin(SuiteKind::Block, &ctx.config, false)
        .with_scenarios(vec![Scenario::simple()]);
    let report = ScenarioRunner::new(&mut ctx).run_suite(&suite).await.unwrap();

    assert!(report.passed, "{:?}", report);
    assert_eq!(report.exit_code(), 0);
    let steps = &report.reports[0].steps;
    assert_eq!(steps.len(), 5);
    assert!(steps.iter().all(|s| s.status == StepStatus::Success));
    assert_eq!(steps[1].output.as_deref(), Some(VOLUME));

    // 渲染后的 PVC 带有测试 ID 和集群区域
    let rendered = fs::read_to_string(dir.path().join("out/example-claim.template.yaml")).unwrap();
    assert!(rendered.contains(&claim));
    assert!(rendered.contains("region: \"PHX\""));

    // 区域只查询一次；PVC 描述在删除步骤中删除一次
    assert_eq!(runner.count("kubectl", &["get", "nodes"]), 1);
    assert_eq!(runner.count("kubectl", &["delete", "-f"]), 1);
    assert_eq!(runner.count("kubectl", &["get", "PersistentVolumeClaim"]), 2);

    assert_eq!(ctx.metrics.get(CM_SIMPLE), Some(&Value::from(1)));

    // PVC 删除已注册为退出清理
    assert_eq!(ctx.finalizer.pending(), 1);
    assert_eq!(ctx.finalize(0).await, 0);
    assert_eq!(ctx.finalizer.pending(), 0);
    assert_eq!(runner.count("kubectl", &["delete", "-f"]), 2);

    let metrics: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("metrics.json")).unwrap())
            .unwrap();
    assert_eq!(metrics[CM_SIMPLE], Value::from(1));
    assert!(metrics.get("end_time").is_some());
}

#[tokio::test]
async fn test_claim_never_bound_fails_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let claim = format!("demooci-{}", TEST_ID);
    let runner = Arc::new(block_runner().on(
        "kubectl",
        &["get", "PersistentVolumeClaim"],
        vec![claims("Pending", &claim)],
    ));
    let mut ctx = context(&dir, runner.clone(), true);

    let report = ScenarioRunner::new(&mut ctx)
        .run(&Scenario::simple())
        .await
        .unwrap();

    assert!(!report.passed);
    assert_eq!(report.steps_executed, 2);
    assert_eq!(report.steps[1].status, StepStatus::Failed);
    assert!(report.steps[1].error.as_deref().unwrap().contains("3"));
    // 超时后不再查询供应商
    assert_eq!(runner.count("oci", &[]), 0);
    assert_eq!(runner.count("kubectl", &["get", "PersistentVolumeClaim"]), 3);
    assert_eq!(ctx.metrics.get(CM_SIMPLE), Some(&Value::from(0)));
}

#[tokio::test]
async fn test_provider_steps_skipped_without_check_oci() {
    let dir = tempfile::tempdir().unwrap();
    let claim = format!("demooci-{}", TEST_ID);
    let runner = Arc::new(block_runner().on(
        "kubectl",
        &["get", "PersistentVolumeClaim"],
        vec![claims("Bound", &claim)],
    ));
    let mut ctx = context(&dir, runner.clone(), false);

    let report = ScenarioRunner::new(&mut ctx)
        .run(&Scenario::simple())
        .await
        .unwrap();

    assert!(report.passed);
    assert_eq!(report.passed_count, 3);
    assert_eq!(
        report
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Skipped)
            .count(),
        2
    );
    assert_eq!(runner.count("oci", &[]), 0);
}

#[tokio::test]
async fn test_malformed_provider_response_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let claim = format!("demooci-{}", TEST_ID);
    let runner = Arc::new(
        block_runner()
            .on(
                "kubectl",
                &["get", "PersistentVolumeClaim"],
                vec![claims("Bound", &claim)],
            )
            .on("oci", &["bv", "volume", "list"], vec![ok("not json")]),
    );
    let mut ctx = context(&dir, runner, true);

    let err = ScenarioRunner::new(&mut ctx)
        .run(&Scenario::simple())
        .await
        .unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(ctx.metrics.get(CM_SIMPLE), Some(&Value::from(0)));
    // 已注册的清理仍然会在退出时执行
    assert_eq!(ctx.finalizer.pending(), 1);
}

fn backup_runner(claim_outputs: Vec<CommandOutput>) -> ScriptedRunner {
    let terraform_output = concat!(
        r#"{"availability_domain": {"value": "NWuj:PHX-AD-2"}, "#,
        r#""volume_ocid": {"value": "ocid1.volume.oc1.phx.source1"}}"#,
    );
    block_runner()
        .on("terraform", &["init"], vec![ok("")])
        .on("terraform", &["apply"], vec![ok("")])
        .on("terraform", &["destroy"], vec![ok("")])
        .on("terraform", &["output"], vec![ok(terraform_output)])
        .on(
            "kubectl",
            &["get", "pods"],
            vec![ok(&format!(
                "NAME READY STATUS RESTARTS AGE IP NODE\n\
                 nginx-controller-{}-x1 1/1 Running 0 1m 10.0.0.1 node-1\n",
                TEST_ID
            ))],
        )
        .on("kubectl", &["exec"], vec![ok("hello.txt\nindex.html\n")])
        .on(
            "oci",
            &["bv", "backup", "create"],
            vec![ok(&format!(
                concat!(
                    r#"{{"id": "ocid1.volumebackup.b1", "compartment-id": "{}", "#,
                    r#""display-name": "backup_volume_system_test{}"}}"#,
                ),
                COMPARTMENT, TEST_ID
            ))],
        )
        .on(
            "oci",
            &["bv", "backup", "list"],
            vec![volumes("ocid1.volumebackup.b1", "AVAILABLE")],
        )
        .on("oci", &["bv", "backup", "delete"], vec![ok("")])
        .on("kubectl", &["get", "PersistentVolumeClaim"], claim_outputs)
        .on(
            "oci",
            &["bv", "volume", "list"],
            vec![volumes(VOLUME, "AVAILABLE"), volumes(VOLUME, "TERMINATED")],
        )
}

#[tokio::test]
async fn test_volume_from_backup_flow() {
    let dir = tempfile::tempdir().unwrap();
    let claim = format!("demooci-from-backup-{}", TEST_ID);
    let runner = Arc::new(backup_runner(vec![claims("Bound", &claim)]));
    let mut ctx = context(&dir, runner.clone(), true);

    let suite = Suite::builtin(SuiteKind::Backup, &ctx.config, true)
        .with_scenarios(vec![Scenario::volume_from_backup()]);
    suite.validate(&ctx.config, true).unwrap();
    let report = ScenarioRunner::new(&mut ctx).run_suite(&suite).await.unwrap();

    assert!(report.passed, "{:?}", report);
    assert_eq!(report.reports[0].steps.len(), 10);
    assert_eq!(ctx.metrics.get(CM_VOLUME_FROM_BACKUP), Some(&Value::from(1)));

    // 恢复 PVC 的区域取自可用域，带有备份 ID
    let rendered = fs::read_to_string(
        dir.path()
            .join("out/example-claim-from-backup.template.yaml"),
    )
    .unwrap();
    assert!(rendered.contains("region: \"PHX-AD-2\""));
    assert!(rendered.contains("backup: \"ocid1.volumebackup.b1\""));

    // 源卷上写入文件，恢复卷上只检查
    assert_eq!(runner.count("kubectl", &["touch"]), 1);
    assert_eq!(runner.count("kubectl", &["ls"]), 2);
    assert_eq!(runner.count("oci", &["bv", "backup", "delete"]), 1);

    // 退出清理: terraform destroy 执行，备份已删除不再重复删除
    ctx.finalize(0).await;
    assert_eq!(runner.count("terraform", &["destroy"]), 1);
    assert_eq!(runner.count("oci", &["bv", "backup", "delete"]), 1);
}

#[tokio::test]
async fn test_backup_deleted_at_exit_when_scenario_fails() {
    let dir = tempfile::tempdir().unwrap();
    let claim = format!("demooci-from-backup-{}", TEST_ID);
    // 恢复的 PVC 一直未绑定
    let runner = Arc::new(backup_runner(vec![claims("Pending", &claim)]));
    let mut ctx = context(&dir, runner.clone(), true);

    let report = ScenarioRunner::new(&mut ctx)
        .run(&Scenario::volume_from_backup())
        .await
        .unwrap();

    assert!(!report.passed);
    assert_eq!(runner.count("oci", &["bv", "backup", "delete"]), 0);

    ctx.finalize(1).await;
    assert_eq!(runner.count("oci", &["bv", "backup", "delete"]), 1);
    assert_eq!(runner.count("terraform", &["destroy"]), 1);
}

#[tokio::test]
async fn test_teardown_runs_after_claim_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let claim = format!("demooci-{}", TEST_ID);
    // PVC 一直未绑定，删除留给退出清理
    let runner = Arc::new(
        block_runner()
            .on(
                "kubectl",
                &["get", "PersistentVolumeClaim"],
                vec![claims("Pending", &claim)],
            )
            .on("kubectl", &["delete", "secret"], vec![ok("")]),
    );
    let mut ctx = context(&dir, runner.clone(), false);

    let suite = Suite::builtin(SuiteKind::Block, &ctx.config, false)
        .with_scenarios(vec![Scenario::simple()]);
    ctx.schedule_teardown(&suite);
    let report = ScenarioRunner::new(&mut ctx).run_suite(&suite).await.unwrap();
    assert!(!report.passed);

    let pending = ctx.finalizer.pending_names();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].starts_with("删除 PVC"));

    assert_eq!(ctx.finalize(report.exit_code()).await, 1);

    let deletes: Vec<CommandSpec> = runner
        .calls()
        .into_iter()
        .filter(|c| c.has_args(&["delete"]))
        .collect();
    assert_eq!(deletes.len(), suite.resources.len() + 2);
    assert!(deletes[0].args.iter().any(|a| a.contains("example-claim")));
    for (spec, resource) in deletes[1..].iter().zip(&suite.resources) {
        assert!(spec.args.contains(&ctx.dist_path(resource).display().to_string()));
    }
    assert!(deletes.last().unwrap().has_args(&["delete", "secret"]));
}

#[tokio::test]
async fn test_missing_cluster_region_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(
        ScriptedRunner::default()
            .on("kubectl", &["get", "nodes"], vec![ok(r#"{"items": []}"#)])
            .on("kubectl", &["create", "-f"], vec![ok("")]),
    );
    let mut ctx = context(&dir, runner.clone(), false);

    let err = ScenarioRunner::new(&mut ctx)
        .run(&Scenario::simple())
        .await
        .unwrap_err();

    assert!(err.is_fatal());
    assert!(matches!(err, ExecutorError::EnvironmentError(_)));
    // 没有区域时不渲染也不提交 PVC
    assert_eq!(runner.count("kubectl", &["create", "-f"]), 0);
    assert!(!dir.path().join("out/example-claim.template.yaml").exists());
    assert_eq!(ctx.finalizer.pending(), 0);
}
