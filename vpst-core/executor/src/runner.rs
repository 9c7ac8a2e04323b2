//! 场景执行器

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use vpst_inspector::{
    list_contains_file, InspectError, Kubectl, Lifecycle, PodSelector, ProviderQuery,
    StorageKind, AVAILABILITY_DOMAIN_VAR, VOLUME_OCID_VAR,
};

use crate::context::RunContext;
use crate::poller::PollOutcome;
use crate::scenario::{RegionSource, Scenario, Step, Suite, WorkloadSpec, WorkloadVolume};
use crate::template::TemplateValues;
use crate::{ExecutorError, Result};

/// 备份 ID，由删除步骤和退出清理共享，谁先取走谁删除
type BackupSlot = Arc<Mutex<Option<String>>>;

fn store_backup(slot: &BackupSlot, backup_id: String) {
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(backup_id);
}

fn take_backup(slot: &BackupSlot) -> Option<String> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

/// 单个场景执行过程中的状态
#[derive(Debug, Default)]
struct ScenarioState {
    /// 生成的 PVC 资源描述
    descriptor: Option<PathBuf>,
    /// PVC 绑定的卷
    volume: Option<String>,
    /// 待删除的备份
    backup: BackupSlot,
    /// 用于恢复的备份 ID
    backup_id: Option<String>,
    availability_domain: Option<String>,
    source_volume_id: Option<String>,
    source_volume_name: Option<String>,
}

/// 卷 OCID 的最后一段
fn short_name(volume: &str) -> String {
    volume.rsplit('.').next().unwrap_or(volume).to_string()
}

fn missing(what: &str) -> ExecutorError {
    ExecutorError::StepExecutionFailed(format!("缺少前置步骤产生的{}", what))
}

/// 场景执行器
pub struct ScenarioRunner<'a> {
    ctx: &'a mut RunContext,
}

impl<'a> ScenarioRunner<'a> {
    /// 创建新的场景执行器
    pub fn new(ctx: &'a mut RunContext) -> Self {
        Self { ctx }
    }

    /// 执行套件
    ///
    /// 先提交套件的前置资源（例如 FSS 存储类），再依次执行每个场景。
    /// 场景失败不影响后续场景；致命错误立即返回。
    pub async fn run_suite(&mut self, suite: &Suite) -> Result<SuiteReport> {
        let start_time = Instant::now();
        let mut report = SuiteReport::new(suite.name());

        self.ctx.metrics.schedule(suite.metrics());
        self.submit_prerequisites(suite).await?;

        for scenario in &suite.scenarios {
            info!("********************************************************");
            info!("运行系统测试: {}", scenario.name);
            info!("********************************************************");

            let scenario_report = self.run(scenario).await?;
            report.add_report(scenario_report);
        }

        report.duration_ms = start_time.elapsed().as_millis() as u64;

        info!(
            "套件 {} 执行完成: {}/{} 场景通过",
            report.suite_name, report.passed_count, report.total
        );

        Ok(report)
    }

    async fn submit_prerequisites(&mut self, suite: &Suite) -> Result<()> {
        if suite.prerequisites.is_empty() {
            return Ok(());
        }

        let values = TemplateValues::new(self.ctx.test_id.clone())
            .mount_target_ocid(self.ctx.config.fss.mount_target_ocid.clone())
            .subnet_ocid(self.ctx.config.fss.subnet_ocid.clone());

        for template in &suite.prerequisites {
            let path = self.ctx.render(template, &values)?;
            self.register_delete(format!("删除 {}", path.display()), path.clone());
            if !self.ctx.kubectl.try_create_file(&path).await? {
                warn!("提交前置资源失败: {}", path.display());
            }
        }

        Ok(())
    }

    /// 执行场景
    ///
    /// 步骤按顺序执行，任一步骤失败即停止该场景。致命错误在记录失败步骤后返回 `Err`。
    pub async fn run(&mut self, scenario: &Scenario) -> Result<ExecutionReport> {
        info!("开始执行场景: {}", scenario.name);

        let start_time = Instant::now();
        let mut report = ExecutionReport::new(&scenario.name);
        report.description = scenario.description.clone();
        report.tags = scenario.tags.clone();

        let mut state = ScenarioState {
            availability_domain: scenario.availability_domain.clone(),
            ..ScenarioState::default()
        };
        let mut fatal = None;

        for (index, step) in scenario.steps.iter().enumerate() {
            info!("执行步骤 {}/{}: {}", index + 1, scenario.steps.len(), step.description());

            let step_start = Instant::now();
            let step_result = self.execute_step(scenario, step, index, &mut state).await;
            let duration_ms = step_start.elapsed().as_millis() as u64;

            match step_result {
                Ok(mut result) => {
                    result.duration_ms = duration_ms;
                    let failed = result.status == StepStatus::Failed;
                    if failed {
                        error!(
                            "步骤 {} 失败: {}",
                            index + 1,
                            result.error.as_deref().unwrap_or_default()
                        );
                    } else {
                        info!("步骤 {} 完成: {}", index + 1, result.description);
                    }
                    report.add_step(result);
                    if failed {
                        break;
                    }
                }
                Err(e) => {
                    error!("步骤 {} 失败: {}", index + 1, e);
                    let mut failed_step =
                        StepReport::failed(index, step.description(), &e.to_string());
                    failed_step.duration_ms = duration_ms;
                    report.add_step(failed_step);
                    if e.is_fatal() {
                        fatal = Some(e);
                    }
                    break; // 失败后停止执行
                }
            }
        }

        report.duration_ms = start_time.elapsed().as_millis() as u64;

        if let Some(metric) = &scenario.metric {
            self.ctx.metrics.record(metric, report.passed);
        }

        if let Some(e) = fatal {
            error!("场景 {} 遇到致命错误，中止运行", scenario.name);
            return Err(e);
        }

        info!(
            "场景执行完成: {} - {}/{} 步骤成功",
            scenario.name, report.passed_count, report.steps_executed
        );

        Ok(report)
    }

    async fn execute_step(
        &mut self,
        scenario: &Scenario,
        step: &Step,
        index: usize,
        state: &mut ScenarioState,
    ) -> Result<StepReport> {
        match step {
            Step::ProvisionSourceVolume => self.provision_source_volume(index, state).await,
            Step::CreateBackup => self.create_backup(index, state).await,
            Step::Submit => self.submit(scenario, index, state).await,
            Step::AwaitBound => self.await_bound(scenario, index, state).await,
            Step::AwaitProvider { lifecycle } => {
                self.await_provider(scenario, *lifecycle, index, state).await
            }
            Step::Exercise { workload } => {
                let workload = workload
                    .as_ref()
                    .or(scenario.workload.as_ref())
                    .ok_or_else(|| {
                        ExecutorError::StepExecutionFailed("场景没有配置工作负载".to_string())
                    })?;
                self.exercise(scenario, workload, index, state).await
            }
            Step::Delete => self.delete(index, state).await,
            Step::DeleteBackup => self.delete_backup(index, state).await,
        }
    }

    fn register_delete(&mut self, name: String, path: PathBuf) {
        let kubectl = self.ctx.kubectl.clone();
        self.ctx.finalizer.register(name, move || async move {
            kubectl
                .delete_file(&path, false)
                .await
                .map_err(anyhow::Error::from)
        });
    }

    async fn submit(
        &mut self,
        scenario: &Scenario,
        index: usize,
        state: &mut ScenarioState,
    ) -> Result<StepReport> {
        let region = match scenario.region {
            RegionSource::None => None,
            RegionSource::Cluster => Some(self.ctx.cluster_region().await?),
            RegionSource::AvailabilityDomain => state.availability_domain.as_ref().map(|ad| {
                ad.split(':').nth(1).unwrap_or(ad.as_str()).to_string()
            }),
        };

        let values = TemplateValues::new(self.ctx.test_id.clone())
            .region(region)
            .backup_id(state.backup_id.clone());
        let descriptor = self.ctx.render(&scenario.claim_template, &values)?;

        self.register_delete(format!("删除 PVC {}", descriptor.display()), descriptor.clone());

        let claim_name = scenario.claim_name_for(&self.ctx.test_id);
        if !self.ctx.kubectl.try_create_file(&descriptor).await? {
            warn!("提交 PVC {} 失败，继续等待绑定", claim_name);
        }
        state.descriptor = Some(descriptor);

        Ok(StepReport::success(index, &format!("提交 PVC {}", claim_name)))
    }

    async fn await_bound(
        &mut self,
        scenario: &Scenario,
        index: usize,
        state: &mut ScenarioState,
    ) -> Result<StepReport> {
        let claim_name = scenario.claim_name_for(&self.ctx.test_id);
        let description = format!("等待 PVC {} 绑定", claim_name);
        let kubectl = &self.ctx.kubectl;
        let claim = claim_name.as_str();

        let outcome = self
            .ctx
            .poller
            .poll_until(&description, move || kubectl.bound_volume(claim))
            .await?;

        match outcome {
            PollOutcome::Reached { value, .. } => {
                info!("已创建卷: {}", value);
                let report = StepReport::success(index, &description).with_output(&value);
                state.volume = Some(value);
                Ok(report)
            }
            PollOutcome::TimedOut { polls } => Ok(StepReport::failed(
                index,
                &description,
                &format!("PVC 在 {} 次检测内未绑定", polls),
            )),
        }
    }

    fn provider_query(&self, scenario: &Scenario, state: &ScenarioState) -> Result<ProviderQuery> {
        let compartment_id = self.ctx.compartment_id.clone().ok_or_else(|| {
            ExecutorError::EnvironmentError(
                "没有 compartment ID，检查供应商资源需要 --setup".to_string(),
            )
        })?;

        Ok(match scenario.storage {
            StorageKind::Block => ProviderQuery::block(compartment_id),
            StorageKind::FileSystem => {
                let ad = state
                    .availability_domain
                    .clone()
                    .unwrap_or_else(|| self.ctx.config.fss.availability_domain.clone());
                ProviderQuery::file_system(compartment_id, ad)
            }
        })
    }

    async fn await_provider(
        &mut self,
        scenario: &Scenario,
        lifecycle: Lifecycle,
        index: usize,
        state: &mut ScenarioState,
    ) -> Result<StepReport> {
        let step = Step::AwaitProvider { lifecycle };
        if !self.ctx.check_oci {
            debug!("未启用供应商检查，跳过: {}", step.description());
            return Ok(StepReport::skipped(index, step.description()));
        }

        let volume = state.volume.clone().ok_or_else(|| missing("卷"))?;
        let query = self.provider_query(scenario, state)?;
        let target = query.lifecycle_state(lifecycle);
        let description = format!(
            "等待{} {} 进入 {}",
            query.resource_kind().display_name(),
            volume,
            target
        );

        let oci = &self.ctx.oci;
        let (query_ref, handle) = (&query, volume.as_str());
        let outcome = self
            .ctx
            .poller
            .poll_until_true(&description, move || oci.resource_in_state(query_ref, handle, target))
            .await?;

        Ok(if outcome.is_reached() {
            StepReport::success(index, &description)
        } else {
            StepReport::failed(
                index,
                &description,
                &format!("{} 在 {} 次检测内未进入 {}", volume, outcome.polls(), target),
            )
        })
    }

    async fn provision_source_volume(
        &mut self,
        index: usize,
        state: &mut ScenarioState,
    ) -> Result<StepReport> {
        let terraform = self.ctx.terraform.clone();
        let destroy = terraform.clone();
        self.ctx.finalizer.register("terraform destroy", move || async move {
            destroy.destroy().await.map_err(anyhow::Error::from)
        });

        info!("创建测试卷 (terraform)");
        terraform.init().await?;
        terraform.apply().await?;

        let availability_domain = terraform.output_var(AVAILABILITY_DOMAIN_VAR).await?;
        let volume_id = terraform.output_var(VOLUME_OCID_VAR).await?;
        let volume_name = short_name(&volume_id);
        info!("源卷 {} 位于 {}", volume_id, availability_domain);

        state.availability_domain = Some(availability_domain);
        state.source_volume_id = Some(volume_id.clone());
        state.source_volume_name = Some(volume_name);

        Ok(StepReport::success(index, "创建源卷").with_output(&volume_id))
    }

    async fn create_backup(
        &mut self,
        index: usize,
        state: &mut ScenarioState,
    ) -> Result<StepReport> {
        if !self.ctx.check_oci {
            return Err(ExecutorError::EnvironmentError(
                "创建卷备份需要 --check-oci".to_string(),
            ));
        }

        let volume_id = state.source_volume_id.clone().ok_or_else(|| missing("源卷"))?;
        let display_name = format!("backup_volume_system_test{}", self.ctx.test_id);

        let backup = self.ctx.oci.create_backup(&volume_id, &display_name).await?;
        info!("已创建备份 {} ({})", backup.display_name, backup.id);

        store_backup(&state.backup, backup.id.clone());
        let slot = state.backup.clone();
        let oci = self.ctx.oci.clone();
        self.ctx
            .finalizer
            .register(format!("删除备份 {}", backup.id), move || async move {
                match take_backup(&slot) {
                    Some(id) => oci.delete_backup(&id).await.map_err(anyhow::Error::from),
                    None => Ok(()),
                }
            });
        state.backup_id = Some(backup.id.clone());

        let query = ProviderQuery::backup(backup.compartment_id.clone());
        let target = query.lifecycle_state(Lifecycle::On);
        let description = format!("等待备份 {} 进入 {}", backup.id, target);
        let oci = &self.ctx.oci;
        let (query_ref, handle) = (&query, backup.id.as_str());
        let outcome = self
            .ctx
            .poller
            .poll_until_true(&description, move || oci.resource_in_state(query_ref, handle, target))
            .await?;

        Ok(if outcome.is_reached() {
            StepReport::success(index, &format!("创建卷备份 {}", display_name))
                .with_output(&backup.id)
        } else {
            StepReport::failed(
                index,
                &description,
                &format!("备份在 {} 次检测内未进入 {}", outcome.polls(), target),
            )
        })
    }

    async fn exercise(
        &mut self,
        scenario: &Scenario,
        workload: &WorkloadSpec,
        index: usize,
        state: &mut ScenarioState,
    ) -> Result<StepReport> {
        let volume_name = match workload.volume {
            WorkloadVolume::Claim => state.volume.as_deref().map(short_name),
            WorkloadVolume::Source => state.source_volume_name.clone(),
        }
        .ok_or_else(|| missing("卷"))?;

        let availability_domain = state
            .availability_domain
            .clone()
            .or_else(|| scenario.availability_domain.clone());
        let values = TemplateValues::new(self.ctx.test_id.clone())
            .volume_name(Some(volume_name.clone()))
            .availability_domain(availability_domain);
        let descriptor = self.ctx.render(&workload.template, &values)?;

        self.register_delete(format!("删除工作负载 {}", descriptor.display()), descriptor.clone());

        info!("启动工作负载 (挂载卷 {})", volume_name);
        let kubectl = self.ctx.kubectl.clone();
        kubectl.delete_file(&descriptor, false).await?;
        kubectl.create_file(&descriptor).await?;

        let description = format!("工作负载读写卷 {}", volume_name);
        let pod = match self.wait_for_workload(&kubectl, workload).await? {
            Some(pod) => pod,
            None => {
                kubectl.delete_file(&descriptor, true).await?;
                return Ok(StepReport::failed(
                    index,
                    &description,
                    &format!(
                        "工作负载 Pod {}{} 未进入 Running 状态",
                        workload.pod_prefix, self.ctx.test_id
                    ),
                ));
            }
        };

        if workload.write_file {
            kubectl.touch(&pod, &workload.file_path()).await?;
        }

        let verified = if workload.verify_file {
            info!("检查文件 {} 是否存在", workload.file_path());
            let listing = kubectl.list_directory(&pod, &workload.mount_dir).await?;
            list_contains_file(&listing, &workload.file_name)
        } else {
            true
        };

        info!("删除工作负载");
        kubectl.delete_file(&descriptor, true).await?;

        Ok(if verified {
            StepReport::success(index, &description).with_output(&pod)
        } else {
            StepReport::failed(
                index,
                &description,
                &format!("挂载卷中没有文件 {}", workload.file_name),
            )
        })
    }

    async fn wait_for_workload(
        &self,
        kubectl: &Kubectl,
        workload: &WorkloadSpec,
    ) -> Result<Option<String>> {
        let selector = &PodSelector::for_test(&workload.pod_prefix, &self.ctx.test_id);
        let outcome = self
            .ctx
            .poller
            .poll_until("工作负载 Pod 进入 Running", || async move {
                let pods = kubectl.pods(selector, None).await?;
                for pod in &pods {
                    info!("    - pod: {}, status: {}, node: {}", pod.name, pod.status, pod.node);
                }
                Ok::<_, InspectError>(
                    pods.into_iter().find(|p| p.status == "Running").map(|p| p.name),
                )
            })
            .await?;
        Ok(outcome.into_value())
    }

    async fn delete(&mut self, index: usize, state: &mut ScenarioState) -> Result<StepReport> {
        let descriptor = state.descriptor.clone().ok_or_else(|| missing("资源描述"))?;
        info!("删除 PVC");
        self.ctx.kubectl.delete_file(&descriptor, true).await?;
        Ok(StepReport::success(index, "删除 PVC"))
    }

    async fn delete_backup(
        &mut self,
        index: usize,
        state: &mut ScenarioState,
    ) -> Result<StepReport> {
        match take_backup(&state.backup) {
            Some(id) => {
                self.ctx.oci.delete_backup(&id).await?;
                Ok(StepReport::success(index, &format!("删除卷备份 {}", id)))
            }
            None => Ok(StepReport::skipped(index, "删除卷备份")),
        }
    }
}

/// 套件执行报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    /// 套件名称
    pub suite_name: String,

    /// 是否全部通过
    pub passed: bool,

    /// 场景数
    pub total: usize,

    /// 通过数
    pub passed_count: usize,

    /// 失败数
    pub failed_count: usize,

    /// 总耗时（毫秒）
    pub duration_ms: u64,

    /// 各场景的执行报告
    pub reports: Vec<ExecutionReport>,
}

impl SuiteReport {
    pub fn new(name: &str) -> Self {
        Self {
            suite_name: name.to_string(),
            passed: true,
            total: 0,
            passed_count: 0,
            failed_count: 0,
            duration_ms: 0,
            reports: Vec::new(),
        }
    }

    pub fn add_report(&mut self, report: ExecutionReport) {
        self.total += 1;
        if report.passed {
            self.passed_count += 1;
        } else {
            self.failed_count += 1;
            self.passed = false;
        }
        self.reports.push(report);
    }

    /// 进程退出码
    pub fn exit_code(&self) -> i32 {
        if self.passed {
            0
        } else {
            1
        }
    }

    /// 导出为 JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// 导出为 YAML
    pub fn to_yaml(&self) -> serde_yaml::Result<String> {
        serde_yaml::to_string(self)
    }
}

/// 执行报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// 场景名称
    pub scenario_name: String,

    /// 场景描述
    pub description: Option<String>,

    /// 标签
    pub tags: Vec<String>,

    /// 是否通过
    pub passed: bool,

    /// 执行的步骤数
    pub steps_executed: usize,

    /// 通过的步骤数
    pub passed_count: usize,

    /// 失败的步骤数
    pub failed_count: usize,

    /// 总耗时（毫秒）
    pub duration_ms: u64,

    /// 步骤报告列表
    pub steps: Vec<StepReport>,
}

impl ExecutionReport {
    pub fn new(name: &str) -> Self {
        Self {
            scenario_name: name.to_string(),
            description: None,
            tags: Vec::new(),
            passed: true,
            steps_executed: 0,
            passed_count: 0,
            failed_count: 0,
            duration_ms: 0,
            steps: Vec::new(),
        }
    }

    pub fn add_step(&mut self, step: StepReport) {
        self.steps_executed += 1;

        match step.status {
            StepStatus::Success => self.passed_count += 1,
            StepStatus::Failed => {
                self.failed_count += 1;
                self.passed = false;
            }
            StepStatus::Skipped => {}
        }

        self.steps.push(step);
    }

    /// 导出为 JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// 导出为 YAML
    pub fn to_yaml(&self) -> serde_yaml::Result<String> {
        serde_yaml::to_string(self)
    }
}

/// 步骤报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    /// 步骤索引
    pub step_index: usize,

    /// 步骤描述
    pub description: String,

    /// 步骤状态
    pub status: StepStatus,

    /// 错误信息
    pub error: Option<String>,

    /// 耗时（毫秒）
    pub duration_ms: u64,

    /// 输出内容
    pub output: Option<String>,
}

impl StepReport {
    pub fn success(index: usize, description: &str) -> Self {
        Self {
            step_index: index,
            description: description.to_string(),
            status: StepStatus::Success,
            error: None,
            duration_ms: 0,
            output: None,
        }
    }

    pub fn failed(index: usize, description: &str, error: &str) -> Self {
        Self {
            step_index: index,
            description: description.to_string(),
            status: StepStatus::Failed,
            error: Some(error.to_string()),
            duration_ms: 0,
            output: None,
        }
    }

    pub fn skipped(index: usize, description: &str) -> Self {
        Self {
            step_index: index,
            description: description.to_string(),
            status: StepStatus::Skipped,
            error: None,
            duration_ms: 0,
            output: None,
        }
    }

    /// 设置输出内容
    pub fn with_output(mut self, output: &str) -> Self {
        self.output = Some(output.to_string());
        self
    }
}

/// 步骤状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Success,
    Failed,
    Skipped,
}
