//! 测试场景定义
//!
//! 场景是一组按顺序执行的类型化步骤，由 [`crate::ScenarioRunner`] 统一解释执行。
//! 内置套件覆盖块存储、文件存储和从备份恢复卷三类测试，也可以从 YAML 文件加载。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use vpst_inspector::{Lifecycle, StorageKind};

use crate::metrics::{
    CM_EXT3, CM_FSS_MNT, CM_FSS_SUBNET, CM_NO_AD, CM_SIMPLE, CM_VOLUME_FROM_BACKUP,
};
use crate::template;
use crate::test_config::RunConfig;
use crate::{ExecutorError, Result};

/// 块存储测试需要的集群资源
pub const BLOCK_RESOURCES: [&str; 4] = [
    "storage-class.yaml",
    "storage-class-ext3.yaml",
    "oci-volume-provisioner-rbac.yaml",
    "oci-volume-provisioner.yaml",
];

/// 文件存储测试需要的集群资源
pub const FSS_RESOURCES: [&str; 2] = [
    "oci-volume-provisioner-fss.yaml",
    "oci-volume-provisioner-rbac.yaml",
];

/// 使用挂载目标的 FSS 存储类模板
pub const FSS_MNT_STORAGE_CLASS: &str = "example-storage-class-fss-mnt.template";
/// 使用子网的 FSS 存储类模板
pub const FSS_SUBNET_STORAGE_CLASS: &str = "example-storage-class-fss-subnet.template";

/// 工作负载 Pod 名称前缀 (replication controller)
pub const CONTROLLER_POD_PREFIX: &str = "nginx-controller-";
/// 工作负载 Pod 名称前缀 (FSS)
pub const FSS_POD_PREFIX: &str = "demooci-fss-pod-";

/// 模板中 `{{REGION}}` 的取值来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegionSource {
    /// 不填写（对应行被删除）
    #[default]
    None,
    /// 集群节点的区域标签
    Cluster,
    /// 可用域名称中 `:` 之后的部分
    AvailabilityDomain,
}

/// 工作负载挂载的卷
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadVolume {
    /// PVC 绑定的卷
    #[default]
    Claim,
    /// terraform 创建的源卷
    Source,
}

/// 工作负载（读写挂载卷的 Pod）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// 资源描述模板（相对模板目录）
    pub template: PathBuf,

    /// Pod 名称前缀，后接测试 ID
    pub pod_prefix: String,

    /// 挂载的卷
    #[serde(default)]
    pub volume: WorkloadVolume,

    /// 是否在挂载目录中创建文件
    #[serde(default)]
    pub write_file: bool,

    /// 是否检查文件存在
    #[serde(default = "default_true")]
    pub verify_file: bool,

    #[serde(default = "default_file_name")]
    pub file_name: String,

    #[serde(default = "default_mount_dir")]
    pub mount_dir: String,
}

fn default_true() -> bool {
    true
}

fn default_file_name() -> String {
    "hello.txt".to_string()
}

fn default_mount_dir() -> String {
    "/usr/share/nginx/html".to_string()
}

impl WorkloadSpec {
    /// replication controller 工作负载
    pub fn controller(template: impl Into<PathBuf>) -> Self {
        Self {
            template: template.into(),
            pod_prefix: CONTROLLER_POD_PREFIX.to_string(),
            volume: WorkloadVolume::Claim,
            write_file: false,
            verify_file: true,
            file_name: default_file_name(),
            mount_dir: default_mount_dir(),
        }
    }

    pub fn on_volume(mut self, volume: WorkloadVolume) -> Self {
        self.volume = volume;
        self
    }

    pub fn writing(mut self) -> Self {
        self.write_file = true;
        self
    }

    /// 挂载目录中的文件路径
    pub fn file_path(&self) -> String {
        format!("{}/{}", self.mount_dir.trim_end_matches('/'), self.file_name)
    }
}

/// 场景步骤
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// 用 terraform 创建源卷
    ProvisionSourceVolume,

    /// 为源卷创建备份并等待可用
    CreateBackup,

    /// 生成并提交 PVC
    Submit,

    /// 等待 PVC 绑定
    AwaitBound,

    /// 等待供应商侧资源进入期望状态
    AwaitProvider { lifecycle: Lifecycle },

    /// 通过工作负载读写卷（未指定时使用场景的工作负载）
    Exercise {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        workload: Option<WorkloadSpec>,
    },

    /// 删除 PVC
    Delete,

    /// 删除备份
    DeleteBackup,
}

impl Step {
    /// 报告中使用的步骤描述
    pub fn description(&self) -> &'static str {
        match self {
            Step::ProvisionSourceVolume => "创建源卷",
            Step::CreateBackup => "创建卷备份",
            Step::Submit => "提交 PVC",
            Step::AwaitBound => "等待 PVC 绑定",
            Step::AwaitProvider {
                lifecycle: Lifecycle::On,
            } => "等待供应商资源可用",
            Step::AwaitProvider {
                lifecycle: Lifecycle::Off,
            } => "等待供应商资源删除",
            Step::Exercise { .. } => "工作负载读写",
            Step::Delete => "删除 PVC",
            Step::DeleteBackup => "删除卷备份",
        }
    }

    /// 是否需要访问供应商
    pub fn requires_provider(&self) -> bool {
        matches!(
            self,
            Step::ProvisionSourceVolume | Step::CreateBackup | Step::DeleteBackup
        )
    }
}

/// 测试场景
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// 场景名称
    pub name: String,

    /// 场景描述
    #[serde(default)]
    pub description: Option<String>,

    /// canary 指标名
    #[serde(default)]
    pub metric: Option<String>,

    /// 存储类型
    #[serde(default)]
    pub storage: StorageKind,

    /// PVC 模板（相对模板目录）
    pub claim_template: PathBuf,

    /// PVC 名称，可包含 `{{TEST_ID}}`
    pub claim_name: String,

    /// `{{REGION}}` 取值来源
    #[serde(default)]
    pub region: RegionSource,

    /// 可用域（源卷未提供时使用）
    #[serde(default)]
    pub availability_domain: Option<String>,

    /// 默认工作负载
    #[serde(default)]
    pub workload: Option<WorkloadSpec>,

    /// 测试步骤
    pub steps: Vec<Step>,

    /// 标签
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Scenario {
    /// 从 YAML 文件加载场景
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// 从 YAML 字符串加载场景
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| ExecutorError::ScenarioLoadFailed(e.to_string()))
    }

    /// 从 JSON 文件加载场景
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// 从 JSON 字符串加载场景
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ExecutorError::ScenarioLoadFailed(e.to_string()))
    }

    /// 导出为 YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| ExecutorError::SerdeError(e.to_string()))
    }

    /// 导出为 JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ExecutorError::SerdeError(e.to_string()))
    }

    /// 本次运行的 PVC 名称
    pub fn claim_name_for(&self, test_id: &str) -> String {
        self.claim_name.replace(template::TEST_ID, test_id)
    }

    /// 是否需要访问供应商
    pub fn requires_provider(&self) -> bool {
        self.steps.iter().any(Step::requires_provider)
    }

    /// 标准生命周期：提交、绑定、可用、[读写]、删除、删除完成
    fn lifecycle(
        name: &str,
        metric: &str,
        claim_template: &str,
        claim_name: &str,
        region: RegionSource,
        workload: Option<WorkloadSpec>,
    ) -> Self {
        let mut steps = vec![
            Step::Submit,
            Step::AwaitBound,
            Step::AwaitProvider {
                lifecycle: Lifecycle::On,
            },
        ];
        if workload.is_some() {
            steps.push(Step::Exercise { workload: None });
        }
        steps.extend([
            Step::Delete,
            Step::AwaitProvider {
                lifecycle: Lifecycle::Off,
            },
        ]);

        Self {
            name: name.to_string(),
            description: None,
            metric: Some(metric.to_string()),
            storage: StorageKind::Block,
            claim_template: PathBuf::from(claim_template),
            claim_name: claim_name.to_string(),
            region,
            availability_domain: None,
            workload,
            steps,
            tags: Vec::new(),
        }
    }

    /// 基本块存储卷
    pub fn simple() -> Self {
        Self::lifecycle(
            "Simple",
            CM_SIMPLE,
            "example-claim.template",
            "demooci-{{TEST_ID}}",
            RegionSource::Cluster,
            None,
        )
    }

    /// ext3 文件系统
    pub fn ext3() -> Self {
        Self::lifecycle(
            "Ext3 file system",
            CM_EXT3,
            "example-claim-ext3.template",
            "demooci-ext3-{{TEST_ID}}",
            RegionSource::None,
            None,
        )
    }

    /// 不指定可用域
    pub fn no_ad() -> Self {
        Self::lifecycle(
            "No AD specified",
            CM_NO_AD,
            "example-claim-no-AD.template",
            "demooci-no-ad-{{TEST_ID}}",
            RegionSource::None,
            None,
        )
    }

    /// 从备份创建卷
    ///
    /// 源卷写入文件后创建备份，从备份恢复的卷中应能读到同一文件。
    pub fn volume_from_backup() -> Self {
        let controller = WorkloadSpec::controller("replication-controller.yaml.template");

        Self {
            name: "Create volume from backup".to_string(),
            description: Some("从卷备份恢复并验证数据".to_string()),
            metric: Some(CM_VOLUME_FROM_BACKUP.to_string()),
            storage: StorageKind::Block,
            claim_template: PathBuf::from("example-claim-from-backup.template"),
            claim_name: "demooci-from-backup-{{TEST_ID}}".to_string(),
            region: RegionSource::AvailabilityDomain,
            availability_domain: None,
            workload: Some(controller.clone()),
            steps: vec![
                Step::ProvisionSourceVolume,
                Step::Exercise {
                    workload: Some(controller.on_volume(WorkloadVolume::Source).writing()),
                },
                Step::CreateBackup,
                Step::Submit,
                Step::AwaitBound,
                Step::AwaitProvider {
                    lifecycle: Lifecycle::On,
                },
                Step::Exercise { workload: None },
                Step::Delete,
                Step::AwaitProvider {
                    lifecycle: Lifecycle::Off,
                },
                Step::DeleteBackup,
            ],
            tags: vec!["backup".to_string()],
        }
    }

    /// 文件存储
    ///
    /// # Arguments
    /// * `with_mount_target` - 存储类是否使用挂载目标
    /// * `availability_domain` - 文件系统所在可用域
    pub fn fss(with_mount_target: bool, availability_domain: &str) -> Self {
        let metric = if with_mount_target {
            CM_FSS_MNT
        } else {
            CM_FSS_SUBNET
        };
        let workload = WorkloadSpec {
            pod_prefix: FSS_POD_PREFIX.to_string(),
            ..WorkloadSpec::controller("example-pod-fss.template").writing()
        };

        let mut scenario = Self::lifecycle(
            "Create volume with FSS",
            metric,
            "example-claim-fss.template",
            "demooci-fss-{{TEST_ID}}",
            RegionSource::Cluster,
            Some(workload),
        );
        scenario.storage = StorageKind::FileSystem;
        scenario.availability_domain = Some(availability_domain.to_string());
        scenario.tags = vec!["fss".to_string()];
        scenario
    }
}

/// 加载场景列表文件 (YAML 或 JSON 数组)
pub fn load_scenarios(path: &Path) -> Result<Vec<Scenario>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ExecutorError::ScenarioLoadFailed(format!("读取场景文件失败 {}: {}", path.display(), e))
    })?;

    let scenarios: Vec<Scenario> = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(&content)
            .map_err(|e| ExecutorError::ScenarioLoadFailed(e.to_string()))?,
        _ => serde_yaml::from_str(&content)
            .map_err(|e| ExecutorError::ScenarioLoadFailed(e.to_string()))?,
    };

    if scenarios.is_empty() {
        return Err(ExecutorError::ScenarioLoadFailed(format!(
            "场景文件中没有场景: {}",
            path.display()
        )));
    }

    Ok(scenarios)
}

/// 测试套件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SuiteKind {
    /// 块存储
    #[default]
    Block,
    /// 文件存储
    Fss,
    /// 块存储 + 从备份创建卷
    Backup,
    /// 全部
    All,
}

impl SuiteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuiteKind::Block => "block",
            SuiteKind::Fss => "fss",
            SuiteKind::Backup => "backup",
            SuiteKind::All => "all",
        }
    }
}

impl fmt::Display for SuiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuiteKind {
    type Err = ExecutorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "block" => Ok(SuiteKind::Block),
            "fss" => Ok(SuiteKind::Fss),
            "backup" => Ok(SuiteKind::Backup),
            "all" => Ok(SuiteKind::All),
            other => Err(ExecutorError::ConfigError(format!("未知的测试套件: {}", other))),
        }
    }
}

/// 测试套件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suite {
    /// 套件类型
    pub kind: SuiteKind,

    /// 需要部署的集群资源（相对部署文件目录）
    pub resources: Vec<PathBuf>,

    /// 场景执行前需要提交的资源描述模板（相对模板目录）
    pub prerequisites: Vec<PathBuf>,

    /// 场景列表
    pub scenarios: Vec<Scenario>,
}

impl Suite {
    /// 内置套件
    ///
    /// # Arguments
    /// * `kind` - 套件类型
    /// * `config` - 运行配置 (FSS 参数)
    /// * `check_oci` - 是否检查供应商资源；块存储套件只在检查时包含备份场景
    pub fn builtin(kind: SuiteKind, config: &RunConfig, check_oci: bool) -> Self {
        let mut suite = Suite {
            kind,
            resources: Vec::new(),
            prerequisites: Vec::new(),
            scenarios: Vec::new(),
        };

        if matches!(kind, SuiteKind::Block | SuiteKind::Backup | SuiteKind::All) {
            suite.add_resources(&BLOCK_RESOURCES);
            suite.scenarios.extend([Scenario::simple(), Scenario::ext3(), Scenario::no_ad()]);
            if check_oci || kind == SuiteKind::Backup {
                suite.scenarios.push(Scenario::volume_from_backup());
            }
        }

        if matches!(kind, SuiteKind::Fss | SuiteKind::All) {
            suite.add_resources(&FSS_RESOURCES);
            let with_mount_target = config.fss.mount_target_ocid.is_some();
            let storage_class = if with_mount_target {
                FSS_MNT_STORAGE_CLASS
            } else {
                FSS_SUBNET_STORAGE_CLASS
            };
            suite.prerequisites.push(PathBuf::from(storage_class));
            suite
                .scenarios
                .push(Scenario::fss(with_mount_target, &config.fss.availability_domain));
        }

        suite
    }

    fn add_resources(&mut self, resources: &[&str]) {
        for resource in resources {
            let path = PathBuf::from(resource);
            if !self.resources.contains(&path) {
                self.resources.push(path);
            }
        }
    }

    /// 替换场景列表（集群资源保持不变）
    pub fn with_scenarios(mut self, scenarios: Vec<Scenario>) -> Self {
        self.scenarios = scenarios;
        self
    }

    /// 套件名称
    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    /// 场景的 canary 指标名
    pub fn metrics(&self) -> impl Iterator<Item = &str> {
        self.scenarios.iter().filter_map(|s| s.metric.as_deref())
    }

    /// 运行前检查
    pub fn validate(&self, config: &RunConfig, check_oci: bool) -> Result<()> {
        if !check_oci {
            if let Some(scenario) = self.scenarios.iter().find(|s| s.requires_provider()) {
                return Err(ExecutorError::EnvironmentError(format!(
                    "场景 {} 需要 --check-oci",
                    scenario.name
                )));
            }
        }

        if !self.prerequisites.is_empty()
            && config.fss.subnet_ocid.is_none()
            && config.fss.mount_target_ocid.is_none()
        {
            return Err(ExecutorError::EnvironmentError(
                "文件存储测试需要 --subnet-ocid 或 MNT_TARGET_OCID".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_from_yaml() {
        let yaml = r#"
name: "custom"
metric: volume_provisioner_simple
claim_template: example-claim.template
claim_name: "demooci-{{TEST_ID}}"
region: cluster
steps:
  - type: submit
  - type: await_bound
  - type: await_provider
    lifecycle: "on"
  - type: exercise
    workload:
      template: replication-controller.yaml.template
      pod_prefix: nginx-controller-
      write_file: true
  - type: delete
"#;
        let scenario = Scenario::from_yaml_str(yaml).unwrap();
        assert_eq!(scenario.name, "custom");
        assert_eq!(scenario.storage, StorageKind::Block);
        assert_eq!(scenario.region, RegionSource::Cluster);
        assert_eq!(scenario.steps.len(), 5);
        assert_eq!(
            scenario.steps[2],
            Step::AwaitProvider {
                lifecycle: Lifecycle::On
            }
        );

        let Step::Exercise {
            workload: Some(workload),
        } = &scenario.steps[3]
        else {
            panic!("expected exercise step with workload");
        };
        assert!(workload.write_file);
        assert!(workload.verify_file);
        assert_eq!(workload.file_path(), "/usr/share/nginx/html/hello.txt");
        assert_eq!(workload.volume, WorkloadVolume::Claim);
    }

    #[test]
    fn test_unknown_step_is_load_failure() {
        let yaml = "name: x\nclaim_template: a\nclaim_name: b\nsteps:\n  - type: reboot\n";
        let err = Scenario::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ExecutorError::ScenarioLoadFailed(_)));
    }

    #[test]
    fn test_builtin_scenario_to_yaml() {
        let yaml = Scenario::volume_from_backup().to_yaml().unwrap();
        let parsed = Scenario::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed, Scenario::volume_from_backup());
    }

    #[test]
    fn test_claim_name_for_test_id() {
        assert_eq!(Scenario::no_ad().claim_name_for("1a2b3c4d"), "demooci-no-ad-1a2b3c4d");
    }

    #[test]
    fn test_block_suite_includes_backup_only_with_provider_checks() {
        let config = RunConfig::default();

        let suite = Suite::builtin(SuiteKind::Block, &config, false);
        let names: Vec<_> = suite.metrics().collect();
        assert_eq!(names, vec![CM_SIMPLE, CM_EXT3, CM_NO_AD]);
        assert_eq!(suite.resources.len(), 4);
        assert!(suite.prerequisites.is_empty());

        let suite = Suite::builtin(SuiteKind::Block, &config, true);
        assert_eq!(suite.scenarios.len(), 4);
        assert!(suite.scenarios[3].requires_provider());
    }

    #[test]
    fn test_backup_suite_requires_provider_checks() {
        let config = RunConfig::default();
        let suite = Suite::builtin(SuiteKind::Backup, &config, false);
        assert!(matches!(
            suite.validate(&config, false),
            Err(ExecutorError::EnvironmentError(_))
        ));
        assert!(suite.validate(&config, true).is_ok());
    }

    #[test]
    fn test_fss_suite_storage_class_choice() {
        let mut config = RunConfig::default();
        let suite = Suite::builtin(SuiteKind::Fss, &config, false);
        assert_eq!(suite.prerequisites, vec![PathBuf::from(FSS_SUBNET_STORAGE_CLASS)]);
        assert_eq!(suite.metrics().collect::<Vec<_>>(), vec![CM_FSS_SUBNET]);
        // 没有子网也没有挂载目标
        assert!(suite.validate(&config, false).is_err());

        config.fss.mount_target_ocid = Some("ocid1.mounttarget.oc1.phx.m1".to_string());
        let suite = Suite::builtin(SuiteKind::Fss, &config, false);
        assert_eq!(suite.prerequisites, vec![PathBuf::from(FSS_MNT_STORAGE_CLASS)]);
        assert_eq!(suite.scenarios[0].storage, StorageKind::FileSystem);
        assert_eq!(
            suite.scenarios[0].availability_domain.as_deref(),
            Some("NWuj:PHX-AD-2")
        );
        assert!(suite.validate(&config, false).is_ok());
    }

    #[test]
    fn test_all_suite_deduplicates_resources() {
        let suite = Suite::builtin(SuiteKind::All, &RunConfig::default(), false);
        assert_eq!(suite.resources.len(), 5);
        assert_eq!(suite.scenarios.len(), 4);
    }

    #[test]
    fn test_suite_kind_from_str() {
        assert_eq!("FSS".parse::<SuiteKind>().unwrap(), SuiteKind::Fss);
        assert_eq!(SuiteKind::Backup.to_string(), "backup");
        assert!("nfs".parse::<SuiteKind>().is_err());
    }

    #[test]
    fn test_load_scenarios_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenarios.yaml");
        let yaml = serde_yaml::to_string(&vec![Scenario::simple(), Scenario::ext3()]).unwrap();
        std::fs::write(&path, yaml).unwrap();
        assert_eq!(load_scenarios(&path).unwrap().len(), 2);

        std::fs::write(&path, "[]").unwrap();
        assert!(matches!(
            load_scenarios(&path),
            Err(ExecutorError::ScenarioLoadFailed(_))
        ));
    }
}
