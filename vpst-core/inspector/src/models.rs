//! 状态检查数据模型

use serde::{Deserialize, Serialize};

/// 存储类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// 块存储卷
    #[default]
    Block,
    /// 文件存储 (FSS)
    FileSystem,
}

/// 期望的生命周期方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// 已创建可用
    On,
    /// 已删除
    Off,
}

/// 存储服务资源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// 块存储卷
    Volume,
    /// 块存储卷备份
    VolumeBackup,
    /// 文件系统
    FileSystem,
}

impl ResourceKind {
    /// 资源类型对应的生命周期状态值
    pub fn lifecycle_state(&self, lifecycle: Lifecycle) -> &'static str {
        match (self, lifecycle) {
            (ResourceKind::Volume | ResourceKind::VolumeBackup, Lifecycle::On) => "AVAILABLE",
            (ResourceKind::Volume | ResourceKind::VolumeBackup, Lifecycle::Off) => "TERMINATED",
            (ResourceKind::FileSystem, Lifecycle::On) => "ACTIVE",
            (ResourceKind::FileSystem, Lifecycle::Off) => "DELETED",
        }
    }

    /// 日志中使用的资源名称
    pub fn display_name(&self) -> &'static str {
        match self {
            ResourceKind::Volume => "块存储卷",
            ResourceKind::VolumeBackup => "卷备份",
            ResourceKind::FileSystem => "文件系统",
        }
    }
}

/// 存储服务查询参数
///
/// 每次查询需要的选项集中在这里，默认值只在构造函数中给出。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderQuery {
    /// 资源所在的 compartment
    pub compartment_id: String,
    /// 存储类型
    #[serde(default)]
    pub storage: StorageKind,
    /// 可用域（文件系统查询必填）
    #[serde(default)]
    pub availability_domain: Option<String>,
    /// 查询卷备份而非卷本身
    #[serde(default)]
    pub backup: bool,
}

impl ProviderQuery {
    /// 块存储卷查询
    pub fn block(compartment_id: impl Into<String>) -> Self {
        Self {
            compartment_id: compartment_id.into(),
            storage: StorageKind::Block,
            availability_domain: None,
            backup: false,
        }
    }

    /// 卷备份查询
    pub fn backup(compartment_id: impl Into<String>) -> Self {
        Self {
            backup: true,
            ..Self::block(compartment_id)
        }
    }

    /// 文件系统查询
    pub fn file_system(
        compartment_id: impl Into<String>,
        availability_domain: impl Into<String>,
    ) -> Self {
        Self {
            compartment_id: compartment_id.into(),
            storage: StorageKind::FileSystem,
            availability_domain: Some(availability_domain.into()),
            backup: false,
        }
    }

    /// 查询的资源类型
    pub fn resource_kind(&self) -> ResourceKind {
        match (self.storage, self.backup) {
            (StorageKind::FileSystem, _) => ResourceKind::FileSystem,
            (StorageKind::Block, true) => ResourceKind::VolumeBackup,
            (StorageKind::Block, false) => ResourceKind::Volume,
        }
    }

    /// 查询资源类型对应的生命周期状态值
    pub fn lifecycle_state(&self, lifecycle: Lifecycle) -> &'static str {
        self.resource_kind().lifecycle_state(lifecycle)
    }
}

/// 存储服务返回的资源条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResource {
    /// 资源 OCID
    pub id: String,
    /// 生命周期状态
    #[serde(alias = "lifecycle-state")]
    pub lifecycle_state: String,
    /// 显示名称
    #[serde(default, alias = "display-name")]
    pub display_name: Option<String>,
}

impl ProviderResource {
    /// 资源 ID 是否以给定句柄结尾且处于期望状态
    pub fn matches(&self, handle: &str, state: &str) -> bool {
        self.id.ends_with(handle) && self.lifecycle_state == state
    }
}

/// 卷备份创建结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupInfo {
    /// 备份 OCID
    pub id: String,
    /// 所在 compartment
    #[serde(alias = "compartment-id")]
    pub compartment_id: String,
    /// 显示名称
    #[serde(alias = "display-name")]
    pub display_name: String,
}

/// PVC 信息（`kubectl get pvc -o wide` 的一行）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimInfo {
    pub name: String,
    pub status: String,
    pub volume: String,
}

/// Pod 信息（`kubectl get pods -o wide` 的一行）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodInfo {
    pub name: String,
    pub status: String,
    pub node: String,
}

/// Pod 选择器
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PodSelector {
    /// 名称前缀匹配
    Prefix(String),
    /// 正则表达式匹配（从行首开始）
    Pattern(String),
}

impl PodSelector {
    /// 卷供应器 Pod
    pub fn provisioner() -> Self {
        PodSelector::Prefix("oci-volume-provisioner".to_string())
    }

    /// 名称以 `<prefix><test_id>` 开头的 Pod，测试 ID 按字面匹配
    pub fn for_test(prefix: &str, test_id: &str) -> Self {
        PodSelector::Pattern(format!(
            "{}{}.*",
            regex::escape(prefix),
            regex::escape(test_id)
        ))
    }
}
