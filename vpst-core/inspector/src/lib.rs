//! VPST 状态检查库
//!
//! 把外部命令的原始输出（表格文本或 JSON）转换为结构化的匹配结果：
//! - 解析 `kubectl get ... -o wide` 表格输出（PVC、Pod）
//! - 解析存储服务 CLI 返回的 JSON 资源列表
//! - 查询 terraform 输出变量
//!
//! 输出格式的约定只存在于本 crate 中，轮询器和场景驱动不感知具体格式。
//!
//! # 示例
//!
//! ```ignore
//! use std::sync::Arc;
//! use vpst_command_runner::LocalRunner;
//! use vpst_inspector::{Kubectl, OciCli, ProviderQuery, Lifecycle};
//!
//! let runner = Arc::new(LocalRunner::new());
//! let kubectl = Kubectl::new(runner.clone());
//!
//! // PVC 绑定后返回卷名
//! if let Some(volume) = kubectl.bound_volume("demooci-1234").await? {
//!     let oci = OciCli::new(runner);
//!     let query = ProviderQuery::block(compartment_id);
//!     let available = oci
//!         .resource_in_state(&query, &volume, query.lifecycle_state(Lifecycle::On))
//!         .await?;
//! }
//! ```

mod error;
mod kubectl;
mod models;
mod parser;
mod provider;
mod terraform;

pub use error::{InspectError, Result};
pub use kubectl::{Kubectl, PROVISIONER_NAMESPACE};
pub use models::{
    BackupInfo, ClaimInfo, Lifecycle, PodInfo, PodSelector, ProviderQuery, ProviderResource,
    ResourceKind, StorageKind,
};
pub use parser::{
    find_bound_volume, list_contains_file, parse_backup, parse_claims, parse_compartment_id,
    parse_pods, parse_provider_resources, parse_region, parse_terraform_output,
    resource_in_state,
};
pub use provider::OciCli;
pub use terraform::{Terraform, AVAILABILITY_DOMAIN_VAR, VOLUME_OCID_VAR};
