//! 资源描述模板
//!
//! 模板中的占位符按字面替换；包含未提供值的占位符的整行会被删除，
//! 用于可选字段（例如只配置了子网而没有挂载目标）。

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{ExecutorError, Result};

pub const TEST_ID: &str = "{{TEST_ID}}";
pub const REGION: &str = "{{REGION}}";
pub const BACKUP_ID: &str = "{{BACKUP_ID}}";
pub const MNT_TARGET_OCID: &str = "{{MNT_TARGET_OCID}}";
pub const SUBNET_OCID: &str = "{{SUBNET_OCID}}";
pub const VOLUME_NAME: &str = "{{VOLUME_NAME}}";
pub const AVAILABILITY_DOMAIN: &str = "{{AVAILABILITY_DOMAIN}}";

/// 模板取值
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateValues {
    pub test_id: Option<String>,
    pub region: Option<String>,
    pub backup_id: Option<String>,
    pub mount_target_ocid: Option<String>,
    pub subnet_ocid: Option<String>,
    pub volume_name: Option<String>,
    pub availability_domain: Option<String>,
}

impl TemplateValues {
    /// 只带测试 ID 的取值
    pub fn new(test_id: impl Into<String>) -> Self {
        Self {
            test_id: Some(test_id.into()),
            ..Self::default()
        }
    }

    pub fn region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    pub fn backup_id(mut self, backup_id: Option<String>) -> Self {
        self.backup_id = backup_id;
        self
    }

    pub fn mount_target_ocid(mut self, ocid: Option<String>) -> Self {
        self.mount_target_ocid = ocid;
        self
    }

    pub fn subnet_ocid(mut self, ocid: Option<String>) -> Self {
        self.subnet_ocid = ocid;
        self
    }

    pub fn volume_name(mut self, name: Option<String>) -> Self {
        self.volume_name = name;
        self
    }

    pub fn availability_domain(mut self, ad: Option<String>) -> Self {
        self.availability_domain = ad;
        self
    }

    /// 占位符与替换值
    ///
    /// YAML 中不允许出现 `:`，可用域里的 `:` 替换为 `-`。
    fn substitutions(&self) -> [(&'static str, Option<String>); 7] {
        [
            (TEST_ID, self.test_id.clone()),
            (REGION, self.region.clone()),
            (BACKUP_ID, self.backup_id.clone()),
            (MNT_TARGET_OCID, self.mount_target_ocid.clone()),
            (SUBNET_OCID, self.subnet_ocid.clone()),
            (VOLUME_NAME, self.volume_name.clone()),
            (
                AVAILABILITY_DOMAIN,
                self.availability_domain.as_ref().map(|ad| ad.replace(':', "-")),
            ),
        ]
    }
}

/// 渲染模板文本
pub fn render(template: &str, values: &TemplateValues) -> String {
    let substitutions = values.substitutions();
    let mut output = String::with_capacity(template.len());

    'lines: for line in template.split_inclusive('\n') {
        let mut patched = line.to_string();
        for (placeholder, value) in &substitutions {
            if !patched.contains(placeholder) {
                continue;
            }
            match value {
                Some(v) => patched = patched.replace(placeholder, v),
                None => {
                    info!("{} 未指定，删除模板中的该行", placeholder);
                    continue 'lines;
                }
            }
        }
        output.push_str(&patched);
    }

    output
}

/// 渲染模板文件
///
/// 输出文件名为模板文件名加 `.yaml` 后缀；`out_dir` 为空时写在模板旁边。
///
/// # Returns
/// 生成的资源描述文件路径
pub fn render_file(
    template: &Path,
    values: &TemplateValues,
    out_dir: Option<&Path>,
) -> Result<PathBuf> {
    let content = fs::read_to_string(template).map_err(|e| {
        ExecutorError::TemplateError(format!("读取模板失败 {}: {}", template.display(), e))
    })?;

    let file_name = template.file_name().ok_or_else(|| {
        ExecutorError::TemplateError(format!("无效的模板路径: {}", template.display()))
    })?;
    let mut output_name = file_name.to_os_string();
    output_name.push(".yaml");

    let output = match out_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            dir.join(output_name)
        }
        None => template.with_file_name(output_name),
    };

    fs::write(&output, render(&content, values))?;
    debug!("生成资源描述: {} -> {}", template.display(), output.display());

    Ok(output)
}
