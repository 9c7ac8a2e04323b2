//! canary 指标
//!
//! 每个场景一项，通过为 1、失败为 0；另记录开始和结束时间。
//! 结束时一次性写出（键排序、缩进 JSON）。

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use chrono::Local;
use serde_json::Value;
use tracing::{debug, info};

use crate::Result;

pub const START_TIME: &str = "start_time";
pub const END_TIME: &str = "end_time";

pub const CM_SIMPLE: &str = "volume_provisioner_simple";
pub const CM_EXT3: &str = "volume_provisioner_ext3";
pub const CM_NO_AD: &str = "volume_provisioner_no_ad";
pub const CM_VOLUME_FROM_BACKUP: &str = "volume_provisioner_volume_from_backup";
pub const CM_FSS_MNT: &str = "volume_provisioner_fss_mnt";
pub const CM_FSS_SUBNET: &str = "volume_provisioner_fss_subnet";

/// canary 指标记录
#[derive(Debug, Clone)]
pub struct CanaryMetrics {
    values: BTreeMap<String, Value>,
    file: Option<PathBuf>,
    finished: bool,
}

impl CanaryMetrics {
    /// 创建指标记录，记录开始时间
    ///
    /// # Arguments
    /// * `file` - 输出文件，`None` 时只在内存中记录
    pub fn new(file: Option<PathBuf>) -> Self {
        let mut values = BTreeMap::new();
        values.insert(START_TIME.to_string(), Value::String(Self::timestamp()));
        Self {
            values,
            file,
            finished: false,
        }
    }

    fn timestamp() -> String {
        Local::now().format("%Y-%m-%d-%H%M%S").to_string()
    }

    /// 套件开始时把计划执行的场景置为 0
    pub fn schedule<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            self.values.insert(name.to_string(), Value::from(0));
        }
    }

    /// 记录场景结果
    pub fn record(&mut self, name: &str, passed: bool) {
        debug!("指标 {} = {}", name, u8::from(passed));
        self.values.insert(name.to_string(), Value::from(u8::from(passed)));
    }

    /// 读取指标值
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// 所有指标
    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// 记录结束时间并写出文件（只执行一次）
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.values
            .insert(END_TIME.to_string(), Value::String(Self::timestamp()));

        if let Some(path) = &self.file {
            let content = serde_json::to_string_pretty(&self.values)
                .map_err(|e| crate::ExecutorError::SerdeError(e.to_string()))?;
            fs::write(path, content)?;
            info!("canary 指标已写入: {}", path.display());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_and_record() {
        let mut metrics = CanaryMetrics::new(None);
        assert!(metrics.get(START_TIME).is_some());

        metrics.schedule([CM_SIMPLE, CM_EXT3]);
        assert_eq!(metrics.get(CM_SIMPLE), Some(&Value::from(0)));

        metrics.record(CM_SIMPLE, true);
        metrics.record(CM_EXT3, false);
        assert_eq!(metrics.get(CM_SIMPLE), Some(&Value::from(1)));
        assert_eq!(metrics.get(CM_EXT3), Some(&Value::from(0)));
        assert!(metrics.get(END_TIME).is_none());
    }

    #[test]
    fn test_finish_writes_sorted_json_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");

        let mut metrics = CanaryMetrics::new(Some(path.clone()));
        metrics.record(CM_NO_AD, true);
        metrics.finish().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let doc: BTreeMap<String, Value> = serde_json::from_str(&content).unwrap();
        assert_eq!(doc.get(CM_NO_AD), Some(&Value::from(1)));
        assert!(doc.contains_key(START_TIME));
        assert!(doc.contains_key(END_TIME));
        // 键按字母顺序输出
        assert!(content.find(END_TIME).unwrap() < content.find(START_TIME).unwrap());

        // 第二次 finish 不再覆盖文件
        fs::remove_file(&path).unwrap();
        metrics.finish().unwrap();
        assert!(!path.exists());
    }
}
