//! 命令输出解析模块
//!
//! 两类输出格式：
//! - `kubectl get ... -o wide` 的空白分隔表格，列位置是固定约定
//! - 存储服务 CLI / 元数据服务 / terraform 的 JSON 文档
//!
//! 表格中过短的行（表头之外的空行、截断行）直接跳过；
//! JSON 解析失败则返回 [`InspectError::MalformedResponse`]，不会被当作“尚未就绪”。

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::error::{InspectError, Result};
use crate::models::{BackupInfo, ClaimInfo, PodInfo, PodSelector, ProviderResource};

/// PVC 表格: 名称列
pub const CLAIM_NAME_COLUMN: usize = 0;
/// PVC 表格: 状态列
pub const CLAIM_STATUS_COLUMN: usize = 1;
/// PVC 表格: 卷名列
pub const CLAIM_VOLUME_COLUMN: usize = 2;
/// Pod 表格: 名称列
pub const POD_NAME_COLUMN: usize = 0;
/// Pod 表格: 状态列
pub const POD_STATUS_COLUMN: usize = 2;
/// Pod 表格: 节点列
pub const POD_NODE_COLUMN: usize = 6;

/// 节点上记录区域的标签
pub const ZONE_LABEL: &str = "failure-domain.beta.kubernetes.io/zone";

/// 解析 `kubectl get PersistentVolumeClaim -o wide` 输出
///
/// # 输出格式示例
/// ```text
/// NAME             STATUS    VOLUME                         CAPACITY   ACCESS MODES
/// demooci-1a2b3c   Bound     ocid1.volume.oc1.phx.abc123    50Gi       RWO
/// demooci-ext3     Pending
/// ```
pub fn parse_claims(output: &str) -> Vec<ClaimInfo> {
    output
        .lines()
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() <= CLAIM_VOLUME_COLUMN {
                return None;
            }
            Some(ClaimInfo {
                name: columns[CLAIM_NAME_COLUMN].to_string(),
                status: columns[CLAIM_STATUS_COLUMN].to_string(),
                volume: columns[CLAIM_VOLUME_COLUMN].to_string(),
            })
        })
        .collect()
}

/// 在 PVC 表格中查找名称和状态都匹配的行，返回其卷名
pub fn find_bound_volume(output: &str, claim_name: &str, status: &str) -> Option<String> {
    parse_claims(output)
        .into_iter()
        .find(|claim| claim.name == claim_name && claim.status == status)
        .map(|claim| claim.volume)
}

/// 解析 `kubectl get pods -o wide` 输出，只保留选择器匹配的 Pod
///
/// # 输出格式示例
/// ```text
/// NAME                                  READY   STATUS    RESTARTS   AGE   IP           NODE
/// oci-volume-provisioner-66f8d-x7k2p    1/1     Running   0          2m    10.244.1.5   node-1
/// ```
pub fn parse_pods(output: &str, selector: &PodSelector) -> Result<Vec<PodInfo>> {
    let pattern = match selector {
        PodSelector::Prefix(_) => None,
        PodSelector::Pattern(p) => Some(
            Regex::new(&format!("^(?:{})", p))
                .map_err(|e| InspectError::InvalidPattern(format!("{}: {}", p, e)))?,
        ),
    };

    let mut pods = Vec::new();
    for line in output.lines() {
        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.len() <= POD_NODE_COLUMN {
            continue;
        }

        let name = columns[POD_NAME_COLUMN];
        let matched = match (selector, &pattern) {
            (PodSelector::Prefix(prefix), _) => name.starts_with(prefix.as_str()),
            (PodSelector::Pattern(_), Some(re)) => re.is_match(line),
            (PodSelector::Pattern(_), None) => false,
        };

        if matched {
            pods.push(PodInfo {
                name: name.to_string(),
                status: columns[POD_STATUS_COLUMN].to_string(),
                node: columns[POD_NODE_COLUMN].to_string(),
            });
        }
    }

    debug!("匹配到 {} 个 Pod ({:?})", pods.len(), selector);
    Ok(pods)
}

/// 解析存储服务返回的资源列表
///
/// 空白输出视为空列表（CLI 在 `--query data` 结果为空时不打印任何内容）。
pub fn parse_provider_resources(body: &str) -> Result<Vec<ProviderResource>> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    serde_json::from_str(body).map_err(|e| {
        InspectError::MalformedResponse(format!("无效的资源列表 JSON ({}): {}", e, body))
    })
}

/// 资源列表中是否存在 ID 以 `handle` 结尾且处于 `state` 状态的条目
///
/// 资源 ID 带有较长的路径前缀，因此按后缀匹配。
pub fn resource_in_state(body: &str, handle: &str, state: &str) -> Result<bool> {
    let resources = parse_provider_resources(body)?;
    Ok(resources.iter().any(|r| r.matches(handle, state)))
}

/// 解析卷备份创建响应
pub fn parse_backup(body: &str) -> Result<BackupInfo> {
    serde_json::from_str(body).map_err(|e| {
        InspectError::MalformedResponse(format!("无效的备份响应 JSON ({}): {}", e, body))
    })
}

/// 解析实例元数据，提取 compartmentId
pub fn parse_compartment_id(body: &str) -> Result<String> {
    let doc = parse_json(body, "实例元数据")?;
    doc.get("compartmentId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            InspectError::MalformedResponse(format!("实例元数据缺少 compartmentId: {}", body))
        })
}

/// 解析 `kubectl get nodes -o json`，返回第一个节点的区域标签
///
/// 没有节点时返回 `None`
pub fn parse_region(nodes_json: &str) -> Result<Option<String>> {
    let doc = parse_json(nodes_json, "节点列表")?;
    let items = doc
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| InspectError::MalformedResponse("节点列表缺少 items".to_string()))?;

    let Some(node) = items.first() else {
        return Ok(None);
    };

    node.pointer("/metadata/labels")
        .and_then(|labels| labels.get(ZONE_LABEL))
        .and_then(Value::as_str)
        .map(|zone| Some(zone.to_string()))
        .ok_or_else(|| InspectError::MalformedResponse(format!("节点缺少标签 {}", ZONE_LABEL)))
}

/// 解析 `terraform output -json`，返回变量值
///
/// # 输出格式示例
/// ```text
/// {
///   "availability_domain": { "sensitive": false, "type": "string", "value": "NWuj:PHX-AD-2" },
///   "volume_ocid": { "sensitive": false, "type": "string", "value": "ocid1.volume.oc1.phx.abc" }
/// }
/// ```
pub fn parse_terraform_output(body: &str, var_name: &str) -> Result<String> {
    let doc = parse_json(body, "terraform 输出")?;
    let value = doc
        .get(var_name)
        .and_then(|v| v.get("value"))
        .ok_or_else(|| {
            InspectError::MalformedResponse(format!("terraform 输出缺少变量 {}", var_name))
        })?;

    Ok(match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// `ls` 输出中是否包含指定文件
pub fn list_contains_file(ls_output: &str, file_name: &str) -> bool {
    ls_output.lines().any(|line| line.trim() == file_name)
}

fn parse_json(body: &str, what: &str) -> Result<Value> {
    serde_json::from_str(body).map_err(|e| {
        InspectError::MalformedResponse(format!("无效的{} JSON ({}): {}", what, e, body))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_bound_volume() {
        let output = "claim-a Bound pv-1\nclaim-b Pending pv-2";

        assert_eq!(
            find_bound_volume(output, "claim-a", "Bound"),
            Some("pv-1".to_string())
        );
        assert_eq!(find_bound_volume(output, "claim-b", "Bound"), None);
        assert_eq!(find_bound_volume(output, "claim-c", "Bound"), None);
    }

    #[test]
    fn test_parse_claims_skips_short_lines() {
        let output = r#"
NAME             STATUS    VOLUME                        CAPACITY   ACCESS MODES   STORAGECLASS
demooci-1a2b3c   Bound     ocid1.volume.oc1.phx.abc123   50Gi       RWO            oci
demooci-ext3     Pending
"#;

        let claims = parse_claims(output);
        assert_eq!(claims.len(), 2); // 表头 + 一行 PVC
        assert_eq!(claims[1].name, "demooci-1a2b3c");
        assert_eq!(claims[1].volume, "ocid1.volume.oc1.phx.abc123");
        assert_eq!(find_bound_volume(output, "demooci-ext3", "Pending"), None);
    }

    #[test]
    fn test_parse_pods_by_prefix() {
        let output = r#"
NAME                                 READY   STATUS    RESTARTS   AGE   IP           NODE
oci-volume-provisioner-66f8d-x7k2p   1/1     Running   0          2m    10.244.1.5   node-1
kube-dns-5d4b8-abcde                 3/3     Running   0          9d    10.244.0.2   node-0
"#;

        let pods = parse_pods(output, &PodSelector::provisioner()).unwrap();
        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0].name, "oci-volume-provisioner-66f8d-x7k2p");
        assert_eq!(pods[0].status, "Running");
        assert_eq!(pods[0].node, "node-1");
    }

    #[test]
    fn test_parse_pods_by_test_pattern() {
        let output = r#"
NAME                               READY   STATUS              RESTARTS   AGE   IP           NODE
nginx-controller-1a2b3c4d-qz8wm    0/1     ContainerCreating   0          5s    <none>       node-2
nginx-controller-99999999-zzzzz    1/1     Running             0          1h    10.244.2.7   node-1
demooci-fss-pod-1a2b3c4d           1/1     Running             0          1m    10.244.2.9   node-2
"#;

        let selector = PodSelector::for_test("nginx-controller-", "1a2b3c4d");
        let pods = parse_pods(output, &selector).unwrap();
        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0].status, "ContainerCreating");
        assert_eq!(pods[0].node, "node-2");

        let selector = PodSelector::for_test("demooci-fss-pod-", "1a2b3c4d");
        let pods = parse_pods(output, &selector).unwrap();
        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0].name, "demooci-fss-pod-1a2b3c4d");
    }

    #[test]
    fn test_parse_pods_invalid_pattern() {
        let err = parse_pods("", &PodSelector::Pattern("(".to_string())).unwrap_err();
        assert!(matches!(err, InspectError::InvalidPattern(_)));
    }

    #[test]
    fn test_resource_in_state_suffix_match() {
        let body = r#"[{"id":"ocid1.volume.region.abc123","lifecycle_state":"AVAILABLE"}]"#;

        assert!(resource_in_state(body, "abc123", "AVAILABLE").unwrap());
        assert!(!resource_in_state(body, "abc123", "TERMINATED").unwrap());
        assert!(!resource_in_state(body, "xyz789", "AVAILABLE").unwrap());
    }

    #[test]
    fn test_resource_in_state_cli_field_names() {
        let body = r#"
[
  {
    "display-name": "demooci-1a2b3c",
    "id": "ocid1.filesystem.oc1.phx.fs42",
    "lifecycle-state": "ACTIVE"
  }
]
"#;
        assert!(resource_in_state(body, "fs42", "ACTIVE").unwrap());
        let resources = parse_provider_resources(body).unwrap();
        assert_eq!(resources[0].display_name.as_deref(), Some("demooci-1a2b3c"));
    }

    #[test]
    fn test_resource_in_state_empty_body() {
        assert!(!resource_in_state("", "abc123", "AVAILABLE").unwrap());
        assert!(!resource_in_state("  \n", "abc123", "AVAILABLE").unwrap());
    }

    #[test]
    fn test_resource_in_state_malformed_json_is_error() {
        let err = resource_in_state("ServiceError: 401 NotAuthenticated", "abc123", "AVAILABLE")
            .unwrap_err();
        assert!(matches!(err, InspectError::MalformedResponse(_)));

        // 不是对象数组
        let err = resource_in_state(r#"{"id":"abc123"}"#, "abc123", "AVAILABLE").unwrap_err();
        assert!(matches!(err, InspectError::MalformedResponse(_)));
    }

    #[test]
    fn test_parse_backup() {
        let body = r#"{
  "compartment-id": "ocid1.compartment.oc1..c1",
  "display-name": "backup_volume_system_test1a2b3c4d",
  "id": "ocid1.volumebackup.oc1.phx.b1",
  "lifecycle-state": "CREATING"
}"#;
        let backup = parse_backup(body).unwrap();
        assert_eq!(backup.id, "ocid1.volumebackup.oc1.phx.b1");
        assert_eq!(backup.compartment_id, "ocid1.compartment.oc1..c1");
        assert_eq!(backup.display_name, "backup_volume_system_test1a2b3c4d");
    }

    #[test]
    fn test_parse_compartment_id() {
        let body = concat!(
            r#"{"availabilityDomain":"NWuj:PHX-AD-1","#,
            r#""compartmentId":"ocid1.compartment.oc1..c1"}"#,
        );
        assert_eq!(parse_compartment_id(body).unwrap(), "ocid1.compartment.oc1..c1");

        assert!(matches!(
            parse_compartment_id(r#"{"region":"phx"}"#),
            Err(InspectError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_compartment_id("curl: (7) Failed to connect"),
            Err(InspectError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_parse_region() {
        let body = concat!(
            r#"{"items":[{"metadata":{"labels":"#,
            r#"{"failure-domain.beta.kubernetes.io/zone":"PHX-AD-2"}}}]}"#,
        );
        assert_eq!(parse_region(body).unwrap(), Some("PHX-AD-2".to_string()));

        assert_eq!(parse_region(r#"{"items":[]}"#).unwrap(), None);
        assert!(parse_region(r#"{"items":[{"metadata":{"labels":{}}}]}"#).is_err());
    }

    #[test]
    fn test_parse_terraform_output() {
        let body = r#"{
  "availability_domain": {"sensitive": false, "type": "string", "value": "NWuj:PHX-AD-2"},
  "volume_ocid": {"sensitive": false, "type": "string", "value": "ocid1.volume.oc1.phx.abc"}
}"#;
        assert_eq!(
            parse_terraform_output(body, "availability_domain").unwrap(),
            "NWuj:PHX-AD-2"
        );
        assert_eq!(
            parse_terraform_output(body, "volume_ocid").unwrap(),
            "ocid1.volume.oc1.phx.abc"
        );
        assert!(parse_terraform_output(body, "subnet_ocid").is_err());
    }

    #[test]
    fn test_list_contains_file() {
        let output = "50x.html\nhello.txt\nindex.html";
        assert!(list_contains_file(output, "hello.txt"));
        assert!(!list_contains_file(output, "hello"));
        assert!(!list_contains_file("", "hello.txt"));
    }
}
