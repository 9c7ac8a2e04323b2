//! 测试运行

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::FutureExt;
use tracing::{error, info};

use vpst_command_runner::LocalRunner;
use vpst_executor::{
    load_scenarios, CredentialSources, Credentials, RunConfig, RunContext, RunOptions,
    ScenarioRunner, Suite, SuiteKind, SuiteReport,
};

use super::output;
use crate::Cli;

/// 执行一次完整的测试运行
///
/// 运行上下文创建之后，成功、场景失败、致命错误和 panic 都经由 `finalize`
/// 执行清理。
///
/// # Returns
/// 进程退出码
pub async fn execute(cli: &Cli, config: RunConfig) -> i32 {
    let mut options = RunOptions::new(cli.check_oci);
    if let Some(test_id) = &cli.test_id {
        options = options.with_test_id(test_id.clone());
    }
    info!("测试 ID: {}", options.test_id);

    let mut ctx = RunContext::new(config, options, Arc::new(LocalRunner::new()));

    let result = AssertUnwindSafe(run(cli, &mut ctx)).catch_unwind().await;

    let code = match result {
        Ok(Ok(Some(report))) => report.exit_code(),
        Ok(Ok(None)) => 0,
        Ok(Err(e)) => {
            error!("测试运行中止: {:#}", e);
            1
        }
        Err(panic) => {
            error!("测试运行 panic: {}", panic_message(panic.as_ref()));
            1
        }
    };

    ctx.finalize(code).await
}

async fn run(cli: &Cli, ctx: &mut RunContext) -> Result<Option<SuiteReport>> {
    let sources = CredentialSources::from_env();
    let credentials = Credentials::materialize(
        &ctx.config.credentials,
        &sources,
        cli.check_oci,
        &mut ctx.finalizer,
    )?;
    ctx.use_credentials(&credentials);

    let suite = build_suite(cli, &ctx.config)?;
    suite.validate(&ctx.config, cli.check_oci)?;
    info!(
        "测试套件: {} ({} 个场景)",
        suite.name(),
        suite.scenarios.len()
    );

    if cli.setup {
        ctx.setup(&suite).await.context("部署卷供应器失败")?;
    }

    if cli.teardown {
        ctx.schedule_teardown(&suite);
    }

    if cli.no_test {
        info!("跳过测试场景 (--no-test)");
        return Ok(None);
    }

    let report = ScenarioRunner::new(ctx).run_suite(&suite).await?;
    output::print_suite_report(&report);

    Ok(Some(report))
}

fn build_suite(cli: &Cli, config: &RunConfig) -> Result<Suite> {
    let kind: SuiteKind = cli.suite.parse()?;
    let suite = Suite::builtin(kind, config, cli.check_oci);

    Ok(match &cli.scenarios {
        Some(file) => {
            let scenarios = load_scenarios(Path::new(file))
                .with_context(|| format!("加载场景文件失败: {}", file))?;
            suite.with_scenarios(scenarios)
        }
        None => suite,
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "未知 panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_check_oci_requires_setup() {
        assert!(Cli::try_parse_from(["vpst", "--check-oci"]).is_err());
        assert!(Cli::try_parse_from(["vpst", "--setup", "--check-oci"]).is_ok());
    }

    #[test]
    fn test_build_suite_from_flags() {
        let cli = Cli::try_parse_from(["vpst", "--suite", "backup"]).unwrap();
        let suite = build_suite(&cli, &RunConfig::default()).unwrap();
        assert_eq!(suite.kind, SuiteKind::Backup);
        assert_eq!(suite.scenarios.len(), 4);

        let cli = Cli::try_parse_from(["vpst", "--suite", "nope"]).unwrap();
        assert!(build_suite(&cli, &RunConfig::default()).is_err());
    }

    #[test]
    fn test_panic_message() {
        let panic: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(panic.as_ref()), "boom");
        let panic: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(panic.as_ref()), "bang");
    }
}
