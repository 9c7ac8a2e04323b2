//! 执行报告输出

use colored::Colorize;
use vpst_executor::{ExecutionReport, StepStatus, SuiteReport};

/// 打印套件执行报告
pub fn print_suite_report(report: &SuiteReport) {
    println!("\n{}", "=".repeat(60));
    println!("{}", "执行报告".bold());
    println!("{}", "=".repeat(60));
    println!();

    println!("测试套件: {}", report.suite_name.cyan().bold());
    println!("执行时间: {} ms", report.duration_ms.to_string().yellow());
    println!();

    for scenario in &report.reports {
        print_scenario(scenario);
    }

    println!("场景统计:");
    println!("  总场景: {}", report.total.to_string().bright_blue());
    println!("  成功:   {}", report.passed_count.to_string().green());
    println!("  失败:   {}", report.failed_count.to_string().red());
    println!();

    println!("{}", "=".repeat(60));
    let status = if report.passed {
        format!("{} 测试套件执行成功", "✓".green().bold())
    } else {
        format!("{} 测试套件执行失败", "✗".red().bold())
    };
    println!("{}", status);
    println!("{}", "=".repeat(60));
}

fn print_scenario(report: &ExecutionReport) {
    let icon = if report.passed {
        "✓".green()
    } else {
        "✗".red()
    };
    println!(
        "{} {} ({} ms)",
        icon.bold(),
        report.scenario_name.cyan().bold(),
        report.duration_ms.to_string().bright_black()
    );
    if let Some(desc) = &report.description {
        println!("  {}", desc.bright_black());
    }

    for step in &report.steps {
        let status_icon = match step.status {
            StepStatus::Success => "✓".green(),
            StepStatus::Failed => "✗".red(),
            StepStatus::Skipped => "⊘".yellow(),
        };

        println!(
            "  {} 步骤 {}: {}",
            status_icon.bold(),
            (step.step_index + 1).to_string().bright_black(),
            step.description
        );

        if let Some(output) = &step.output {
            println!("     输出: {}", output.bright_black());
        }

        if let Some(error) = &step.error {
            println!("     错误: {}", error.red());
        }
    }
    println!();
}
