use anyhow::{Context, Result};
use colored::Colorize;
use std::process::Command;
use std::time::Instant;

/// Bare-metal target used to prove the library crates stay `no_std`.
const NO_STD_TARGET: &str = "thumbv7em-none-eabihf";

/// Crates that must build without `std`.
const NO_STD_CRATES: &[&str] = &["platform", "modem", "uf2"];

pub fn run() -> Result<()> {
    println!();
    println!("{}", "🔍 Checking workspace...".cyan().bold());
    println!();

    let total_start = Instant::now();

    for &krate in NO_STD_CRATES {
        println!("{}", format!("  Checking {krate} (no_std)...").cyan());
        let start = Instant::now();

        let output = Command::new("cargo")
            .args(["check", "-p", krate, "--target", NO_STD_TARGET, "--no-default-features"])
            .output()
            .with_context(|| format!("Failed to check {krate}"))?;

        if !output.status.success() {
            eprintln!("{}", format!("  ✗ {krate} check failed").red().bold());
            eprintln!();
            eprintln!("{}", String::from_utf8_lossy(&output.stderr));
            anyhow::bail!("{krate} check failed");
        }

        println!(
            "{}",
            format!(
                "  ✓ {krate} check passed in {:.2}s",
                start.elapsed().as_secs_f64()
            )
            .green()
        );
    }
    println!();

    // Host build with tracing, as xtask uses it
    println!("{}", "  Checking host build (tracing)...".cyan());
    let host_output = Command::new("cargo")
        .args(["check", "-p", "modem", "-p", "uf2", "--features", "tracing"])
        .output()
        .context("Failed to check host build")?;

    if !host_output.status.success() {
        eprintln!("{}", "  ✗ Host check failed".red().bold());
        eprintln!();
        eprintln!("{}", String::from_utf8_lossy(&host_output.stderr));
        anyhow::bail!("Host check failed");
    }
    println!("{}", "  ✓ Host check passed".green());
    println!();

    println!("{}", "  Running clippy lints...".cyan());
    let clippy_start = Instant::now();

    let clippy_output = Command::new("cargo")
        .args(["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"])
        .output()
        .context("Failed to run clippy")?;

    if !clippy_output.status.success() {
        eprintln!("{}", "  ⚠ Clippy warnings found".yellow().bold());
        eprintln!();
        eprintln!("{}", String::from_utf8_lossy(&clippy_output.stderr));
    } else {
        println!(
            "{}",
            format!(
                "  ✓ Clippy passed in {:.2}s",
                clippy_start.elapsed().as_secs_f64()
            )
            .green()
        );
    }
    println!();

    println!("{}", "  Checking code formatting...".cyan());

    let fmt_output = Command::new("cargo")
        .args(["fmt", "--all", "--check"])
        .output()
        .context("Failed to run cargo fmt")?;

    if !fmt_output.status.success() {
        eprintln!("{}", "  ⚠ Formatting issues found".yellow().bold());
        eprintln!("     Run 'cargo fmt --all' to fix");
    } else {
        println!("{}", "  ✓ Formatting check passed".green());
    }
    println!();

    println!(
        "{}",
        format!(
            "✓ All checks completed in {:.2}s",
            total_start.elapsed().as_secs_f64()
        )
        .green()
        .bold()
    );
    println!();

    Ok(())
}
