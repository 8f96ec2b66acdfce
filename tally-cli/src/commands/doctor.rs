//! Doctor command - check balances against transactions and repair drift

use anyhow::Result;
use colored::Colorize;
use comfy_table::{Cell, Color};
use dialoguer::Confirm;
use serde_json::{json, Value};
use tally_core::services::{DoctorResult, DoctorSummary};

use super::{get_context, Reported};
use crate::output;

/// `key: value` pairs of one finding
fn format_finding(value: &Value) -> String {
    let Value::Object(map) = value else {
        return value.to_string();
    };
    map.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| match v.as_str() {
            Some(s) => format!("{k}: {s}"),
            None => format!("{k}: {v}"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn status_cell(status: &str) -> Cell {
    match status {
        "pass" => Cell::new("ok").fg(Color::Green),
        "warning" => Cell::new("warning").fg(Color::Yellow),
        "error" => Cell::new("error").fg(Color::Red),
        other => Cell::new(other),
    }
}

fn print_checks(result: &DoctorResult, verbose: bool) {
    let mut table = output::create_table();
    table.set_header(vec!["Check", "", "Finding"]);
    for (name, check) in &result.checks {
        table.add_row(vec![
            Cell::new(name.replace('_', " ")),
            status_cell(&check.status),
            Cell::new(&check.message),
        ]);
    }
    println!("{}", table);

    if verbose {
        for (name, check) in &result.checks {
            let Some(details) = &check.details else { continue };
            println!("\n{}", name.replace('_', " ").bold());
            for detail in details {
                println!("  - {}", format_finding(detail));
            }
        }
    }

    let DoctorSummary {
        passed,
        warnings,
        errors,
    } = &result.summary;
    println!(
        "\n{} ok, {} warning(s), {} error(s)",
        passed.to_string().green(),
        warnings.to_string().yellow(),
        errors.to_string().red(),
    );
}

pub fn run(verbose: bool, fix: bool, force: bool, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let result = ctx.doctor_service.run_checks()?;

    if !fix {
        if json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            print_checks(&result, verbose);
        }
        if !result.is_healthy() {
            return Err(Reported {
                code: 500,
                status: "Unhealthy".to_string(),
            }
            .into());
        }
        return Ok(());
    }

    if !json {
        print_checks(&result, verbose);
        println!();

        if result.is_healthy() {
            output::success("Nothing to repair");
            return Ok(());
        }
        if !force
            && !Confirm::new()
                .with_prompt("Recompute every balance from its transactions?")
                .default(false)
                .interact()?
        {
            println!("{}", "Cancelled".dimmed());
            return Ok(());
        }
    }

    let repaired = ctx.doctor_service.fix()?;

    if json {
        let after = ctx.doctor_service.run_checks()?;
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "repaired": repaired,
                "after": after,
            }))?
        );
        return Ok(());
    }

    if repaired.is_empty() {
        output::info("All balances already matched");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["User", "Stored", "Recomputed", "Drift"]);
    for r in &repaired {
        table.add_row(vec![
            Cell::new(r.owner),
            Cell::new(format!("{:.2}", r.stored)),
            Cell::new(format!("{:.2}", r.recomputed)),
            Cell::new(format!("{:.2}", r.drift())).fg(Color::Yellow),
        ]);
    }
    println!("{}", table);
    output::success(&format!("Repaired {} balance(s)", repaired.len()));

    Ok(())
}
