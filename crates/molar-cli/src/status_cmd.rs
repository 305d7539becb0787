//! `molar status` command: show plan progress and per-item status.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use molar_core::service;

/// Run the status command.
///
/// When `plan_id_str` is `Some`, shows detailed status for that plan.
/// When `None`, lists all plans with a progress summary.
pub async fn run_status(pool: &PgPool, plan_id_str: Option<&str>) -> Result<()> {
    match plan_id_str {
        Some(id_str) => run_plan_status(pool, id_str).await,
        None => run_overview(pool).await,
    }
}

/// Show detailed status for a single plan.
async fn run_plan_status(pool: &PgPool, plan_id_str: &str) -> Result<()> {
    let plan_id =
        Uuid::parse_str(plan_id_str).with_context(|| format!("invalid plan ID: {plan_id_str}"))?;

    let (plan, items) = service::get_plan_with_items(pool, plan_id).await?;
    let progress = service::plan_progress(pool, plan_id).await?;

    println!("Plan: {} ({})", plan.title, plan.id);
    println!("State: {}", plan.state);
    if let Some(presented_at) = plan.presented_at {
        println!("Presented: {}", presented_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(accepted_at) = plan.accepted_at {
        println!("Accepted: {}", accepted_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(completed_at) = plan.completed_at {
        println!(
            "Completed: {}",
            completed_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    if let Some(cancelled_at) = plan.cancelled_at {
        println!(
            "Cancelled: {}",
            cancelled_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    println!();

    println!(
        "Progress: {}/{} completed ({}%)",
        progress.completed,
        progress.total,
        progress.percent_complete()
    );
    println!(
        "  pending={} in_progress={} completed={}",
        progress.pending, progress.in_progress, progress.completed,
    );
    println!();

    println!("Items:");
    for item in &items {
        let status_icon = match item.state.to_string().as_str() {
            "pending" => ".",
            "in_progress" => "*",
            "completed" => "+",
            _ => " ",
        };
        let realized = match item.realized_date {
            Some(when) => format!(", realized {}", when.format("%Y-%m-%d")),
            None => String::new(),
        };
        println!(
            "  [{}] #{} {} ({}{})",
            status_icon, item.position, item.price_total, item.state, realized
        );
    }

    Ok(())
}

/// List all plans with a one-line progress summary.
async fn run_overview(pool: &PgPool) -> Result<()> {
    let plans = service::list_plans(pool, None).await?;

    if plans.is_empty() {
        println!("No plans.");
        return Ok(());
    }

    for plan in &plans {
        let progress = service::plan_progress(pool, plan.id).await?;
        println!(
            "{}  {:<12} {}/{} items  {}",
            plan.id, plan.state, progress.completed, progress.total, plan.title
        );
    }

    Ok(())
}
