//! `molar plan` subcommands: creation, listing, and lifecycle actions.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use molar_core::lifecycle;
use molar_core::service::{self, NewPlan};
use molar_db::models::{PlanPriority, TreatmentPlan};

use crate::PlanCommands;

/// Run a `molar plan` subcommand.
pub async fn run_plan_command(command: PlanCommands, pool: &PgPool) -> Result<()> {
    match command {
        PlanCommands::Create {
            patient,
            practitioner,
            title,
            description,
            priority,
            notes,
        } => {
            let patient_id = parse_id(&patient, "patient")?;
            let practitioner_id = parse_id(&practitioner, "practitioner")?;
            let priority = match priority {
                Some(value) => value
                    .parse::<PlanPriority>()
                    .with_context(|| format!("invalid priority: {value}"))?,
                None => PlanPriority::Medium,
            };

            let plan = service::create_plan(
                pool,
                NewPlan {
                    patient_id,
                    practitioner_id,
                    title,
                    description: description.unwrap_or_default(),
                    priority,
                    internal_notes: notes.unwrap_or_default(),
                },
            )
            .await?;

            println!("Created plan {} ({})", plan.title, plan.id);
            println!("State: {}", plan.state);
        }
        PlanCommands::Show { plan_id, patient } => match plan_id {
            Some(id_str) => show_plan(pool, &id_str).await?,
            None => {
                let patient_id = patient
                    .as_deref()
                    .map(|p| parse_id(p, "patient"))
                    .transpose()?;
                list_plans(pool, patient_id).await?
            }
        },
        PlanCommands::Present { plan_id } => {
            let id = parse_id(&plan_id, "plan")?;
            let plan = lifecycle::present(pool, id).await?;
            print_transition(&plan);
        }
        PlanCommands::Accept { plan_id } => {
            let id = parse_id(&plan_id, "plan")?;
            let plan = lifecycle::accept(pool, id).await?;
            print_transition(&plan);
            println!("Item set is now frozen.");
        }
        PlanCommands::Reject { plan_id, reason } => {
            let id = parse_id(&plan_id, "plan")?;
            let plan = lifecycle::reject(pool, id, reason.as_deref()).await?;
            print_transition(&plan);
        }
        PlanCommands::Cancel { plan_id, reason } => {
            let id = parse_id(&plan_id, "plan")?;
            let plan = lifecycle::cancel(pool, id, &reason).await?;
            print_transition(&plan);
        }
    }

    Ok(())
}

fn parse_id(value: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("invalid {what} ID: {value}"))
}

fn print_transition(plan: &TreatmentPlan) {
    println!("Plan {} -> {}", plan.id, plan.state);
}

async fn show_plan(pool: &PgPool, id_str: &str) -> Result<()> {
    let plan_id = parse_id(id_str, "plan")?;
    let (plan, items) = service::get_plan_with_items(pool, plan_id).await?;

    println!("Plan: {} ({})", plan.title, plan.id);
    println!("Patient: {}", plan.patient_id);
    println!("Practitioner: {}", plan.practitioner_id);
    println!("State: {}  Priority: {}", plan.state, plan.priority);
    if !plan.description.is_empty() {
        println!("Description: {}", plan.description);
    }
    if let Some(reason) = &plan.rejection_reason {
        println!("Rejection reason: {reason}");
    }
    if let Some(reason) = &plan.cancellation_reason {
        println!("Cancellation reason: {reason}");
    }
    println!();

    if items.is_empty() {
        println!("No items yet.");
        return Ok(());
    }

    println!("Items:");
    let mut total = rust_decimal::Decimal::ZERO;
    for item in &items {
        let status_icon = match item.state.to_string().as_str() {
            "pending" => ".",
            "in_progress" => "*",
            "completed" => "+",
            _ => " ",
        };
        println!(
            "  [{}] #{} service {} total {} ({})",
            status_icon, item.position, item.service_id, item.price_total, item.state
        );
        total += item.price_total;
    }
    println!();
    println!("Plan total: {total}");

    Ok(())
}

async fn list_plans(pool: &PgPool, patient_id: Option<Uuid>) -> Result<()> {
    let plans = service::list_plans(pool, patient_id).await?;

    if plans.is_empty() {
        println!("No plans.");
        return Ok(());
    }

    for plan in &plans {
        println!(
            "{}  {:<12} {:<8} {}",
            plan.id, plan.state, plan.priority, plan.title
        );
    }

    Ok(())
}
