//! `molar item` subcommands: draft-time CRUD and completion triggers.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use molar_core::catalog::TomlCatalog;
use molar_core::coordinator::{self, CompletionOutcome};
use molar_core::items::{self, ItemPatch, NewItem};

use crate::ItemCommands;
use crate::config::MolarConfig;

/// Run a `molar item` subcommand.
pub async fn run_item_command(
    command: ItemCommands,
    pool: &PgPool,
    config: &MolarConfig,
) -> Result<()> {
    match command {
        ItemCommands::Add {
            plan_id,
            service_id,
            material,
            notes,
            estimated_date,
        } => {
            let catalog = TomlCatalog::from_path(config.require_catalog()?)
                .context("failed to load service catalog")?;

            let plan_id = parse_id(&plan_id, "plan")?;
            let service_id = parse_id(&service_id, "service")?;
            let material_id = material.as_deref().map(|m| parse_id(m, "material")).transpose()?;

            let item = items::add_item(
                pool,
                &catalog,
                plan_id,
                NewItem {
                    service_id,
                    material_id,
                    notes: notes.unwrap_or_default(),
                    estimated_date: parse_date(estimated_date.as_deref())?,
                },
            )
            .await?;

            println!("Added item {} at position {}", item.id, item.position);
            println!(
                "Price: {} service + {} fixed materials + {} material = {}",
                item.price_service,
                item.price_fixed_materials,
                item.price_material,
                item.price_total
            );
        }
        ItemCommands::Remove { item_id } => {
            let id = parse_id(&item_id, "item")?;
            items::remove_item(pool, id).await?;
            println!("Removed item {id}");
        }
        ItemCommands::Edit {
            item_id,
            item_version,
            notes,
            estimated_date,
        } => {
            let id = parse_id(&item_id, "item")?;
            let item = items::edit_item(
                pool,
                id,
                item_version,
                ItemPatch {
                    notes,
                    estimated_date: parse_date(estimated_date.as_deref())?,
                },
            )
            .await?;
            println!("Updated item {} (version {})", item.id, item.version);
        }
        ItemCommands::Complete { item_id } => {
            let id = parse_id(&item_id, "item")?;
            let outcome = coordinator::complete_item_manually(pool, id).await?;
            print_outcome(&outcome);
        }
        ItemCommands::Link {
            item_id,
            episode_id,
            date,
        } => {
            let item_id = parse_id(&item_id, "item")?;
            let episode_id = parse_id(&episode_id, "episode")?;
            let date = date
                .as_deref()
                .map(|d| {
                    d.parse::<DateTime<Utc>>()
                        .with_context(|| format!("invalid date-time: {d}"))
                })
                .transpose()?;

            let outcome = coordinator::link_episode_to_item(pool, item_id, episode_id, date).await?;
            print_outcome(&outcome);
        }
    }

    Ok(())
}

fn parse_id(value: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("invalid {what} ID: {value}"))
}

fn parse_date(value: Option<&str>) -> Result<Option<NaiveDate>> {
    value
        .map(|d| {
            d.parse::<NaiveDate>()
                .with_context(|| format!("invalid date (expected YYYY-MM-DD): {d}"))
        })
        .transpose()
}

fn print_outcome(outcome: &CompletionOutcome) {
    println!("Item {} -> {}", outcome.item.id, outcome.item.state);
    println!(
        "Plan {} is {} ({}/{} items completed, {}%)",
        outcome.plan.id,
        outcome.plan.state,
        outcome.progress.completed,
        outcome.progress.total,
        outcome.progress.percent_complete()
    );
}
