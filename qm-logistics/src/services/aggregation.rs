//! Aggregation engine
//!
//! Pure computation over a `ProjectSnapshot`: direct progress, recipe-augmented
//! potential progress, completion, and how many full sets the guild could
//! assemble. No I/O happens here.
//!
//! Per requirement:
//! - `direct_total` is the guild-wide sum of the item itself.
//! - `producible` is how many units the guild could craft from its ingredients
//!   (every ingredient line is consumed per unit, so the scarcest one bounds it).
//!   An ingredient that is also a requirement of the same project is reserved
//!   for that requirement first; only the surplus counts.
//! - `crafted = min(producible, max(target - direct, 0))` so crafting only ever
//!   fills the remaining gap.
//! - `potential_total = direct_total + crafted`.

use crate::db::projects::Project;
use crate::db::snapshot::{ProjectSnapshot, RequirementStock};
use qm_common::db::ItemId;
use serde::Serialize;
use std::collections::HashMap;

/// How one ingredient contributes to a requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngredientUse {
    pub item: String,
    pub ratio: i64,
    pub guild_total: i64,
    /// Held back because the project also requires this item directly
    pub reserved: i64,
    /// `guild_total - reserved`, never negative
    pub surplus: i64,
    /// Units of output this ingredient alone could support
    pub supports: i64,
}

/// Progress of one requirement line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequirementStatus {
    pub item: String,
    pub target_amount: i64,
    pub direct_total: i64,
    /// Units craftable from ingredients, before capping at the gap
    pub producible: i64,
    /// Part of `producible` that counts toward the target
    pub crafted: i64,
    pub potential_total: i64,
    pub direct_progress: f64,
    pub potential_progress: f64,
    pub complete: bool,
    pub ingredients: Vec<IngredientUse>,
}

/// Status of a whole project
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub project: Project,
    pub requirements: Vec<RequirementStatus>,
    /// True iff there is at least one requirement and all are met from direct stock
    pub complete: bool,
    /// Full project sets buildable from direct plus craftable stock; `None` for an empty project
    pub available_sets: Option<i64>,
}

/// Compute the report for a snapshot
pub fn compute_report(snapshot: &ProjectSnapshot) -> StatusReport {
    let targets: HashMap<ItemId, i64> = snapshot
        .requirements
        .iter()
        .map(|r| (r.item_id, r.target_amount))
        .collect();

    let requirements: Vec<RequirementStatus> = snapshot
        .requirements
        .iter()
        .map(|r| requirement_status(r, &targets))
        .collect();

    let complete = !requirements.is_empty() && requirements.iter().all(|r| r.complete);

    let available_sets = requirements
        .iter()
        .map(|r| (r.direct_total + r.producible) / r.target_amount)
        .min();

    StatusReport {
        project: snapshot.project.clone(),
        requirements,
        complete,
        available_sets,
    }
}

fn requirement_status(
    stock: &RequirementStock,
    targets: &HashMap<ItemId, i64>,
) -> RequirementStatus {
    let target = stock.target_amount;
    let direct = stock.direct_total;

    let ingredients: Vec<IngredientUse> = stock
        .ingredients
        .iter()
        .map(|ingredient| {
            let reserved = targets.get(&ingredient.item_id).copied().unwrap_or(0);
            let surplus = (ingredient.guild_total - reserved).max(0);
            IngredientUse {
                item: ingredient.item.clone(),
                ratio: ingredient.ratio,
                guild_total: ingredient.guild_total,
                reserved,
                surplus,
                supports: surplus / ingredient.ratio,
            }
        })
        .collect();

    let producible = ingredients.iter().map(|i| i.supports).min().unwrap_or(0);
    let gap = (target - direct).max(0);
    let crafted = producible.min(gap);
    let potential_total = direct + crafted;

    RequirementStatus {
        item: stock.item.clone(),
        target_amount: target,
        direct_total: direct,
        producible,
        crafted,
        potential_total,
        direct_progress: progress(direct, target),
        potential_progress: progress(potential_total, target),
        complete: direct >= target,
        ingredients,
    }
}

/// `min(amount, target) / target`; targets are validated positive at write time
fn progress(amount: i64, target: i64) -> f64 {
    if target <= 0 {
        return 0.0;
    }
    amount.clamp(0, target) as f64 / target as f64
}
