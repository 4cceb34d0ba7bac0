//! Dashboard rendering
//!
//! Turns a `StatusReport` into the message content published to the chat
//! gateway. Plain data, no formatting markup beyond the progress bar glyphs.

use crate::services::aggregation::{RequirementStatus, StatusReport};
use serde::{Deserialize, Serialize};

/// Cells in a progress bar
pub const BAR_CELLS: i64 = 12;

pub const FOOTER: &str = "Updates live • ▓ = Ready, ▒ = Craftable";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardField {
    pub name: String,
    pub value: String,
}

/// One rendered dashboard message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedDashboard {
    pub title: String,
    pub description: Option<String>,
    pub fields: Vec<DashboardField>,
    pub footer: String,
}

pub fn render_dashboard(report: &StatusReport) -> RenderedDashboard {
    let description = report
        .available_sets
        .map(|sets| format!("Available Sets: {} completions available.", sets));

    let mut fields: Vec<DashboardField> = report
        .requirements
        .iter()
        .map(|r| DashboardField {
            name: r.item.clone(),
            value: requirement_text(r),
        })
        .collect();

    if report.requirements.is_empty() {
        fields.push(DashboardField {
            name: "Requirements".to_string(),
            value: "No requirements yet.".to_string(),
        });
    }

    RenderedDashboard {
        title: format!("Project Status: {}", report.project.name),
        description,
        fields,
        footer: FOOTER.to_string(),
    }
}

fn requirement_text(r: &RequirementStatus) -> String {
    let percent = (r.potential_progress * 100.0).floor() as i64;
    let mut text = format!(
        "{} {}%\nReady: {} / {}\n",
        progress_bar(r.direct_total, r.crafted, r.target_amount),
        percent,
        r.direct_total,
        r.target_amount
    );

    if r.crafted > 0 {
        let sources: Vec<String> = r
            .ingredients
            .iter()
            .map(|i| format!("{} excess {}", i.surplus, i.item))
            .collect();
        text.push_str(&format!("Potential: +{} (from {})\n", r.crafted, sources.join(", ")));
    } else if r.ingredients.iter().any(|i| i.reserved > 0 && i.guild_total > 0) {
        text.push_str("Raw materials reserved\n");
    }

    text
}

/// `▓` for direct stock, `▒` for craftable stock, `░` for the rest
pub fn progress_bar(direct: i64, crafted: i64, target: i64) -> String {
    let target = target.max(1);
    let ready = (direct.max(0) * BAR_CELLS / target).min(BAR_CELLS);
    let craftable = (crafted.max(0) * BAR_CELLS / target).min(BAR_CELLS - ready);
    let empty = BAR_CELLS - ready - craftable;

    format!(
        "{}{}{}",
        "▓".repeat(ready as usize),
        "▒".repeat(craftable as usize),
        "░".repeat(empty as usize)
    )
}
