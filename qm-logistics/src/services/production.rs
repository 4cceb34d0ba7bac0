//! Production feasibility for one crafted item

use crate::db::items::Item;
use crate::db::snapshot::ProductionSnapshot;
use qm_common::db::OwnerId;
use serde::Serialize;

/// A member holding enough of an ingredient to craft on their own
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapableHolder {
    pub owner_id: OwnerId,
    pub quantity: i64,
    pub can_make: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngredientFeasibility {
    pub item: String,
    pub ratio: i64,
    pub guild_total: i64,
    /// Outputs the guild's pooled stock of this ingredient supports
    pub supports: i64,
    pub capable_holders: Vec<CapableHolder>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductionReport {
    pub item: Item,
    pub direct_total: i64,
    /// Outputs craftable from pooled guild stock; bounded by the scarcest ingredient
    pub producible: i64,
    pub ingredients: Vec<IngredientFeasibility>,
}

pub fn production_report(snapshot: ProductionSnapshot) -> ProductionReport {
    let ingredients: Vec<IngredientFeasibility> = snapshot
        .ingredients
        .into_iter()
        .map(|(stock, holders)| IngredientFeasibility {
            supports: stock.guild_total / stock.ratio,
            capable_holders: holders
                .into_iter()
                .map(|h| CapableHolder {
                    owner_id: h.owner_id,
                    quantity: h.quantity,
                    can_make: h.quantity / stock.ratio,
                })
                .collect(),
            item: stock.item,
            ratio: stock.ratio,
            guild_total: stock.guild_total,
        })
        .collect();

    let producible = ingredients.iter().map(|i| i.supports).min().unwrap_or(0);

    ProductionReport {
        item: snapshot.item,
        direct_total: snapshot.direct_total,
        producible,
        ingredients,
    }
}
