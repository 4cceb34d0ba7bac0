//! HTTP command surface
//!
//! One route per command. Handlers validate, call the store, fire the
//! post-mutation hook and shape the reply; no business rules live here.

pub mod dashboard;
pub mod deferred;
pub mod followups;
pub mod health;
pub mod ledger;
pub mod lookup;
pub mod projects;
pub mod recipes;

pub use dashboard::dashboard_routes;
pub use followups::followup_routes;
pub use health::health_routes;
pub use ledger::ledger_routes;
pub use lookup::lookup_routes;
pub use projects::project_routes;
pub use recipes::recipe_routes;

use serde::Deserialize;

/// Body of the bulk paste commands
#[derive(Debug, Deserialize)]
pub struct BulkText {
    pub text: String,
}

/// `?q=` fragment for autocomplete routes
#[derive(Debug, Default, Deserialize)]
pub struct AutocompleteQuery {
    #[serde(default)]
    pub q: String,
}
