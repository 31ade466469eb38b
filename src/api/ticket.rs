use serde::{Deserialize, Serialize};

use crate::api;

pub use crate::db::ticket::Id;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Id,
    pub user_id: api::user::Id,
    pub event_id: api::event::Id,
    pub event_title: String,
    pub date: String,
    pub price: f64,
    pub quantity: u32,
    /// Unix timestamp of the purchase, seconds.
    pub purchased_at: i64,
}
