use serde::{Deserialize, Serialize};

pub use crate::db::event::{Id, Status, TicketTypeId};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Id,
    pub title: String,
    pub date: String,
    pub location: String,
    pub description: String,
    pub image: String,
    pub ticket_types: Vec<TicketType>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketType {
    pub id: TicketTypeId,
    pub label: String,
    pub price: f64,
    pub remaining: u32,
    pub status: Status,
}
