use std::error::Error as StdError;

use derive_more::Display;
use enum_utils::TryFromRepr;
use itertools::Itertools as _;
use serde::{Deserialize, Serialize};
use tokio_postgres::{
    types::{
        accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, ToSql,
        Type,
    },
    Error,
};

use super::Client;

#[derive(Clone, Debug)]
pub struct Event {
    pub id: Id,
    pub title: String,
    pub date: String,
    pub location: String,
    pub description: String,
    pub image: String,
    pub ticket_types: Vec<TicketType>,
}

/// Purchasable category within an event, carrying its own price and
/// remaining stock. Addressed by its durable [`TicketTypeId`], never by
/// its position in the event's list.
#[derive(Clone, Debug)]
pub struct TicketType {
    pub id: TicketTypeId,
    pub label: String,
    pub price: f64,
    pub remaining: u32,
    pub status: Status,
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Display, Eq, Hash, PartialEq,
    Serialize,
)]
pub struct Id(i64);

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl FromSql<'_> for Id {
    accepts!(INT8);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        i64::from_sql(ty, raw).map(Self)
    }
}

impl ToSql for Id {
    accepts!(INT8);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.0.to_sql(ty, out)
    }
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Display, Eq, Hash, PartialEq,
    Serialize,
)]
pub struct TicketTypeId(i64);

impl From<i64> for TicketTypeId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl FromSql<'_> for TicketTypeId {
    accepts!(INT8);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        i64::from_sql(ty, raw).map(Self)
    }
}

impl ToSql for TicketTypeId {
    accepts!(INT8);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.0.to_sql(ty, out)
    }
}

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, TryFromRepr, PartialEq, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Status {
    /// Stock remains and the type accepts reservations.
    Available = 1,

    /// Remaining quantity reached zero. Left again only through a
    /// compensating release.
    SoldOut = 2,
}

impl FromSql<'_> for Status {
    accepts!(INT2);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from_sql(ty, raw)?;
        let repr = u8::try_from(repr)?;
        let status = Self::try_from(repr).map_err(|_| "invalid status")?;
        Ok(status)
    }
}

impl ToSql for Status {
    accepts!(INT2);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from((*self) as u8);
        repr.to_sql(ty, out)
    }
}

/// Row produced by a successful conditional decrement, carrying the
/// denormalized event snapshot so recording the purchase needs no
/// second read.
#[derive(Clone, Debug)]
pub struct DecrementedRow {
    pub price: f64,
    pub remaining: u32,
    pub status: Status,
    pub event_title: String,
    pub event_date: String,
}

impl Client {
    pub async fn get_event_by_id(
        &self,
        id: Id,
    ) -> Result<Option<Event>, Error> {
        const SQL: &str = "\
            SELECT e.id, e.title, e.date, e.location, \
                   e.description, e.image, \
                   t.id AS type_id, t.label, t.price, \
                   t.remaining, t.status \
            FROM events AS e \
            LEFT JOIN ticket_types AS t ON t.event_id = e.id \
            WHERE e.id = $1 \
            ORDER BY t.position";
        let rows = self.0.query(SQL, &[&id]).await?;
        Ok(collect_events(rows).pop())
    }

    pub async fn list_events(&self) -> Result<Vec<Event>, Error> {
        const SQL: &str = "\
            SELECT e.id, e.title, e.date, e.location, \
                   e.description, e.image, \
                   t.id AS type_id, t.label, t.price, \
                   t.remaining, t.status \
            FROM events AS e \
            LEFT JOIN ticket_types AS t ON t.event_id = e.id \
            ORDER BY e.date DESC, \
                     e.id DESC, \
                     t.position";
        let rows = self.0.query(SQL, &[]).await?;
        Ok(collect_events(rows))
    }

    /// Decrements the remaining quantity of a ticket type if, and only
    /// if, enough stock remains, as one storage-level operation. Marks
    /// the type sold out when the counter reaches zero.
    ///
    /// Returns `None` when the condition did not hold; concurrent
    /// callers racing on one counter therefore cannot both succeed past
    /// the available stock.
    pub async fn decrement_ticket_type(
        &self,
        event_id: Id,
        id: TicketTypeId,
        quantity: u32,
    ) -> Result<Option<DecrementedRow>, Error> {
        const SQL: &str = "\
            UPDATE ticket_types AS t \
            SET remaining = t.remaining - $3, \
                status = CASE WHEN t.remaining - $3 = 0 \
                              THEN $4 ELSE t.status END \
            FROM events AS e \
            WHERE t.id = $2 AND t.event_id = $1 AND e.id = t.event_id \
                  AND t.status = $5 AND t.remaining >= $3 \
            RETURNING t.price, t.remaining, t.status, \
                      e.title AS event_title, e.date AS event_date";

        let quantity = i32::try_from(quantity).unwrap_or(i32::MAX);
        Ok(self
            .0
            .query_opt(
                SQL,
                &[
                    &event_id,
                    &id,
                    &quantity,
                    &Status::SoldOut,
                    &Status::Available,
                ],
            )
            .await?
            .map(|row| DecrementedRow {
                price: row.get("price"),
                remaining: u32::try_from(row.get::<_, i32>("remaining"))
                    .unwrap_or_default(),
                status: row.get("status"),
                event_title: row.get("event_title"),
                event_date: row.get("event_date"),
            }))
    }

    /// Restores previously decremented stock, re-opening a sold-out
    /// type. Compensating counterpart of [`decrement_ticket_type`].
    ///
    /// [`decrement_ticket_type`]: Client::decrement_ticket_type
    pub async fn increment_ticket_type(
        &self,
        event_id: Id,
        id: TicketTypeId,
        quantity: u32,
    ) -> Result<(), Error> {
        const SQL: &str = "\
            UPDATE ticket_types \
            SET remaining = remaining + $3, \
                status = $4 \
            WHERE id = $2 AND event_id = $1";

        let quantity = i32::try_from(quantity).unwrap_or(i32::MAX);
        self.0
            .execute(SQL, &[&event_id, &id, &quantity, &Status::Available])
            .await
            .map(drop)
    }

    /// Current state of one ticket type, used to tell apart the reasons
    /// a conditional decrement matched no row.
    pub async fn get_ticket_type_state(
        &self,
        event_id: Id,
        id: TicketTypeId,
    ) -> Result<Option<(Status, u32)>, Error> {
        const SQL: &str = "\
            SELECT status, remaining \
            FROM ticket_types \
            WHERE id = $2 AND event_id = $1";
        Ok(self.0.query_opt(SQL, &[&event_id, &id]).await?.map(|row| {
            (
                row.get("status"),
                u32::try_from(row.get::<_, i32>("remaining"))
                    .unwrap_or_default(),
            )
        }))
    }
}

fn collect_events(rows: Vec<tokio_postgres::Row>) -> Vec<Event> {
    rows.into_iter()
        .chunk_by(|row| row.get::<_, Id>("id"))
        .into_iter()
        .map(|(id, rows)| {
            let mut rows = rows.peekable();
            let first = rows.peek().expect("chunk is never empty");
            let mut event = Event {
                id,
                title: first.get("title"),
                date: first.get("date"),
                location: first.get("location"),
                description: first.get("description"),
                image: first.get("image"),
                ticket_types: Vec::new(),
            };
            event.ticket_types = rows
                .filter_map(|row| {
                    let id = row.get::<_, Option<TicketTypeId>>("type_id")?;
                    Some(TicketType {
                        id,
                        label: row.get("label"),
                        price: row.get("price"),
                        remaining: u32::try_from(
                            row.get::<_, i32>("remaining"),
                        )
                        .unwrap_or_default(),
                        status: row.get("status"),
                    })
                })
                .collect();
            event
        })
        .collect()
}
