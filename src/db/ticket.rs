use std::error::Error as StdError;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_postgres::{
    types::{
        accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, ToSql,
        Type,
    },
    Error,
};
use uuid::Uuid;

use super::{event, user, Client};

/// Purchase record. Written once by a successful purchase and never
/// updated; the event title and date are a snapshot captured at
/// purchase time, not re-derived from the catalog.
#[derive(Clone, Debug)]
pub struct Ticket {
    pub id: Id,
    pub user_id: user::Id,
    pub event_id: event::Id,
    pub event_title: String,
    pub date: String,
    pub price: f64,
    pub quantity: u32,
    pub purchased_at: OffsetDateTime,
    pub idempotency_key: Option<Uuid>,
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Display, Eq, PartialEq,
    Serialize,
)]
pub struct Id(Uuid);

impl Id {
    pub fn new() -> Self {
        Id(Uuid::new_v4())
    }
}

impl From<u128> for Id {
    fn from(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }
}

impl FromSql<'_> for Id {
    accepts!(UUID);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        Uuid::from_sql(ty, raw).map(Self)
    }
}

impl ToSql for Id {
    accepts!(UUID);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.0.to_sql(ty, out)
    }
}

impl Client {
    /// Inserts a purchase record. Returns `false` without writing when
    /// another record already carries the same idempotency key, so a
    /// retried purchase can be recognized instead of double-booked.
    pub async fn insert_ticket(&self, ticket: &Ticket) -> Result<bool, Error> {
        const SQL: &str = "\
            INSERT INTO tickets (id, user_id, event_id, event_title, \
                                 date, price, quantity, purchased_at, \
                                 idempotency_key) \
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
            ON CONFLICT (idempotency_key) DO NOTHING";

        let inserted = self
            .0
            .execute(
                SQL,
                &[
                    &ticket.id,
                    &ticket.user_id,
                    &ticket.event_id,
                    &ticket.event_title,
                    &ticket.date,
                    &(ticket.price),
                    &i32::try_from(ticket.quantity).unwrap_or(i32::MAX),
                    &ticket.purchased_at,
                    &ticket.idempotency_key,
                ],
            )
            .await?;

        Ok(inserted == 1)
    }

    pub async fn get_ticket_by_idempotency_key(
        &self,
        key: Uuid,
    ) -> Result<Option<Ticket>, Error> {
        const SQL: &str = "\
            SELECT id, user_id, event_id, event_title, \
                   date, price, quantity, purchased_at, \
                   idempotency_key \
            FROM tickets \
            WHERE idempotency_key = $1";
        Ok(self
            .0
            .query_opt(SQL, &[&key])
            .await?
            .map(ticket_from_row))
    }

    pub async fn get_tickets_by_user(
        &self,
        user_id: user::Id,
    ) -> Result<Vec<Ticket>, Error> {
        const SQL: &str = "\
            SELECT id, user_id, event_id, event_title, \
                   date, price, quantity, purchased_at, \
                   idempotency_key \
            FROM tickets \
            WHERE user_id = $1 \
            ORDER BY purchased_at DESC, \
                     id DESC";
        Ok(self
            .0
            .query(SQL, &[&user_id])
            .await?
            .into_iter()
            .map(ticket_from_row)
            .collect())
    }
}

fn ticket_from_row(row: tokio_postgres::Row) -> Ticket {
    Ticket {
        id: row.get("id"),
        user_id: row.get("user_id"),
        event_id: row.get("event_id"),
        event_title: row.get("event_title"),
        date: row.get("date"),
        price: row.get("price"),
        quantity: u32::try_from(row.get::<_, i32>("quantity"))
            .unwrap_or_default(),
        purchased_at: row.get("purchased_at"),
        idempotency_key: row.get("idempotency_key"),
    }
}
