//! Purchase state machine and the inventory contract backing it.
//!
//! A purchase moves `Requested -> Authorized -> Reserved -> Recorded`.
//! Any failure before the reservation leaves no trace; a failure after
//! it must release the claimed stock before surfacing, so the ledger
//! never under-counts relative to the tickets that actually exist.

use std::{error::Error as StdError, sync::Arc, time::Duration};

use async_trait::async_trait;
use derive_more::{Display, From};
use ::time::OffsetDateTime;
use tokio::time;
use uuid::Uuid;

use crate::{
    auth,
    db::{
        self,
        event::{self, TicketTypeId},
        ticket, user,
    },
};

/// Stock atomically claimed from one ticket type, pending record
/// creation. Carries the catalog snapshot captured by the claim, so
/// recording the purchase needs no second read of the event.
#[derive(Clone, Debug)]
pub struct Reservation {
    pub event_id: event::Id,
    pub ticket_type: TicketTypeId,
    pub quantity: u32,
    pub price: f64,
    pub event_title: String,
    pub event_date: String,
}

/// Inventory ledger and purchase-record storage consumed by the
/// [`Orchestrator`].
///
/// `reserve` must be atomic with respect to other `reserve` calls on
/// the same ticket type: the weighted sum of successful reservations
/// never exceeds the stock that was available, no matter how calls
/// interleave. Implementations serialize the check-and-decrement at the
/// storage layer (a conditional update, or one critical section for
/// in-memory stores), never as a read followed by a write.
#[async_trait]
pub trait Store: Send + Sync {
    /// Claims `quantity` units from a ticket type, transitioning it to
    /// sold out when the counter reaches zero. `quantity` is a positive
    /// integer, validated by the caller.
    async fn reserve(
        &self,
        event_id: event::Id,
        ticket_type: TicketTypeId,
        quantity: u32,
    ) -> Result<Reservation, ReserveError>;

    /// Compensating restore of a reservation whose downstream step
    /// failed. Re-opens a sold-out type when stock reappears.
    async fn release(
        &self,
        reservation: &Reservation,
    ) -> Result<(), StoreError>;

    /// Durably writes a purchase record. Returns `false` without
    /// writing when another record already carries the same idempotency
    /// key.
    async fn insert_ticket(
        &self,
        ticket: &db::Ticket,
    ) -> Result<bool, StoreError>;

    async fn get_ticket_by_idempotency_key(
        &self,
        key: Uuid,
    ) -> Result<Option<db::Ticket>, StoreError>;
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn reserve(
        &self,
        event_id: event::Id,
        ticket_type: TicketTypeId,
        quantity: u32,
    ) -> Result<Reservation, ReserveError> {
        (**self).reserve(event_id, ticket_type, quantity).await
    }

    async fn release(
        &self,
        reservation: &Reservation,
    ) -> Result<(), StoreError> {
        (**self).release(reservation).await
    }

    async fn insert_ticket(
        &self,
        ticket: &db::Ticket,
    ) -> Result<bool, StoreError> {
        (**self).insert_ticket(ticket).await
    }

    async fn get_ticket_by_idempotency_key(
        &self,
        key: Uuid,
    ) -> Result<Option<db::Ticket>, StoreError> {
        (**self).get_ticket_by_idempotency_key(key).await
    }
}

#[derive(Debug, Display, From)]
pub enum ReserveError {
    /// Event or ticket type does not exist.
    #[display("event or ticket type not found")]
    NotFound,

    /// Ticket type already transitioned to sold out.
    #[display("ticket type is sold out")]
    SoldOut,

    /// Fewer units remain than were requested.
    #[display("insufficient stock remaining")]
    InsufficientStock,

    #[display("storage error: {_0}")]
    #[from]
    Store(StoreError),
}

/// Opaque storage failure.
#[derive(Debug, Display)]
pub struct StoreError(Box<dyn StdError + Send + Sync>);

impl StoreError {
    pub fn new(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self(source.into())
    }
}

impl From<db::Error> for StoreError {
    fn from(e: db::Error) -> Self {
        Self(e.into())
    }
}

/// Purchase request as presented by the HTTP collaborator. The user
/// identifier must match the verified identity making the call.
#[derive(Clone, Copy, Debug)]
pub struct Request {
    pub user_id: user::Id,
    pub event_id: event::Id,
    pub ticket_type: TicketTypeId,
    pub quantity: u32,
    /// Caller-supplied token deduplicating retried attempts. Two
    /// purchases bearing the same key produce one ticket and one
    /// decrement.
    pub idempotency_key: Option<Uuid>,
}

#[derive(Debug, Display, From)]
pub enum PurchaseError {
    #[display("quantity must be a positive integer")]
    InvalidQuantity,

    #[display("request user does not match the verified identity")]
    Unauthorized,

    #[display("event or ticket type not found")]
    NotFound,

    #[display("ticket type is sold out")]
    SoldOut,

    #[display("insufficient stock remaining")]
    InsufficientStock,

    #[display("purchase record was not written in time")]
    RecordTimeout,

    #[display("storage error: {_0}")]
    #[from]
    Store(StoreError),
}

impl From<ReserveError> for PurchaseError {
    fn from(e: ReserveError) -> Self {
        match e {
            ReserveError::NotFound => Self::NotFound,
            ReserveError::SoldOut => Self::SoldOut,
            ReserveError::InsufficientStock => Self::InsufficientStock,
            ReserveError::Store(e) => Self::Store(e),
        }
    }
}

/// End-to-end purchase state machine on top of a [`Store`].
pub struct Orchestrator<S> {
    store: S,
    record_timeout: Duration,
}

impl<S: Store> Orchestrator<S> {
    pub fn new(store: S, record_timeout: Duration) -> Self {
        Self {
            store,
            record_timeout,
        }
    }

    /// Performs one purchase: authorizes the request, atomically claims
    /// stock, and records the ticket.
    ///
    /// On success exactly one ledger decrement happened and exactly one
    /// immutable ticket exists. On any failure either nothing changed,
    /// or the claimed stock was released before returning.
    pub async fn purchase(
        &self,
        identity: &auth::Identity,
        request: Request,
    ) -> Result<db::Ticket, PurchaseError> {
        use PurchaseError as E;

        // Requested -> Authorized. No mutation on either rejection.
        if request.user_id != identity.user_id {
            return Err(E::Unauthorized);
        }
        if request.quantity == 0 {
            return Err(E::InvalidQuantity);
        }

        // A retried request bearing a known key short-circuits before
        // touching the ledger.
        if let Some(key) = request.idempotency_key {
            if let Some(existing) =
                self.store.get_ticket_by_idempotency_key(key).await?
            {
                tracing::debug!(
                    %key,
                    ticket = %existing.id,
                    "purchase deduplicated by idempotency key",
                );
                return Ok(existing);
            }
        }

        // Authorized -> Reserved.
        let reservation = self
            .store
            .reserve(request.event_id, request.ticket_type, request.quantity)
            .await?;

        let ticket = db::Ticket {
            id: ticket::Id::new(),
            user_id: request.user_id,
            event_id: request.event_id,
            event_title: reservation.event_title.clone(),
            date: reservation.event_date.clone(),
            price: reservation.price,
            quantity: request.quantity,
            purchased_at: OffsetDateTime::now_utc(),
            idempotency_key: request.idempotency_key,
        };

        // Reserved -> Recorded, bounded by the record timeout. Past
        // this point every failure path must release the reservation.
        let written = time::timeout(
            self.record_timeout,
            self.store.insert_ticket(&ticket),
        )
        .await;

        match written {
            Ok(Ok(true)) => Ok(ticket),
            Ok(Ok(false)) => {
                // A concurrent retry with the same key won the insert.
                // This attempt's stock claim is surplus.
                self.release(&reservation).await;
                let key = request
                    .idempotency_key
                    .ok_or_else(|| duplicate_without_key())?;
                self.store
                    .get_ticket_by_idempotency_key(key)
                    .await?
                    .ok_or_else(|| duplicate_without_key())
            }
            Ok(Err(e)) => {
                self.release(&reservation).await;
                Err(E::Store(e))
            }
            Err(_elapsed) => {
                self.release(&reservation).await;
                Err(E::RecordTimeout)
            }
        }
    }

    /// Runs the compensating release after a failed record step. A
    /// release that itself fails leaves the ledger under-counted
    /// relative to reality, which is why it is reported at error level
    /// rather than as an ordinary request failure.
    async fn release(&self, reservation: &Reservation) {
        match self.store.release(reservation).await {
            Ok(()) => tracing::warn!(
                event = %reservation.event_id,
                ticket_type = %reservation.ticket_type,
                quantity = reservation.quantity,
                "released reservation after failed purchase record",
            ),
            Err(e) => tracing::error!(
                event = %reservation.event_id,
                ticket_type = %reservation.ticket_type,
                quantity = reservation.quantity,
                error = %e,
                "failed to release reservation, stock is leaked",
            ),
        }
    }
}

fn duplicate_without_key() -> PurchaseError {
    PurchaseError::Store(StoreError::new(
        "duplicate purchase record detected without an idempotency key",
    ))
}

#[async_trait]
impl Store for db::Client {
    async fn reserve(
        &self,
        event_id: event::Id,
        ticket_type: TicketTypeId,
        quantity: u32,
    ) -> Result<Reservation, ReserveError> {
        use ReserveError as E;

        let row = self
            .decrement_ticket_type(event_id, ticket_type, quantity)
            .await
            .map_err(StoreError::from)?;

        match row {
            Some(row) => Ok(Reservation {
                event_id,
                ticket_type,
                quantity,
                price: row.price,
                event_title: row.event_title,
                event_date: row.event_date,
            }),
            // The conditional update matched nothing. A second read may
            // tell a different moment than the update saw, but only the
            // rejection reason depends on it, never the counter.
            None => match self
                .get_ticket_type_state(event_id, ticket_type)
                .await
                .map_err(StoreError::from)?
            {
                None => Err(E::NotFound),
                Some((event::Status::SoldOut, _)) => Err(E::SoldOut),
                Some((event::Status::Available, _)) => {
                    Err(E::InsufficientStock)
                }
            },
        }
    }

    async fn release(
        &self,
        reservation: &Reservation,
    ) -> Result<(), StoreError> {
        self.increment_ticket_type(
            reservation.event_id,
            reservation.ticket_type,
            reservation.quantity,
        )
        .await
        .map_err(StoreError::from)
    }

    async fn insert_ticket(
        &self,
        ticket: &db::Ticket,
    ) -> Result<bool, StoreError> {
        db::Client::insert_ticket(self, ticket)
            .await
            .map_err(StoreError::from)
    }

    async fn get_ticket_by_idempotency_key(
        &self,
        key: Uuid,
    ) -> Result<Option<db::Ticket>, StoreError> {
        db::Client::get_ticket_by_idempotency_key(self, key)
            .await
            .map_err(StoreError::from)
    }
}
