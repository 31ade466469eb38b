use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex as StdMutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use ticket_office::{
    auth,
    booking::{
        Orchestrator, Request, Reservation, ReserveError, Store, StoreError,
    },
    db::{
        self,
        event::{Status, TicketType},
    },
};

/// Ledger and ticket storage backed by process memory. The
/// check-and-decrement of `reserve` runs under one lock, which is the
/// serialized critical section the booking store contract asks for.
///
/// Fault injection: a number of upcoming `insert_ticket` calls can be
/// made to fail, and inserts can be delayed to overlap concurrent
/// purchases or to trip the record timeout.
pub struct InMemoryStore {
    events: Mutex<Vec<db::Event>>,
    tickets: Mutex<Vec<db::Ticket>>,
    insert_faults: AtomicU32,
    insert_delay: StdMutex<Option<Duration>>,
}

impl InMemoryStore {
    pub fn new(events: Vec<db::Event>) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(events),
            tickets: Mutex::new(Vec::new()),
            insert_faults: AtomicU32::new(0),
            insert_delay: StdMutex::new(None),
        })
    }

    /// Makes the next `n` inserts of purchase records fail.
    pub fn fail_inserts(&self, n: u32) {
        self.insert_faults.store(n, Ordering::SeqCst);
    }

    /// Delays every insert of a purchase record by `delay`.
    pub fn delay_inserts(&self, delay: Duration) {
        *self.insert_delay.lock().unwrap() = Some(delay);
    }

    pub async fn ticket_type_state(
        &self,
        event_id: i64,
        ticket_type: i64,
    ) -> Option<(Status, u32)> {
        let events = self.events.lock().await;
        let ticket_type = db::event::TicketTypeId::from(ticket_type);
        events
            .iter()
            .find(|e| e.id == event_id.into())?
            .ticket_types
            .iter()
            .find(|t| t.id == ticket_type)
            .map(|t| (t.status, t.remaining))
    }

    pub async fn tickets(&self) -> Vec<db::Ticket> {
        self.tickets.lock().await.clone()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn reserve(
        &self,
        event_id: db::event::Id,
        ticket_type: db::event::TicketTypeId,
        quantity: u32,
    ) -> Result<Reservation, ReserveError> {
        use ReserveError as E;

        let mut events = self.events.lock().await;
        let event = events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or(E::NotFound)?;
        let (title, date) = (event.title.clone(), event.date.clone());
        let ty = event
            .ticket_types
            .iter_mut()
            .find(|t| t.id == ticket_type)
            .ok_or(E::NotFound)?;

        if ty.status == Status::SoldOut {
            return Err(E::SoldOut);
        }
        if ty.remaining < quantity {
            return Err(E::InsufficientStock);
        }

        ty.remaining -= quantity;
        if ty.remaining == 0 {
            ty.status = Status::SoldOut;
        }

        Ok(Reservation {
            event_id,
            ticket_type,
            quantity,
            price: ty.price,
            event_title: title,
            event_date: date,
        })
    }

    async fn release(
        &self,
        reservation: &Reservation,
    ) -> Result<(), StoreError> {
        let mut events = self.events.lock().await;
        let ty = events
            .iter_mut()
            .find(|e| e.id == reservation.event_id)
            .and_then(|e| {
                e.ticket_types
                    .iter_mut()
                    .find(|t| t.id == reservation.ticket_type)
            })
            .ok_or_else(|| StoreError::new("reserved ticket type vanished"))?;

        ty.remaining += reservation.quantity;
        ty.status = Status::Available;

        Ok(())
    }

    async fn insert_ticket(
        &self,
        ticket: &db::Ticket,
    ) -> Result<bool, StoreError> {
        let delay = *self.insert_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self
            .insert_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                n.checked_sub(1)
            })
            .is_ok()
        {
            return Err(StoreError::new("injected insert failure"));
        }

        let mut tickets = self.tickets.lock().await;
        if let Some(key) = ticket.idempotency_key {
            if tickets.iter().any(|t| t.idempotency_key == Some(key)) {
                return Ok(false);
            }
        }
        tickets.push(ticket.clone());

        Ok(true)
    }

    async fn get_ticket_by_idempotency_key(
        &self,
        key: Uuid,
    ) -> Result<Option<db::Ticket>, StoreError> {
        Ok(self
            .tickets
            .lock()
            .await
            .iter()
            .find(|t| t.idempotency_key == Some(key))
            .cloned())
    }
}

pub fn event(id: i64, ticket_types: Vec<TicketType>) -> db::Event {
    db::Event {
        id: id.into(),
        title: "Rock Concert".to_string(),
        date: "2026-07-15".to_string(),
        location: "Madrid".to_string(),
        description: "A night of live music.".to_string(),
        image: "rock.jpg".to_string(),
        ticket_types,
    }
}

pub fn ticket_type(id: i64, price: f64, remaining: u32) -> TicketType {
    TicketType {
        id: id.into(),
        label: "General".to_string(),
        price,
        remaining,
        status: if remaining == 0 {
            Status::SoldOut
        } else {
            Status::Available
        },
    }
}

pub fn identity(user_id: i64) -> auth::Identity {
    auth::Identity {
        user_id: user_id.into(),
        role: db::user::Role::User,
    }
}

pub fn request(
    user_id: i64,
    event_id: i64,
    ticket_type: i64,
    quantity: u32,
) -> Request {
    Request {
        user_id: user_id.into(),
        event_id: event_id.into(),
        ticket_type: ticket_type.into(),
        quantity,
        idempotency_key: None,
    }
}

pub fn orchestrator(
    store: &Arc<InMemoryStore>,
) -> Orchestrator<Arc<InMemoryStore>> {
    orchestrator_with_timeout(store, Duration::from_secs(1))
}

pub fn orchestrator_with_timeout(
    store: &Arc<InMemoryStore>,
    record_timeout: Duration,
) -> Orchestrator<Arc<InMemoryStore>> {
    Orchestrator::new(Arc::clone(store), record_timeout)
}
