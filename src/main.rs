use std::{error::Error, sync::Arc};

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        request, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, RequestPartsExt as _, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use derive_more::From;
use futures::{future::OptionFuture, FutureExt as _};
use serde::Deserialize;
use tokio::{fs, net, task};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{
    layer::SubscriberExt as _, util::SubscriberInitExt as _,
};
use uuid::Uuid;

use ticket_office::{api, auth, booking, db, Config};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = fs::read_to_string("config.toml").await?;
    let config = toml::from_str::<Config>(&config)?;

    let (db_client, db_connection) = db::connect(config.db).await?;
    let db_client = Arc::new(db_client);

    task::spawn(async move {
        if let Err(e) = db_connection.await {
            panic!("database connection failed: {e}");
        }
    });

    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);
    for origin in &config.http.cors.allowed_origins {
        cors = cors.allow_origin(origin.parse::<HeaderValue>()?);
    }

    let app = Router::new()
        .route("/auth", post(auth))
        .route("/session", get(session))
        .route("/event", get(list_events))
        .route("/event/:id", get(get_event))
        .route("/ticket", get(list_my_tickets).post(buy_ticket))
        .layer(cors)
        .with_state(Arc::new(AppState {
            orchestrator: booking::Orchestrator::new(
                Arc::clone(&db_client),
                config.booking.record_timeout,
            ),
            db_client,
            verifier: auth::Verifier::new(
                &config.jwt.secret,
                config.jwt.expiration_time,
            ),
        }));

    let listener = net::TcpListener::bind(config.http.server.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Deserialize)]
struct AuthInput {
    email: String,
    password: String,
}

async fn auth(
    State(state): State<SharedAppState>,
    Json(AuthInput { email, password }): Json<AuthInput>,
) -> Result<String, AuthError> {
    use AuthError as E;

    let password_hash = api::user::PasswordHash::new(&password);

    let user = state
        .db_client
        .get_user_by_email(&email)
        .await?
        .filter(|u| u.password_hash == password_hash)
        .ok_or(E::WrongEmailOrPassword)?;

    state
        .verifier
        .issue(user.id, user.role)
        .map_err(|_| E::InvalidToken)
}

#[derive(Debug, From)]
pub enum AuthError {
    #[from]
    DbError(db::Error),
    InvalidToken,
    WrongEmailOrPassword,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::WrongEmailOrPassword => StatusCode::FORBIDDEN,
        }
        .into_response()
    }
}

async fn session(
    State(state): State<SharedAppState>,
    identity: Option<AuthIdentity>,
) -> Result<Json<api::Session>, SessionError> {
    let user = OptionFuture::from(identity.map(|AuthIdentity(id)| {
        state.db_client.get_user_by_id(id.user_id)
    }))
    .map(Option::transpose)
    .await?
    .flatten();

    Ok(Json(api::Session {
        user: user.map(|u| api::User {
            id: u.id,
            name: u.name,
            role: u.role,
        }),
    }))
}

#[derive(Debug, From)]
pub enum SessionError {
    #[from]
    DbError(db::Error),
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
        .into_response()
    }
}

async fn list_events(
    State(state): State<SharedAppState>,
) -> Result<Json<Vec<api::Event>>, ListEventsError> {
    let events = state
        .db_client
        .list_events()
        .await?
        .into_iter()
        .map(api_event)
        .collect();

    Ok(Json(events))
}

#[derive(Debug, From)]
pub enum ListEventsError {
    #[from]
    DbError(db::Error),
}

impl IntoResponse for ListEventsError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
        .into_response()
    }
}

async fn get_event(
    State(state): State<SharedAppState>,
    Path(id): Path<api::event::Id>,
) -> Result<Json<api::Event>, GetEventError> {
    use GetEventError as E;

    let event = state
        .db_client
        .get_event_by_id(id)
        .await?
        .ok_or(E::EventNotFound)?;

    Ok(Json(api_event(event)))
}

#[derive(Debug, From)]
pub enum GetEventError {
    #[from]
    DbError(db::Error),
    EventNotFound,
}

impl IntoResponse for GetEventError {
    fn into_response(self) -> Response {
        match self {
            Self::EventNotFound => StatusCode::NOT_FOUND,
            Self::DbError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
        .into_response()
    }
}

async fn list_my_tickets(
    State(state): State<SharedAppState>,
    AuthIdentity(identity): AuthIdentity,
) -> Result<Json<Vec<api::Ticket>>, ListMyTicketsError> {
    let tickets = state
        .db_client
        .get_tickets_by_user(identity.user_id)
        .await?
        .into_iter()
        .map(api_ticket)
        .collect();

    Ok(Json(tickets))
}

#[derive(Debug, From)]
pub enum ListMyTicketsError {
    #[from]
    DbError(db::Error),
}

impl IntoResponse for ListMyTicketsError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
        .into_response()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuyTicketInput {
    event_id: api::event::Id,
    ticket_type_id: api::event::TicketTypeId,
    quantity: u32,
    idempotency_key: Option<Uuid>,
}

async fn buy_ticket(
    State(state): State<SharedAppState>,
    AuthIdentity(identity): AuthIdentity,
    Json(BuyTicketInput {
        event_id,
        ticket_type_id,
        quantity,
        idempotency_key,
    }): Json<BuyTicketInput>,
) -> Result<Json<api::Ticket>, BuyTicketError> {
    let ticket = state
        .orchestrator
        .purchase(
            &identity,
            booking::Request {
                user_id: identity.user_id,
                event_id,
                ticket_type: ticket_type_id,
                quantity,
                idempotency_key,
            },
        )
        .await?;

    Ok(Json(api_ticket(ticket)))
}

#[derive(Debug, From)]
pub enum BuyTicketError {
    #[from]
    PurchaseError(booking::PurchaseError),
}

impl IntoResponse for BuyTicketError {
    fn into_response(self) -> Response {
        use booking::PurchaseError as E;

        let Self::PurchaseError(e) = self;
        let status = match &e {
            E::InvalidQuantity => StatusCode::BAD_REQUEST,
            E::Unauthorized => StatusCode::UNAUTHORIZED,
            E::NotFound => StatusCode::NOT_FOUND,
            E::SoldOut | E::InsufficientStock => StatusCode::CONFLICT,
            E::RecordTimeout | E::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, e.to_string()).into_response()
    }
}

fn api_event(event: db::Event) -> api::Event {
    api::Event {
        id: event.id,
        title: event.title,
        date: event.date,
        location: event.location,
        description: event.description,
        image: event.image,
        ticket_types: event
            .ticket_types
            .into_iter()
            .map(|t| api::event::TicketType {
                id: t.id,
                label: t.label,
                price: t.price,
                remaining: t.remaining,
                status: t.status,
            })
            .collect(),
    }
}

fn api_ticket(ticket: db::Ticket) -> api::Ticket {
    api::Ticket {
        id: ticket.id,
        user_id: ticket.user_id,
        event_id: ticket.event_id,
        event_title: ticket.event_title,
        date: ticket.date,
        price: ticket.price,
        quantity: ticket.quantity,
        purchased_at: ticket.purchased_at.unix_timestamp(),
    }
}

type SharedAppState = Arc<AppState>;

struct AppState {
    db_client: Arc<db::Client>,

    orchestrator: booking::Orchestrator<Arc<db::Client>>,

    verifier: auth::Verifier,
}

/// Verified identity of the caller, extracted from the bearer token.
struct AuthIdentity(auth::Identity);

#[async_trait]
impl FromRequestParts<SharedAppState> for AuthIdentity {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut request::Parts,
        state: &SharedAppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::InvalidToken)?;
        let identity = state
            .verifier
            .verify(bearer.token())
            .map_err(|_| AuthError::InvalidToken)?;

        Ok(Self(identity))
    }
}
