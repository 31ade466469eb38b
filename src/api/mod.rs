pub mod event;
pub mod ticket;
pub mod user;

pub use self::{
    event::Event,
    ticket::Ticket,
    user::{Session, User},
};
