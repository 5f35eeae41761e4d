//! Smart Device Management (Nest) collaborators: token service and device API.

mod auth;
mod client;
mod models;

pub use auth::{exchange_authorization_code, TokenProvider, TokenResponse};
pub use client::NestClient;
pub use models::{Device, DevicesResponse, ParentRelation, HUMIDITY_TRAIT, INFO_TRAIT, TEMPERATURE_TRAIT};
