//! # GENA : abonnements et notifications d'événements
//!
//! - [`client`] : abonnements tenus par le point de contrôle
//!   (`SUBSCRIBE_REQUESTED → ESTABLISHED → (RENEWING → ESTABLISHED)* → ENDED`),
//!   suivi des séquences et détection des événements manqués.
//! - [`server`] : abonnés distants des services locaux et livraison des
//!   NOTIFY.
//! - [`propertyset`] : corps XML `<e:propertyset>` des NOTIFY.

pub mod client;
mod errors;
pub mod propertyset;
pub mod server;

pub use client::{EndReason, RemoteGenaSubscription, SubscriptionCallback, SubscriptionState};
pub use errors::SubscriptionError;
pub use server::{LocalEventPublisher, LocalGenaSubscription};
