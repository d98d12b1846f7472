//! Backend access for the patient chart: a cancellable fetch gateway, the
//! chart's read and write calls, and per-widget fetch state.

mod cancel;
mod client;
mod error;
mod gateway;
mod http;
mod slot;
mod widget;

pub use cancel::CancellationToken;
pub use client::ChartClient;
pub use error::ClientError;
pub use gateway::{FetchGateway, GatewayRequest, GatewayResponse, Method};
pub use http::HttpGateway;
pub use slot::{FetchSlot, FetchTicket, SlotPhase};
pub use widget::{ErrorReporter, LoadOutcome, TracingReporter, Widget};
