pub mod config;
pub mod gateway;
mod server;

pub use gateway::{Envelope, GatewayReply, Method, OperationGateway, Status};
pub use server::{build_router, AppState};
