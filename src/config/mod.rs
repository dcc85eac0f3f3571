pub mod schema;

pub use schema::{AuthConfig, Config, GatewayConfig, StoreConfig};
