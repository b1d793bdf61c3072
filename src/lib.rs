pub mod alerts;
pub mod collectors;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod monitor;
pub mod recovery;
pub mod util;

pub use error::{MonitorError, MonitorResult};
pub use monitor::{
    Monitor, TickReport,
    query::{AlertsView, Dashboard, HealthReport},
};
