//! Background consumers of the event bus.

pub mod event_worker;
pub mod stock_alerts;

pub use event_worker::{EventWorker, WorkerHandle};
pub use stock_alerts::{AlertLog, StockAlert, StockAlertMonitor, spawn_stock_alert_worker};
