pub mod api;
pub mod view;

pub use api::{CallLog, DashboardClient};
pub use view::{render_appointments, render_calls};
