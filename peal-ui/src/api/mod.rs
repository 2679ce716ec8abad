//! HTTP handlers for peal-ui

pub mod auth;
pub mod employees;
pub mod error;
pub mod health;
pub mod home;
pub mod methods;
pub mod practices;
pub mod touches;

pub use auth::{auth_middleware, login, login_page, logout};
pub use employees::employee_routes;
pub use error::{UiError, UiResult};
pub use health::health_routes;
pub use home::dashboard;
pub use methods::method_routes;
pub use practices::practice_routes;
pub use touches::touch_routes;
