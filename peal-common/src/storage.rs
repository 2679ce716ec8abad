//! Storage interface and backend selection
//!
//! [`Storage`] is implemented by [`JsonStore`](crate::json_store::JsonStore)
//! and [`SqlStore`](crate::sql_store::SqlStore). The active backend is chosen
//! once at startup by [`open_storage`]; callers only ever hold an
//! `Arc<dyn Storage>`.
//!
//! # Contract
//!
//! - `list_*` return records in insertion order.
//! - `get_*` return `Ok(None)` for an unknown id.
//! - `update_*` return [`Error::NotFound`](crate::Error::NotFound) for an unknown id.
//! - Every write fully succeeds or leaves stored state unchanged.
//! - Deleting a practice also deletes its touches. Deleting an employee or a
//!   method that a touch still references fails with
//!   [`Error::ReferentialIntegrity`](crate::Error::ReferentialIntegrity).

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::json_store::JsonStore;
use crate::models::{
    Employee, EmployeeFields, Method, MethodFields, Practice, PracticeFields, Summary, Touch,
    TouchFields,
};
use crate::sql_store::SqlStore;
use crate::Result;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Backend name for logs and the health endpoint
    fn backend_name(&self) -> &'static str;

    // --- Employees ---
    async fn list_employees(&self) -> Result<Vec<Employee>>;
    async fn get_employee(&self, id: Uuid) -> Result<Option<Employee>>;
    async fn create_employee(&self, fields: EmployeeFields) -> Result<Employee>;
    async fn update_employee(&self, id: Uuid, fields: EmployeeFields) -> Result<Employee>;
    async fn delete_employee(&self, id: Uuid) -> Result<()>;

    // --- Practices ---
    async fn list_practices(&self) -> Result<Vec<Practice>>;
    async fn get_practice(&self, id: Uuid) -> Result<Option<Practice>>;
    async fn create_practice(&self, fields: PracticeFields) -> Result<Practice>;
    async fn update_practice(&self, id: Uuid, fields: PracticeFields) -> Result<Practice>;
    /// Removes the practice and every touch it owns
    async fn delete_practice(&self, id: Uuid) -> Result<()>;

    // --- Methods ---
    async fn list_methods(&self) -> Result<Vec<Method>>;
    async fn get_method(&self, id: Uuid) -> Result<Option<Method>>;
    async fn create_method(&self, fields: MethodFields) -> Result<Method>;
    async fn update_method(&self, id: Uuid, fields: MethodFields) -> Result<Method>;
    async fn delete_method(&self, id: Uuid) -> Result<()>;

    // --- Touches ---
    async fn list_touches(&self) -> Result<Vec<Touch>>;
    /// Touches of one practice, ordered by touch number
    async fn list_touches_for_practice(&self, practice_id: Uuid) -> Result<Vec<Touch>>;
    /// Touches whose practice falls on `date`, ordered by touch number
    async fn list_touches_on_date(&self, date: NaiveDate) -> Result<Vec<Touch>>;
    async fn get_touch(&self, id: Uuid) -> Result<Option<Touch>>;
    async fn create_touch(&self, fields: TouchFields) -> Result<Touch>;
    async fn update_touch(&self, id: Uuid, fields: TouchFields) -> Result<Touch>;
    async fn delete_touch(&self, id: Uuid) -> Result<()>;

    /// Smallest free touch number in the practice; one past the per-practice cap when full
    async fn next_touch_number(&self, practice_id: Uuid) -> Result<u32> {
        let touches = self.list_touches_for_practice(practice_id).await?;
        Ok(crate::validation::next_free_touch_number(
            touches.iter().map(|t| t.touch_number),
        ))
    }

    /// Dashboard counts
    async fn summary(&self) -> Result<Summary> {
        let employees = self.list_employees().await?;
        Ok(Summary {
            members: employees.iter().filter(|e| e.member).count(),
            employees: employees.len(),
            practices: self.list_practices().await?.len(),
            methods: self.list_methods().await?.len(),
            touches: self.list_touches().await?.len(),
        })
    }
}

/// Construct the configured backend
///
/// Called once at startup; switching backends requires a restart.
pub async fn open_storage(config: &StorageConfig) -> Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = if config.use_relational {
        let store = SqlStore::connect(config).await?;
        Arc::new(store)
    } else {
        let store = JsonStore::open(&config.json_path).await?;
        Arc::new(store)
    };

    info!("Storage backend ready: {}", storage.backend_name());
    Ok(storage)
}
