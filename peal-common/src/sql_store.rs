//! Relational backend (sqlx `Any` pool over SQLite or Postgres)
//!
//! The dialect comes from the URL scheme: `sqlite:` for a local file or
//! in-memory database, `postgres://` for a remote server. Tables are created
//! on connect with `CREATE TABLE IF NOT EXISTS`, so opening an existing
//! database is a no-op migration. Bell assignments live in the `touch_bells`
//! side table keyed by `(touch_id, slot)`; the slot count is kept on the touch
//! row so trailing empty slots survive a round trip.
//!
//! Every statement is parameterized with `$N` placeholders, which both
//! drivers accept. Reference and numbering checks run before the write,
//! inside the same transaction as the write; if a concurrent writer still
//! wins the race, the schema constraints reject the statement and the driver
//! error is reported through the common taxonomy.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::any::{install_default_drivers, AnyConnectOptions, AnyPoolOptions, AnyRow};
use sqlx::{AnyConnection, AnyPool, Row};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::models::{
    format_date, parse_date, Employee, EmployeeFields, Method, MethodFields, Practice,
    PracticeFields, Touch, TouchFields,
};
use crate::storage::Storage;
use crate::validation;
use crate::{Error, Result};

/// SQL flavour behind the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    /// Pick the dialect from the URL scheme. The URL itself is never echoed.
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url
            .split_once(':')
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .unwrap_or_default();
        match scheme.as_str() {
            "sqlite" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            _ => Err(Error::Config(
                "unsupported database URL: expected sqlite: or postgres://".to_string(),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
        }
    }

    /// Auto-numbered key column that records insertion order
    fn sequence_column(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "seq INTEGER PRIMARY KEY",
            Dialect::Postgres => "seq BIGSERIAL PRIMARY KEY",
        }
    }
}

/// File-backed SQLite URLs open read-write-create unless a mode is given
fn sqlite_create_if_missing(url: &str) -> String {
    if url.contains(":memory:") || url.contains("mode=") {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}mode=rwc", url, separator)
}

/// Storage backend over a SQLite or Postgres connection pool
pub struct SqlStore {
    pool: AnyPool,
    dialect: Dialect,
}

impl SqlStore {
    /// Open the pool described by `config` and ensure the schema exists
    ///
    /// The connection URL and its parts are never logged. `acquire_timeout_ms`
    /// bounds connection establishment, so an unreachable server fails with
    /// [`Error::BackendUnavailable`] instead of hanging.
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let url = config.connection_url()?;
        let dialect = Dialect::from_url(url.expose())?;
        let url = match dialect {
            Dialect::Sqlite => sqlite_create_if_missing(url.expose()),
            Dialect::Postgres => url.expose().to_string(),
        };

        install_default_drivers();
        let options = AnyConnectOptions::from_str(&url)
            .map_err(|_| Error::Config("database URL could not be parsed".to_string()))?;

        info!(
            "Connecting to {} database (pool min={}, max={})",
            dialect.as_str(),
            config.pool_min_connections,
            config.pool_max_connections
        );
        let pool = AnyPoolOptions::new()
            .min_connections(config.pool_min_connections)
            .max_connections(config.pool_max_connections)
            .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms))
            .connect_with(options)
            .await
            .map_err(|e| match Error::from(e) {
                // Driver text for configuration errors can contain the URL
                Error::Config(msg) => Error::Config(msg),
                other => {
                    error!("Failed to connect to database: {}", other);
                    Error::BackendUnavailable(
                        "failed to connect to the database; check credentials and network"
                            .to_string(),
                    )
                }
            })?;

        Self::from_pool(pool, dialect).await
    }

    /// Wrap an existing pool, creating tables if needed
    pub async fn from_pool(pool: AnyPool, dialect: Dialect) -> Result<Self> {
        init_schema(&pool, dialect).await?;
        Ok(Self { pool, dialect })
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }
}

// ============================================================================
// Schema
// ============================================================================

/// Idempotent: safe to run against an existing database
pub async fn init_schema(pool: &AnyPool, dialect: Dialect) -> Result<()> {
    info!("Ensuring database tables exist");
    create_employees_table(pool, dialect).await?;
    create_practices_table(pool, dialect).await?;
    create_methods_table(pool, dialect).await?;
    create_touches_table(pool, dialect).await?;
    create_touch_bells_table(pool).await?;
    info!("Database tables ensured");
    Ok(())
}

async fn create_employees_table(pool: &AnyPool, dialect: Dialect) -> Result<()> {
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS employees (
            {},
            id TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            member BIGINT NOT NULL CHECK (member IN (0, 1)),
            resident TEXT NOT NULL
        )
        "#,
        dialect.sequence_column()
    ))
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_practices_table(pool: &AnyPool, dialect: Dialect) -> Result<()> {
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS practices (
            {},
            id TEXT NOT NULL UNIQUE,
            date TEXT NOT NULL,
            location TEXT NOT NULL
        )
        "#,
        dialect.sequence_column()
    ))
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_practices_date ON practices(date)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_methods_table(pool: &AnyPool, dialect: Dialect) -> Result<()> {
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS methods (
            {},
            id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            code TEXT
        )
        "#,
        dialect.sequence_column()
    ))
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_touches_table(pool: &AnyPool, dialect: Dialect) -> Result<()> {
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS touches (
            {},
            id TEXT NOT NULL UNIQUE,
            practice_id TEXT NOT NULL REFERENCES practices(id) ON DELETE CASCADE,
            method_id TEXT NOT NULL REFERENCES methods(id),
            touch_number BIGINT NOT NULL CHECK (touch_number BETWEEN 1 AND 12),
            conductor_id TEXT REFERENCES employees(id),
            bell_slots BIGINT NOT NULL DEFAULT 0 CHECK (bell_slots BETWEEN 0 AND 12),
            UNIQUE (practice_id, touch_number)
        )
        "#,
        dialect.sequence_column()
    ))
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_touch_bells_table(pool: &AnyPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS touch_bells (
            touch_id TEXT NOT NULL REFERENCES touches(id) ON DELETE CASCADE,
            slot BIGINT NOT NULL CHECK (slot BETWEEN 0 AND 11),
            employee_id TEXT NOT NULL REFERENCES employees(id),
            PRIMARY KEY (touch_id, slot),
            UNIQUE (touch_id, employee_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_touch_bells_employee ON touch_bells(employee_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

// ============================================================================
// Row decoding
// ============================================================================

fn corrupt(what: &str, detail: impl std::fmt::Display) -> Error {
    Error::BackendUnavailable(format!("stored {} is malformed: {}", what, detail))
}

fn parse_id(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| corrupt("id", e))
}

fn parse_opt_id(s: Option<String>) -> Result<Option<Uuid>> {
    s.as_deref().map(parse_id).transpose()
}

fn employee_from_row(row: &AnyRow) -> Result<Employee> {
    let resident: String = row.try_get("resident")?;
    Ok(Employee {
        id: parse_id(&row.try_get::<String, _>("id")?)?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        member: row.try_get::<i64, _>("member")? != 0,
        resident: resident.parse().map_err(|e| corrupt("resident", e))?,
    })
}

fn practice_from_row(row: &AnyRow) -> Result<Practice> {
    let date: String = row.try_get("date")?;
    let location: String = row.try_get("location")?;
    Ok(Practice {
        id: parse_id(&row.try_get::<String, _>("id")?)?,
        date: parse_date(&date).map_err(|e| corrupt("date", e))?,
        location: location.parse().map_err(|e| corrupt("location", e))?,
    })
}

fn method_from_row(row: &AnyRow) -> Result<Method> {
    Ok(Method {
        id: parse_id(&row.try_get::<String, _>("id")?)?,
        name: row.try_get("name")?,
        code: row.try_get("code")?,
    })
}

/// Touch row before its bells are attached
struct TouchRow {
    touch: Touch,
    bell_slots: usize,
}

fn touch_from_row(row: &AnyRow) -> Result<TouchRow> {
    let number: i64 = row.try_get("touch_number")?;
    let bell_slots: i64 = row.try_get("bell_slots")?;
    Ok(TouchRow {
        touch: Touch {
            id: parse_id(&row.try_get::<String, _>("id")?)?,
            practice_id: parse_id(&row.try_get::<String, _>("practice_id")?)?,
            method_id: parse_id(&row.try_get::<String, _>("method_id")?)?,
            touch_number: u32::try_from(number).map_err(|e| corrupt("touch number", e))?,
            conductor_id: parse_opt_id(row.try_get("conductor_id")?)?,
            bells: Vec::new(),
        },
        bell_slots: usize::try_from(bell_slots).map_err(|e| corrupt("bell slot count", e))?,
    })
}

/// Rebuild each touch's slot list from `(touch_id, slot, employee_id)` rows
fn attach_bells(rows: Vec<TouchRow>, bells: Vec<AnyRow>) -> Result<Vec<Touch>> {
    let mut by_touch: HashMap<Uuid, Vec<(usize, Uuid)>> = HashMap::new();
    for bell in &bells {
        let touch_id = parse_id(&bell.try_get::<String, _>("touch_id")?)?;
        let slot: i64 = bell.try_get("slot")?;
        let employee_id = parse_id(&bell.try_get::<String, _>("employee_id")?)?;
        let slot = usize::try_from(slot).map_err(|e| corrupt("bell slot", e))?;
        by_touch.entry(touch_id).or_default().push((slot, employee_id));
    }

    rows.into_iter()
        .map(|TouchRow { mut touch, bell_slots }| {
            let assigned = by_touch.remove(&touch.id).unwrap_or_default();
            let len = assigned
                .iter()
                .map(|(slot, _)| slot + 1)
                .max()
                .unwrap_or(0)
                .max(bell_slots);
            touch.bells = vec![None; len];
            for (slot, employee_id) in assigned {
                touch.bells[slot] = Some(employee_id);
            }
            Ok(touch)
        })
        .collect()
}

const TOUCH_COLUMNS: &str =
    "t.id, t.practice_id, t.method_id, t.touch_number, t.conductor_id, t.bell_slots";

// ============================================================================
// Touch write helpers (run on a transaction's connection)
// ============================================================================

const PRACTICE_EXISTS: &str = "SELECT id FROM practices WHERE id = $1";
const METHOD_EXISTS: &str = "SELECT id FROM methods WHERE id = $1";
const EMPLOYEE_EXISTS: &str = "SELECT id FROM employees WHERE id = $1";
const TOUCH_EXISTS: &str = "SELECT id FROM touches WHERE id = $1";

async fn row_exists(conn: &mut AnyConnection, sql: &'static str, id: Uuid) -> Result<bool> {
    let found: Option<String> = sqlx::query_scalar(sql)
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

/// Reference, capacity and numbering checks; `touch_id` is set on update
async fn check_touch(
    conn: &mut AnyConnection,
    fields: &TouchFields,
    touch_id: Option<Uuid>,
) -> Result<()> {
    validation::touch_shape(fields)?;

    if !row_exists(conn, PRACTICE_EXISTS, fields.practice_id).await? {
        return Err(validation::missing_practice(fields.practice_id));
    }
    if !row_exists(conn, METHOD_EXISTS, fields.method_id).await? {
        return Err(validation::missing_method(fields.method_id));
    }
    for employee_id in validation::touch_employee_refs(fields) {
        if !row_exists(conn, EMPLOYEE_EXISTS, employee_id).await? {
            return Err(validation::missing_employee(employee_id));
        }
    }

    let siblings: Vec<(String, i64)> =
        sqlx::query_as("SELECT id, touch_number FROM touches WHERE practice_id = $1")
            .bind(fields.practice_id.to_string())
            .fetch_all(&mut *conn)
            .await?;
    let own_id = touch_id.map(|id| id.to_string());
    let siblings: Vec<i64> = siblings
        .into_iter()
        .filter(|(id, _)| Some(id) != own_id.as_ref())
        .map(|(_, number)| number)
        .collect();

    let moving_in = match &own_id {
        Some(id) => {
            let current: Option<String> =
                sqlx::query_scalar("SELECT practice_id FROM touches WHERE id = $1")
                    .bind(id.clone())
                    .fetch_optional(&mut *conn)
                    .await?;
            current.as_deref() != Some(fields.practice_id.to_string().as_str())
        }
        None => true,
    };
    if moving_in {
        validation::touch_capacity(siblings.len())?;
    }

    if siblings.contains(&i64::from(fields.touch_number)) {
        return Err(validation::duplicate_touch_number(fields.touch_number));
    }

    Ok(())
}

async fn replace_bells(
    conn: &mut AnyConnection,
    touch_id: Uuid,
    bells: &[Option<Uuid>],
) -> Result<()> {
    sqlx::query("DELETE FROM touch_bells WHERE touch_id = $1")
        .bind(touch_id.to_string())
        .execute(&mut *conn)
        .await?;

    for (slot, employee_id) in bells.iter().enumerate() {
        if let Some(employee_id) = employee_id {
            sqlx::query(
                "INSERT INTO touch_bells (touch_id, slot, employee_id) VALUES ($1, $2, $3)",
            )
            .bind(touch_id.to_string())
            .bind(slot as i64)
            .bind(employee_id.to_string())
            .execute(&mut *conn)
            .await?;
        }
    }

    Ok(())
}

impl SqlStore {
    async fn fetch_touches(
        &self,
        touch_sql: &str,
        bell_sql: &str,
        param: Option<String>,
    ) -> Result<Vec<Touch>> {
        let mut touch_query = sqlx::query(touch_sql);
        let mut bell_query = sqlx::query(bell_sql);
        if let Some(param) = param {
            touch_query = touch_query.bind(param.clone());
            bell_query = bell_query.bind(param);
        }

        let rows = touch_query.fetch_all(&self.pool).await?;
        let rows = rows.iter().map(touch_from_row).collect::<Result<Vec<_>>>()?;
        let bells = bell_query.fetch_all(&self.pool).await?;
        attach_bells(rows, bells)
    }
}

#[async_trait]
impl Storage for SqlStore {
    fn backend_name(&self) -> &'static str {
        "relational"
    }

    // ------------------------------------------------------------------
    // Employees
    // ------------------------------------------------------------------

    async fn list_employees(&self) -> Result<Vec<Employee>> {
        let rows = sqlx::query(
            "SELECT id, first_name, last_name, member, resident FROM employees ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await?;
        debug!("Fetched {} employees", rows.len());
        rows.iter().map(employee_from_row).collect()
    }

    async fn get_employee(&self, id: Uuid) -> Result<Option<Employee>> {
        let row = sqlx::query(
            "SELECT id, first_name, last_name, member, resident FROM employees WHERE id = $1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(employee_from_row).transpose()
    }

    async fn create_employee(&self, fields: EmployeeFields) -> Result<Employee> {
        let fields = validation::employee(fields)?;
        let employee = Employee::from_fields(Uuid::new_v4(), fields);

        sqlx::query(
            r#"
            INSERT INTO employees (id, first_name, last_name, member, resident)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(employee.id.to_string())
        .bind(&employee.first_name)
        .bind(&employee.last_name)
        .bind(i64::from(employee.member))
        .bind(employee.resident.as_str())
        .execute(&self.pool)
        .await?;

        info!("Added employee {} ({})", employee.full_name(), employee.id);
        Ok(employee)
    }

    async fn update_employee(&self, id: Uuid, fields: EmployeeFields) -> Result<Employee> {
        let fields = validation::employee(fields)?;
        let employee = Employee::from_fields(id, fields);

        let result = sqlx::query(
            r#"
            UPDATE employees
            SET first_name = $1, last_name = $2, member = $3, resident = $4
            WHERE id = $5
            "#,
        )
        .bind(&employee.first_name)
        .bind(&employee.last_name)
        .bind(i64::from(employee.member))
        .bind(employee.resident.as_str())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(validation::not_found("employee", id));
        }
        info!("Updated employee {}", id);
        Ok(employee)
    }

    async fn delete_employee(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if !row_exists(&mut tx, EMPLOYEE_EXISTS, id).await? {
            return Err(validation::not_found("employee", id));
        }

        let in_use: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM touches t
            WHERE t.conductor_id = $1
               OR EXISTS (
                   SELECT 1 FROM touch_bells b WHERE b.touch_id = t.id AND b.employee_id = $1
               )
            "#,
        )
        .bind(id.to_string())
        .fetch_one(&mut *tx)
        .await?;
        if in_use > 0 {
            return Err(validation::employee_in_use(id, in_use as usize));
        }

        sqlx::query("DELETE FROM employees WHERE id = $1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("Deleted employee {}", id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Practices
    // ------------------------------------------------------------------

    async fn list_practices(&self) -> Result<Vec<Practice>> {
        let rows = sqlx::query("SELECT id, date, location FROM practices ORDER BY seq")
            .fetch_all(&self.pool)
            .await?;
        debug!("Fetched {} practices", rows.len());
        rows.iter().map(practice_from_row).collect()
    }

    async fn get_practice(&self, id: Uuid) -> Result<Option<Practice>> {
        let row = sqlx::query("SELECT id, date, location FROM practices WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(practice_from_row).transpose()
    }

    async fn create_practice(&self, fields: PracticeFields) -> Result<Practice> {
        let practice = Practice::from_fields(Uuid::new_v4(), fields);

        sqlx::query("INSERT INTO practices (id, date, location) VALUES ($1, $2, $3)")
            .bind(practice.id.to_string())
            .bind(format_date(&practice.date))
            .bind(practice.location.as_str())
            .execute(&self.pool)
            .await?;

        info!("Added practice {} ({})", practice.label(), practice.id);
        Ok(practice)
    }

    async fn update_practice(&self, id: Uuid, fields: PracticeFields) -> Result<Practice> {
        let practice = Practice::from_fields(id, fields);

        let result = sqlx::query("UPDATE practices SET date = $1, location = $2 WHERE id = $3")
            .bind(format_date(&practice.date))
            .bind(practice.location.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(validation::not_found("practice", id));
        }
        info!("Updated practice {}", id);
        Ok(practice)
    }

    async fn delete_practice(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Explicit cascade so the result does not depend on the foreign_keys pragma
        sqlx::query(
            "DELETE FROM touch_bells \
             WHERE touch_id IN (SELECT id FROM touches WHERE practice_id = $1)",
        )
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
        let touches = sqlx::query("DELETE FROM touches WHERE practice_id = $1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let result = sqlx::query("DELETE FROM practices WHERE id = $1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(validation::not_found("practice", id));
        }
        tx.commit().await?;

        info!("Deleted practice {} and {} touch(es)", id, touches);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Methods
    // ------------------------------------------------------------------

    async fn list_methods(&self) -> Result<Vec<Method>> {
        let rows = sqlx::query("SELECT id, name, code FROM methods ORDER BY seq")
            .fetch_all(&self.pool)
            .await?;
        debug!("Fetched {} methods", rows.len());
        rows.iter().map(method_from_row).collect()
    }

    async fn get_method(&self, id: Uuid) -> Result<Option<Method>> {
        let row = sqlx::query("SELECT id, name, code FROM methods WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(method_from_row).transpose()
    }

    async fn create_method(&self, fields: MethodFields) -> Result<Method> {
        let fields = validation::method(fields)?;
        let method = Method::from_fields(Uuid::new_v4(), fields);

        sqlx::query("INSERT INTO methods (id, name, code) VALUES ($1, $2, $3)")
            .bind(method.id.to_string())
            .bind(&method.name)
            .bind(&method.code)
            .execute(&self.pool)
            .await?;

        info!("Added method {} ({})", method.name, method.id);
        Ok(method)
    }

    async fn update_method(&self, id: Uuid, fields: MethodFields) -> Result<Method> {
        let fields = validation::method(fields)?;
        let method = Method::from_fields(id, fields);

        let result = sqlx::query("UPDATE methods SET name = $1, code = $2 WHERE id = $3")
            .bind(&method.name)
            .bind(&method.code)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(validation::not_found("method", id));
        }
        info!("Updated method {}", id);
        Ok(method)
    }

    async fn delete_method(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if !row_exists(&mut tx, METHOD_EXISTS, id).await? {
            return Err(validation::not_found("method", id));
        }

        let in_use: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM touches WHERE method_id = $1")
            .bind(id.to_string())
            .fetch_one(&mut *tx)
            .await?;
        if in_use > 0 {
            return Err(validation::method_in_use(id, in_use as usize));
        }

        sqlx::query("DELETE FROM methods WHERE id = $1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("Deleted method {}", id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Touches
    // ------------------------------------------------------------------

    async fn list_touches(&self) -> Result<Vec<Touch>> {
        let touches = self
            .fetch_touches(
                &format!("SELECT {} FROM touches t ORDER BY t.seq", TOUCH_COLUMNS),
                "SELECT touch_id, slot, employee_id FROM touch_bells",
                None,
            )
            .await?;
        debug!("Fetched {} touches", touches.len());
        Ok(touches)
    }

    async fn list_touches_for_practice(&self, practice_id: Uuid) -> Result<Vec<Touch>> {
        self.fetch_touches(
            &format!(
                "SELECT {} FROM touches t WHERE t.practice_id = $1 ORDER BY t.touch_number",
                TOUCH_COLUMNS
            ),
            r#"
            SELECT b.touch_id, b.slot, b.employee_id
            FROM touch_bells b
            INNER JOIN touches t ON t.id = b.touch_id
            WHERE t.practice_id = $1
            "#,
            Some(practice_id.to_string()),
        )
        .await
    }

    async fn list_touches_on_date(&self, date: NaiveDate) -> Result<Vec<Touch>> {
        let touches = self
            .fetch_touches(
                &format!(
                    r#"
                    SELECT {} FROM touches t
                    INNER JOIN practices p ON t.practice_id = p.id
                    WHERE p.date = $1
                    ORDER BY t.touch_number, t.seq
                    "#,
                    TOUCH_COLUMNS
                ),
                r#"
                SELECT b.touch_id, b.slot, b.employee_id
                FROM touch_bells b
                INNER JOIN touches t ON t.id = b.touch_id
                INNER JOIN practices p ON t.practice_id = p.id
                WHERE p.date = $1
                "#,
                Some(format_date(&date)),
            )
            .await?;
        debug!("Fetched {} touches for date {}", touches.len(), format_date(&date));
        Ok(touches)
    }

    async fn get_touch(&self, id: Uuid) -> Result<Option<Touch>> {
        let touches = self
            .fetch_touches(
                &format!("SELECT {} FROM touches t WHERE t.id = $1", TOUCH_COLUMNS),
                "SELECT touch_id, slot, employee_id FROM touch_bells WHERE touch_id = $1",
                Some(id.to_string()),
            )
            .await?;
        Ok(touches.into_iter().next())
    }

    async fn create_touch(&self, fields: TouchFields) -> Result<Touch> {
        let mut tx = self.pool.begin().await?;
        check_touch(&mut tx, &fields, None).await?;

        let touch = Touch::from_fields(Uuid::new_v4(), fields);
        sqlx::query(
            r#"
            INSERT INTO touches (id, practice_id, method_id, touch_number, conductor_id, bell_slots)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(touch.id.to_string())
        .bind(touch.practice_id.to_string())
        .bind(touch.method_id.to_string())
        .bind(i64::from(touch.touch_number))
        .bind(touch.conductor_id.map(|id| id.to_string()))
        .bind(touch.bells.len() as i64)
        .execute(&mut *tx)
        .await?;
        replace_bells(&mut tx, touch.id, &touch.bells).await?;
        tx.commit().await?;

        info!(
            "Added touch {} (#{} in practice {})",
            touch.id, touch.touch_number, touch.practice_id
        );
        Ok(touch)
    }

    async fn update_touch(&self, id: Uuid, fields: TouchFields) -> Result<Touch> {
        let mut tx = self.pool.begin().await?;

        if !row_exists(&mut tx, TOUCH_EXISTS, id).await? {
            return Err(validation::not_found("touch", id));
        }
        check_touch(&mut tx, &fields, Some(id)).await?;

        let touch = Touch::from_fields(id, fields);
        sqlx::query(
            r#"
            UPDATE touches
            SET practice_id = $1, method_id = $2, touch_number = $3, conductor_id = $4,
                bell_slots = $5
            WHERE id = $6
            "#,
        )
        .bind(touch.practice_id.to_string())
        .bind(touch.method_id.to_string())
        .bind(i64::from(touch.touch_number))
        .bind(touch.conductor_id.map(|id| id.to_string()))
        .bind(touch.bells.len() as i64)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
        replace_bells(&mut tx, id, &touch.bells).await?;
        tx.commit().await?;

        info!("Updated touch {}", id);
        Ok(touch)
    }

    async fn delete_touch(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM touch_bells WHERE touch_id = $1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM touches WHERE id = $1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(validation::not_found("touch", id));
        }
        tx.commit().await?;

        info!("Deleted touch {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secret;
    use crate::models::{Location, Resident};

    async fn memory_store() -> SqlStore {
        install_default_drivers();
        // One connection: each in-memory connection is its own database
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        SqlStore::from_pool(pool, Dialect::Sqlite)
            .await
            .expect("schema")
    }

    #[tokio::test]
    async fn test_init_schema_is_idempotent() {
        let store = memory_store().await;
        init_schema(store.pool(), store.dialect()).await.unwrap();
        init_schema(store.pool(), store.dialect()).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(store.pool())
        .await
        .unwrap();
        assert_eq!(
            tables,
            vec!["employees", "methods", "practices", "touch_bells", "touches"]
        );
    }

    #[tokio::test]
    async fn test_trailing_empty_slots_round_trip() {
        let store = memory_store().await;
        let ringer = store
            .create_employee(EmployeeFields {
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                member: true,
                resident: Resident::Local,
            })
            .await
            .unwrap();
        let practice = store
            .create_practice(PracticeFields {
                date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                location: Location::OfficeA,
            })
            .await
            .unwrap();
        let method = store
            .create_method(MethodFields {
                name: "Plain Bob".into(),
                code: Some("PB".into()),
            })
            .await
            .unwrap();

        let mut bells = vec![None; 12];
        bells[3] = Some(ringer.id);
        let touch = store
            .create_touch(TouchFields {
                practice_id: practice.id,
                method_id: method.id,
                touch_number: 1,
                conductor_id: Some(ringer.id),
                bells,
            })
            .await
            .unwrap();

        let loaded = store.get_touch(touch.id).await.unwrap().unwrap();
        assert_eq!(loaded, touch);
        assert_eq!(loaded.bells.len(), 12);
        assert_eq!(loaded.bells[3], Some(ringer.id));
    }

    #[tokio::test]
    async fn test_schema_rejects_duplicate_number_directly() {
        // The constraint backs up the pre-insert check when writers race
        let store = memory_store().await;
        let statements = [
            "INSERT INTO practices (id, date, location) VALUES ('p', '01-06-2024', 'Remote')",
            "INSERT INTO methods (id, name) VALUES ('m', 'Plain Bob')",
            "INSERT INTO touches (id, practice_id, method_id, touch_number) \
             VALUES ('a', 'p', 'm', 1)",
        ];
        for sql in statements {
            sqlx::query(sql).execute(store.pool()).await.unwrap();
        }

        let err: Error = sqlx::query(
            "INSERT INTO touches (id, practice_id, method_id, touch_number) \
             VALUES ('b', 'p', 'm', 1)",
        )
        .execute(store.pool())
        .await
        .unwrap_err()
        .into();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_connect_without_url_is_config_error() {
        let config = StorageConfig {
            use_relational: true,
            ..StorageConfig::default()
        };
        let result = SqlStore::connect(&config).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_dialect_from_url() {
        assert_eq!(Dialect::from_url("sqlite::memory:").unwrap(), Dialect::Sqlite);
        assert_eq!(Dialect::from_url("sqlite://data/peal.db").unwrap(), Dialect::Sqlite);
        assert_eq!(
            Dialect::from_url("postgres://u:p@db.example.net/peal").unwrap(),
            Dialect::Postgres
        );
        assert_eq!(
            Dialect::from_url("PostgreSQL://db.example.net/peal").unwrap(),
            Dialect::Postgres
        );

        match Dialect::from_url("mysql://u:hunter2@db/peal") {
            Err(Error::Config(msg)) => assert!(!msg.contains("hunter2")),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_sqlite_urls_open_read_write_create() {
        assert_eq!(
            sqlite_create_if_missing("sqlite://data/peal.db"),
            "sqlite://data/peal.db?mode=rwc"
        );
        assert_eq!(
            sqlite_create_if_missing("sqlite://peal.db?cache=shared"),
            "sqlite://peal.db?cache=shared&mode=rwc"
        );
        assert_eq!(
            sqlite_create_if_missing("sqlite://peal.db?mode=ro"),
            "sqlite://peal.db?mode=ro"
        );
        assert_eq!(sqlite_create_if_missing("sqlite::memory:"), "sqlite::memory:");
    }

    #[tokio::test]
    async fn test_connect_creates_sqlite_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("peal.db");
        let config = StorageConfig {
            use_relational: true,
            database_url: Some(Secret::new(format!("sqlite://{}", path.display()))),
            ..StorageConfig::default()
        };

        let store = SqlStore::connect(&config).await.unwrap();
        assert_eq!(store.dialect(), Dialect::Sqlite);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_unreachable_postgres_is_backend_unavailable() {
        // Nothing listens on port 1; the acquire timeout bounds the attempt
        let config = StorageConfig {
            use_relational: true,
            database_host: Some(Secret::new("127.0.0.1")),
            database_port: Some(1),
            database_name: Some(Secret::new("peal")),
            database_role: Some(Secret::new("ringer")),
            database_password: Some(Secret::new("hunter2")),
            pool_min_connections: 0,
            pool_max_connections: 1,
            acquire_timeout_ms: 500,
            ..StorageConfig::default()
        };

        match SqlStore::connect(&config).await {
            Err(Error::BackendUnavailable(msg)) => {
                assert!(!msg.contains("hunter2"));
                assert!(!msg.contains("ringer"));
            }
            Err(other) => panic!("expected backend unavailable, got {:?}", other),
            Ok(_) => panic!("connected to a closed port"),
        }
    }
}
