//! JSON file backend
//!
//! The whole dataset lives in one JSON document. An in-memory copy answers
//! reads; each write validates against a scratch copy, writes the full
//! document to a sibling temp file, and renames it over the original before
//! the in-memory copy is replaced. A crash mid-write therefore leaves either
//! the old or the new document on disk, never a truncated one.
//!
//! Edits made to the file by another process after [`JsonStore::open`] are
//! not seen and will be overwritten by the next write (last writer wins).

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::models::{
    Employee, EmployeeFields, Method, MethodFields, Practice, PracticeFields, Touch, TouchFields,
};
use crate::storage::Storage;
use crate::validation;
use crate::{Error, Result};

/// Persisted document layout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub employees: Vec<Employee>,
    #[serde(default)]
    pub practices: Vec<Practice>,
    #[serde(default)]
    pub methods: Vec<Method>,
    #[serde(default)]
    pub touches: Vec<Touch>,
}

impl Dataset {
    fn has_practice(&self, id: Uuid) -> bool {
        self.practices.iter().any(|p| p.id == id)
    }

    fn has_method(&self, id: Uuid) -> bool {
        self.methods.iter().any(|m| m.id == id)
    }

    fn has_employee(&self, id: Uuid) -> bool {
        self.employees.iter().any(|e| e.id == id)
    }

    /// Reference, capacity and numbering checks for a touch write.
    /// `touch_id` is the touch being updated, if any.
    fn check_touch(&self, fields: &TouchFields, touch_id: Option<Uuid>) -> Result<()> {
        validation::touch_shape(fields)?;

        if !self.has_practice(fields.practice_id) {
            return Err(validation::missing_practice(fields.practice_id));
        }
        if !self.has_method(fields.method_id) {
            return Err(validation::missing_method(fields.method_id));
        }
        if let Some(missing) = validation::touch_employee_refs(fields)
            .into_iter()
            .find(|id| !self.has_employee(*id))
        {
            return Err(validation::missing_employee(missing));
        }

        let siblings: Vec<&Touch> = self
            .touches
            .iter()
            .filter(|t| t.practice_id == fields.practice_id && Some(t.id) != touch_id)
            .collect();

        let moving_in = match touch_id {
            Some(id) => self
                .touches
                .iter()
                .find(|t| t.id == id)
                .map_or(true, |t| t.practice_id != fields.practice_id),
            None => true,
        };
        if moving_in {
            validation::touch_capacity(siblings.len())?;
        }

        if siblings.iter().any(|t| t.touch_number == fields.touch_number) {
            return Err(validation::duplicate_touch_number(fields.touch_number));
        }

        Ok(())
    }

    fn sorted_by_number(mut touches: Vec<Touch>) -> Vec<Touch> {
        touches.sort_by_key(|t| t.touch_number);
        touches
    }
}

/// Storage backend over a single JSON file
pub struct JsonStore {
    path: PathBuf,
    data: Mutex<Dataset>,
}

impl JsonStore {
    /// Open the data file, creating an empty document if it does not exist
    pub async fn open(path: &Path) -> Result<Self> {
        let data = match tokio::fs::read(path).await {
            Ok(bytes) => {
                let data: Dataset = serde_json::from_slice(&bytes).map_err(|e| {
                    Error::BackendUnavailable(format!(
                        "data file {} is not a valid document: {}",
                        path.display(),
                        e
                    ))
                })?;
                info!(
                    "Opened data file {} ({} employees, {} practices, {} methods, {} touches)",
                    path.display(),
                    data.employees.len(),
                    data.practices.len(),
                    data.methods.len(),
                    data.touches.len()
                );
                data
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let data = Dataset::default();
                write_document(path, &data).await?;
                info!("Initialized new data file: {}", path.display());
                data
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: path.to_path_buf(),
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read<T>(&self, f: impl FnOnce(&Dataset) -> T) -> T {
        let data = self.data.lock().await;
        f(&data)
    }

    /// Apply `mutate` to a copy, persist it, then publish it.
    /// Nothing changes, in memory or on disk, if `mutate` or the write fails.
    async fn write<T>(&self, mutate: impl FnOnce(&mut Dataset) -> Result<T>) -> Result<T> {
        let mut data = self.data.lock().await;
        let mut next = data.clone();
        let out = mutate(&mut next)?;

        if let Err(e) = write_document(&self.path, &next).await {
            error!("Failed to write data file {}: {}", self.path.display(), e);
            return Err(e);
        }

        *data = next;
        Ok(out)
    }
}

/// Write to `<file>.tmp` and rename over the target
async fn write_document(path: &Path, data: &Dataset) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(data)
        .map_err(|e| Error::BackendUnavailable(format!("failed to encode document: {}", e)))?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    if let Err(e) = replace_with(&tmp_path, path, &bytes).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }

    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Any failure here leaves `tmp_path` for the caller to remove
async fn replace_with(tmp_path: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(tmp_path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(tmp_path, path).await
}

#[async_trait]
impl Storage for JsonStore {
    fn backend_name(&self) -> &'static str {
        "json"
    }

    // ------------------------------------------------------------------
    // Employees
    // ------------------------------------------------------------------

    async fn list_employees(&self) -> Result<Vec<Employee>> {
        Ok(self.read(|d| d.employees.clone()).await)
    }

    async fn get_employee(&self, id: Uuid) -> Result<Option<Employee>> {
        Ok(self
            .read(|d| d.employees.iter().find(|e| e.id == id).cloned())
            .await)
    }

    async fn create_employee(&self, fields: EmployeeFields) -> Result<Employee> {
        let fields = validation::employee(fields)?;
        let employee = Employee::from_fields(Uuid::new_v4(), fields);
        let stored = employee.clone();
        self.write(move |d| {
            d.employees.push(stored);
            Ok(())
        })
        .await?;
        info!("Added employee {} ({})", employee.full_name(), employee.id);
        Ok(employee)
    }

    async fn update_employee(&self, id: Uuid, fields: EmployeeFields) -> Result<Employee> {
        let fields = validation::employee(fields)?;
        let employee = self
            .write(|d| {
                let slot = d
                    .employees
                    .iter_mut()
                    .find(|e| e.id == id)
                    .ok_or_else(|| validation::not_found("employee", id))?;
                *slot = Employee::from_fields(id, fields);
                Ok(slot.clone())
            })
            .await?;
        info!("Updated employee {}", id);
        Ok(employee)
    }

    async fn delete_employee(&self, id: Uuid) -> Result<()> {
        self.write(|d| {
            if !d.has_employee(id) {
                return Err(validation::not_found("employee", id));
            }
            let in_use = d.touches.iter().filter(|t| t.involves(id)).count();
            if in_use > 0 {
                return Err(validation::employee_in_use(id, in_use));
            }
            d.employees.retain(|e| e.id != id);
            Ok(())
        })
        .await?;
        info!("Deleted employee {}", id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Practices
    // ------------------------------------------------------------------

    async fn list_practices(&self) -> Result<Vec<Practice>> {
        Ok(self.read(|d| d.practices.clone()).await)
    }

    async fn get_practice(&self, id: Uuid) -> Result<Option<Practice>> {
        Ok(self
            .read(|d| d.practices.iter().find(|p| p.id == id).cloned())
            .await)
    }

    async fn create_practice(&self, fields: PracticeFields) -> Result<Practice> {
        let practice = Practice::from_fields(Uuid::new_v4(), fields);
        let stored = practice.clone();
        self.write(move |d| {
            d.practices.push(stored);
            Ok(())
        })
        .await?;
        info!("Added practice {} ({})", practice.label(), practice.id);
        Ok(practice)
    }

    async fn update_practice(&self, id: Uuid, fields: PracticeFields) -> Result<Practice> {
        let practice = self
            .write(|d| {
                let slot = d
                    .practices
                    .iter_mut()
                    .find(|p| p.id == id)
                    .ok_or_else(|| validation::not_found("practice", id))?;
                *slot = Practice::from_fields(id, fields);
                Ok(slot.clone())
            })
            .await?;
        info!("Updated practice {}", id);
        Ok(practice)
    }

    async fn delete_practice(&self, id: Uuid) -> Result<()> {
        let removed = self
            .write(|d| {
                if !d.has_practice(id) {
                    return Err(validation::not_found("practice", id));
                }
                let before = d.touches.len();
                d.touches.retain(|t| t.practice_id != id);
                d.practices.retain(|p| p.id != id);
                Ok(before - d.touches.len())
            })
            .await?;
        info!("Deleted practice {} and {} touch(es)", id, removed);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Methods
    // ------------------------------------------------------------------

    async fn list_methods(&self) -> Result<Vec<Method>> {
        Ok(self.read(|d| d.methods.clone()).await)
    }

    async fn get_method(&self, id: Uuid) -> Result<Option<Method>> {
        Ok(self
            .read(|d| d.methods.iter().find(|m| m.id == id).cloned())
            .await)
    }

    async fn create_method(&self, fields: MethodFields) -> Result<Method> {
        let fields = validation::method(fields)?;
        let method = Method::from_fields(Uuid::new_v4(), fields);
        let stored = method.clone();
        self.write(move |d| {
            d.methods.push(stored);
            Ok(())
        })
        .await?;
        info!("Added method {} ({})", method.name, method.id);
        Ok(method)
    }

    async fn update_method(&self, id: Uuid, fields: MethodFields) -> Result<Method> {
        let fields = validation::method(fields)?;
        let method = self
            .write(|d| {
                let slot = d
                    .methods
                    .iter_mut()
                    .find(|m| m.id == id)
                    .ok_or_else(|| validation::not_found("method", id))?;
                *slot = Method::from_fields(id, fields);
                Ok(slot.clone())
            })
            .await?;
        info!("Updated method {}", id);
        Ok(method)
    }

    async fn delete_method(&self, id: Uuid) -> Result<()> {
        self.write(|d| {
            if !d.has_method(id) {
                return Err(validation::not_found("method", id));
            }
            let in_use = d.touches.iter().filter(|t| t.method_id == id).count();
            if in_use > 0 {
                return Err(validation::method_in_use(id, in_use));
            }
            d.methods.retain(|m| m.id != id);
            Ok(())
        })
        .await?;
        info!("Deleted method {}", id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Touches
    // ------------------------------------------------------------------

    async fn list_touches(&self) -> Result<Vec<Touch>> {
        Ok(self.read(|d| d.touches.clone()).await)
    }

    async fn list_touches_for_practice(&self, practice_id: Uuid) -> Result<Vec<Touch>> {
        let touches = self
            .read(|d| {
                d.touches
                    .iter()
                    .filter(|t| t.practice_id == practice_id)
                    .cloned()
                    .collect()
            })
            .await;
        Ok(Dataset::sorted_by_number(touches))
    }

    async fn list_touches_on_date(&self, date: NaiveDate) -> Result<Vec<Touch>> {
        let touches = self
            .read(|d| {
                d.touches
                    .iter()
                    .filter(|t| {
                        d.practices
                            .iter()
                            .any(|p| p.id == t.practice_id && p.date == date)
                    })
                    .cloned()
                    .collect()
            })
            .await;
        Ok(Dataset::sorted_by_number(touches))
    }

    async fn get_touch(&self, id: Uuid) -> Result<Option<Touch>> {
        Ok(self
            .read(|d| d.touches.iter().find(|t| t.id == id).cloned())
            .await)
    }

    async fn create_touch(&self, fields: TouchFields) -> Result<Touch> {
        let touch = self
            .write(|d| {
                d.check_touch(&fields, None)?;
                let touch = Touch::from_fields(Uuid::new_v4(), fields);
                d.touches.push(touch.clone());
                Ok(touch)
            })
            .await?;
        info!(
            "Added touch {} (#{} in practice {})",
            touch.id, touch.touch_number, touch.practice_id
        );
        Ok(touch)
    }

    async fn update_touch(&self, id: Uuid, fields: TouchFields) -> Result<Touch> {
        let touch = self
            .write(|d| {
                if !d.touches.iter().any(|t| t.id == id) {
                    return Err(validation::not_found("touch", id));
                }
                d.check_touch(&fields, Some(id))?;
                let slot = d
                    .touches
                    .iter_mut()
                    .find(|t| t.id == id)
                    .ok_or_else(|| validation::not_found("touch", id))?;
                *slot = Touch::from_fields(id, fields);
                Ok(slot.clone())
            })
            .await?;
        info!("Updated touch {}", id);
        Ok(touch)
    }

    async fn delete_touch(&self, id: Uuid) -> Result<()> {
        self.write(|d| {
            let before = d.touches.len();
            d.touches.retain(|t| t.id != id);
            if d.touches.len() == before {
                return Err(validation::not_found("touch", id));
            }
            Ok(())
        })
        .await?;
        info!("Deleted touch {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Location;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_document_with_all_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("data.json");

        JsonStore::open(&path).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        for key in ["employees", "practices", "methods", "touches"] {
            assert!(raw[key].is_array(), "missing top-level key {}", key);
        }
    }

    #[tokio::test]
    async fn test_failed_write_removes_tmp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        let store = JsonStore::open(&path).await.unwrap();

        // A non-empty directory in place of the document makes the swap fail
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();

        let result = store
            .create_method(MethodFields {
                name: "Grandsire".into(),
                code: None,
            })
            .await;

        assert!(matches!(result, Err(Error::BackendUnavailable(_))));
        assert!(!dir.path().join("data.json.tmp").exists());
        assert!(store.list_methods().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_keys_default_to_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, r#"{"employees": []}"#).unwrap();

        let store = JsonStore::open(&path).await.unwrap();
        assert_eq!(store.path(), path.as_path());
        assert!(store.list_touches().await.unwrap().is_empty());
        assert!(store.list_methods().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = JsonStore::open(&path).await;
        assert!(matches!(result, Err(Error::BackendUnavailable(_))));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[tokio::test]
    async fn test_no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        let store = JsonStore::open(&path).await.unwrap();

        store
            .create_practice(PracticeFields {
                date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                location: Location::Remote,
            })
            .await
            .unwrap();

        assert!(!dir.path().join("data.json.tmp").exists());
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"01-06-2024\""));
        assert!(raw.contains("\"Remote\""));
    }

    #[tokio::test]
    async fn test_failed_write_keeps_memory_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        let store = JsonStore::open(&path).await.unwrap();

        // Removing the directory makes the temp-file create fail
        std::fs::remove_dir_all(dir.path()).unwrap();

        let result = store
            .create_method(MethodFields {
                name: "Plain Bob".into(),
                code: None,
            })
            .await;
        assert!(matches!(result, Err(Error::BackendUnavailable(_))));
        assert!(store.list_methods().await.unwrap().is_empty());
    }
}
