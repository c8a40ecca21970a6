//! SQLite-backed settings and workflow store

use super::schema::init_schema;
use crate::workflow::WorkflowDefinition;
use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// A stored workflow, without its nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub node_count: usize,
    pub updated_at: String,
}

/// Key/value settings plus workflow documents, both stored as JSON
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create the database
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        init_schema(&conn)?;
        tracing::debug!(path = %path.display(), "Opened store");

        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Default database path (~/.config/flowcabal/flowcabal.db)
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;
        Ok(config_dir.join("flowcabal").join("flowcabal.db"))
    }

    /// Read a setting, or `default` if it was never saved
    pub fn load<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Stored value for `key`, or `None` if the key has never been saved
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;

        raw.map(|raw| {
            serde_json::from_str(&raw)
                .with_context(|| format!("Setting '{}' holds invalid JSON", key))
        })
        .transpose()
    }

    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        let now = chrono::Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            (key, &raw, &now),
        )?;

        Ok(())
    }

    /// Returns false if the key did not exist
    pub fn delete_setting(&self, key: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM settings WHERE key = ?1", [key])?;
        Ok(removed > 0)
    }

    /// Insert or replace a workflow document
    pub fn save_workflow(&self, workflow: &WorkflowDefinition) -> Result<()> {
        let document = serde_json::to_string(workflow)?;
        let now = chrono::Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT INTO workflows (id, name, document, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                document = excluded.document,
                updated_at = excluded.updated_at",
            (&workflow.id, &workflow.name, &document, &now, &now),
        )?;

        tracing::debug!(workflow = %workflow.id, nodes = workflow.nodes.len(), "Saved workflow");
        Ok(())
    }

    pub fn load_workflow(&self, id: &str) -> Result<Option<WorkflowDefinition>> {
        let document: Option<String> = self
            .conn
            .query_row("SELECT document FROM workflows WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?;

        document
            .map(|doc| {
                serde_json::from_str(&doc)
                    .with_context(|| format!("Stored workflow '{}' is corrupt", id))
            })
            .transpose()
    }

    /// All stored workflows, most recently updated first
    pub fn list_workflows(&self) -> Result<Vec<WorkflowSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, document, updated_at
             FROM workflows
             ORDER BY updated_at DESC, name ASC",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, name, document, updated_at)| {
                let workflow: WorkflowDefinition = serde_json::from_str(&document)
                    .with_context(|| format!("Stored workflow '{}' is corrupt", id))?;
                Ok(WorkflowSummary {
                    id,
                    name,
                    node_count: workflow.nodes.len(),
                    updated_at,
                })
            })
            .collect()
    }

    /// Returns false if no workflow had that id
    pub fn delete_workflow(&self, id: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM workflows WHERE id = ?1", [id])?;
        Ok(removed > 0)
    }
}
