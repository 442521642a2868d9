//! Professor directory backed by the course catalogue

use super::DbPool;
use crate::errors::Result;
use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DbBackend, DbErr, Statement};

const LIST_PROFESSORS_SQL: &str = "SELECT DISTINCT instructor_name FROM trace.course_info";

/// Source of the professor names a client can filter by
#[async_trait]
pub trait ProfessorStore: Send + Sync {
    /// Distinct, non-empty names in ascending order
    async fn list_professors(&self) -> Result<Vec<String>>;

    /// Connectivity check used by `/ready`
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Professor store reading `trace.course_info`
#[derive(Clone)]
pub struct SqlProfessorStore {
    pool: DbPool,
}

impl SqlProfessorStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfessorStore for SqlProfessorStore {
    async fn list_professors(&self) -> Result<Vec<String>> {
        let stmt = Statement::from_string(DbBackend::Postgres, LIST_PROFESSORS_SQL);

        let rows = self.pool.read().query_all(stmt).await?;

        let mut names = Vec::with_capacity(rows.len());
        for row in rows {
            let name: Option<String> = row.try_get_by_index(0).map_err(DbErr::from)?;
            names.extend(name);
        }

        Ok(normalize_names(names))
    }

    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }
}

/// Fixed list of names, for deployments without a catalogue database
pub struct StaticProfessorStore {
    names: Vec<String>,
}

impl StaticProfessorStore {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names: normalize_names(names),
        }
    }
}

#[async_trait]
impl ProfessorStore for StaticProfessorStore {
    async fn list_professors(&self) -> Result<Vec<String>> {
        Ok(self.names.clone())
    }
}

/// Drop blank names, sort, and deduplicate
fn normalize_names(names: Vec<String>) -> Vec<String> {
    let mut names: Vec<String> = names
        .into_iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();
    names.sort();
    names.dedup();
    names
}
