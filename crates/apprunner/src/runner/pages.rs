//! Pages published by an application instance.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::{RuntimeError, RuntimeResult};

/// A page an application serves to embedded clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub file_name: String,
    pub title: String,
}

impl Page {
    pub fn new(id: impl Into<String>, file_name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            file_name: file_name.into(),
            title: title.into(),
        }
    }

    pub fn validate(&self) -> RuntimeResult<()> {
        if self.id.is_empty() {
            return Err(RuntimeError::invalid_argument("page id must not be empty"));
        }
        if self.file_name.is_empty() {
            return Err(RuntimeError::invalid_argument(format!(
                "page {} must name an application file",
                self.id
            )));
        }
        Ok(())
    }
}

/// Page ID -> page. Reads vastly outnumber writes.
#[derive(Debug, Default)]
pub struct PageRegistry {
    pages: RwLock<HashMap<String, Page>>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a page, returning the page it replaced.
    pub fn publish(&self, page: Page) -> RuntimeResult<Option<Page>> {
        page.validate()?;
        let mut pages = self
            .pages
            .write()
            .map_err(|_| RuntimeError::internal("page registry lock poisoned"))?;
        Ok(pages.insert(page.id.clone(), page))
    }

    pub fn unpublish(&self, page_id: &str) -> RuntimeResult<Option<Page>> {
        let mut pages = self
            .pages
            .write()
            .map_err(|_| RuntimeError::internal("page registry lock poisoned"))?;
        Ok(pages.remove(page_id))
    }

    pub fn resolve(&self, page_id: &str) -> RuntimeResult<Option<Page>> {
        let pages = self
            .pages
            .read()
            .map_err(|_| RuntimeError::internal("page registry lock poisoned"))?;
        Ok(pages.get(page_id).cloned())
    }

    /// All pages, sorted by ID.
    pub fn list(&self) -> RuntimeResult<Vec<Page>> {
        let pages = self
            .pages
            .read()
            .map_err(|_| RuntimeError::internal("page registry lock poisoned"))?;
        let mut list: Vec<Page> = pages.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(list)
    }

    pub fn len(&self) -> usize {
        self.pages.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
