//! Declarative application manifests.
//!
//! An application without Rust code behind it is described by a TOML file in
//! the applications directory:
//!
//! ```toml
//! id = "quiz"
//! allow_launching = true
//! autostart = true
//! version = "2024-01-01T00:00:00Z"
//!
//! [pages.main]
//! file = "index.html"
//! title = "Quiz"
//!
//! [methods.ping]
//! kind = "reply"
//! value = "pong"
//!
//! [listeners.answer]
//! target = "all"
//! emit = "answer-received"
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{RuntimeError, RuntimeResult};
use crate::runner::{
    ApplicationDescriptor, ApplicationHandler, EventContext, InvocationContext, Page,
};

/// One application as declared on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationManifest {
    pub id: String,

    #[serde(default = "default_true")]
    pub allow_launching: bool,

    /// Launch when the server starts.
    #[serde(default)]
    pub autostart: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<DateTime<Utc>>,

    #[serde(default)]
    pub pages: BTreeMap<String, PageManifest>,

    #[serde(default)]
    pub methods: BTreeMap<String, MethodSpec>,

    #[serde(default)]
    pub listeners: BTreeMap<String, ListenerSpec>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageManifest {
    pub file: String,
    #[serde(default)]
    pub title: String,
}

/// Behaviour of a declared server method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MethodSpec {
    /// Always return `value`.
    Reply { value: Value },
    /// Return the decoded arguments as an array.
    Echo,
    /// Emit `event` to every page with the call's arguments; returns null.
    Emit { event: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerTarget {
    /// The page that triggered the event.
    #[default]
    Page,
    All,
}

/// Forward a client-triggered event back out as a server event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerSpec {
    #[serde(default)]
    pub target: ListenerTarget,
    /// Name of the forwarded event. Defaults to the triggering event's name.
    #[serde(default)]
    pub emit: Option<String>,
}

impl ApplicationManifest {
    /// Parse a manifest from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(text).context("parsing application manifest")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> RuntimeResult<()> {
        if self.id.is_empty() {
            return Err(RuntimeError::invalid_argument("application id must not be empty"));
        }
        for page in self.pages() {
            page.validate()?;
        }
        for (name, method) in &self.methods {
            if let MethodSpec::Emit { event } = method
                && event.is_empty()
            {
                return Err(RuntimeError::invalid_argument(format!(
                    "method {name} of {} emits an unnamed event",
                    self.id
                )));
            }
        }
        Ok(())
    }

    pub fn pages(&self) -> Vec<Page> {
        self.pages
            .iter()
            .map(|(id, page)| Page::new(id, &page.file, &page.title))
            .collect()
    }

    pub fn descriptor(&self) -> ApplicationDescriptor {
        ApplicationDescriptor {
            application_id: self.id.clone(),
            application_version: self.version,
            pages: self.pages(),
        }
    }
}

/// Load every `*.toml` manifest in `dir`, sorted by file name.
///
/// A missing directory yields no manifests.
pub fn load_manifests(dir: &Path) -> Result<Vec<ApplicationManifest>> {
    if !dir.exists() {
        debug!("Applications directory {:?} does not exist", dir);
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("reading applications directory {:?}", dir))?
    {
        let path = entry.context("reading directory entry")?.path();
        if path.extension().is_some_and(|ext| ext == "toml") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut manifests = Vec::with_capacity(paths.len());
    for path in paths {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading manifest {:?}", path))?;
        let manifest = ApplicationManifest::from_toml(&text)
            .with_context(|| format!("loading manifest {:?}", path))?;
        debug!(application_id = %manifest.id, path = ?path, "loaded manifest");
        manifests.push(manifest);
    }
    Ok(manifests)
}

/// Handler that runs the methods and listeners declared in a manifest.
pub struct ManifestHandler {
    methods: HashMap<String, MethodSpec>,
    listeners: HashMap<String, ListenerSpec>,
}

impl ManifestHandler {
    pub fn new(manifest: &ApplicationManifest) -> Self {
        Self {
            methods: manifest.methods.clone().into_iter().collect(),
            listeners: manifest.listeners.clone().into_iter().collect(),
        }
    }
}

#[async_trait]
impl ApplicationHandler for ManifestHandler {
    async fn invoke(
        &self,
        ctx: &InvocationContext,
        method: &str,
        args: Vec<Value>,
    ) -> RuntimeResult<Value> {
        let spec = self
            .methods
            .get(method)
            .ok_or_else(|| RuntimeError::UnknownMethod(method.to_string()))?;

        match spec {
            MethodSpec::Reply { value } => Ok(value.clone()),
            MethodSpec::Echo => Ok(Value::Array(args)),
            MethodSpec::Emit { event } => {
                let delivered = ctx.emitter.to_all(event, &args);
                trace!(application_id = %ctx.application_id, event, delivered, "method emitted event");
                Ok(Value::Null)
            }
        }
    }

    async fn handle_event(
        &self,
        ctx: &EventContext,
        event: &str,
        args: Vec<Value>,
    ) -> RuntimeResult<()> {
        let Some(listener) = self.listeners.get(event) else {
            trace!(application_id = %ctx.application_id, event, "no listener for event");
            return Ok(());
        };

        let name = listener.emit.as_deref().unwrap_or(event);
        let delivered = match listener.target {
            ListenerTarget::Page => ctx.emitter.to_page(&ctx.page_id, name, &args),
            ListenerTarget::All => ctx.emitter.to_all(name, &args),
        };
        ctx.log.info(format!(
            "{event} from page {} answered with {name} ({delivered} stream(s))",
            ctx.page_id
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const QUIZ: &str = r#"
id = "quiz"
autostart = true
version = "2024-01-01T00:00:00Z"

[pages.main]
file = "index.html"
title = "Quiz"

[pages.admin]
file = "admin.html"

[methods.ping]
kind = "reply"
value = "pong"

[methods.echo]
kind = "echo"

[methods.announce]
kind = "emit"
event = "announcement"

[listeners.answer]
emit = "answer-received"

[listeners.cheer]
target = "all"
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = ApplicationManifest::from_toml(QUIZ).unwrap();
        assert_eq!(manifest.id, "quiz");
        assert!(manifest.allow_launching);
        assert!(manifest.autostart);
        assert_eq!(
            manifest.version.unwrap().to_rfc3339(),
            "2024-01-01T00:00:00+00:00"
        );

        let pages = manifest.pages();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0], Page::new("admin", "admin.html", ""));
        assert_eq!(pages[1], Page::new("main", "index.html", "Quiz"));

        assert_eq!(
            manifest.methods["ping"],
            MethodSpec::Reply {
                value: Value::from("pong")
            }
        );
        assert_eq!(manifest.listeners["answer"].target, ListenerTarget::Page);
        assert_eq!(manifest.listeners["cheer"].target, ListenerTarget::All);
    }

    #[test]
    fn test_minimal_manifest_defaults() {
        let manifest = ApplicationManifest::from_toml(r#"id = "bare""#).unwrap();
        assert!(manifest.allow_launching);
        assert!(!manifest.autostart);
        assert!(manifest.version.is_none());
        assert!(manifest.pages.is_empty());
    }

    #[test]
    fn test_invalid_manifests_are_rejected() {
        assert!(ApplicationManifest::from_toml(r#"id = """#).is_err());
        assert!(
            ApplicationManifest::from_toml(
                r#"
id = "x"
[pages.main]
file = ""
"#
            )
            .is_err()
        );
        assert!(
            ApplicationManifest::from_toml(
                r#"
id = "x"
[methods.go]
kind = "teleport"
"#
            )
            .is_err()
        );
    }

    #[test]
    fn test_load_manifests_from_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.toml"), QUIZ).unwrap();
        fs::write(dir.path().join("a.toml"), r#"id = "alpha""#).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let manifests = load_manifests(dir.path()).unwrap();
        let ids: Vec<_> = manifests.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "quiz"]);
    }

    #[test]
    fn test_load_manifests_missing_directory() {
        let dir = TempDir::new().unwrap();
        let manifests = load_manifests(&dir.path().join("nope")).unwrap();
        assert!(manifests.is_empty());
    }

    #[test]
    fn test_load_manifests_reports_bad_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.toml"), "id = ").unwrap();
        let err = load_manifests(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("broken.toml"));
    }
}
