//! Boundary contracts with the embedding application
//!
//! The engine never touches the scene, the clock, or the filesystem directly:
//! the [`Host`] answers waits and receives output, and its [`DataStore`] is the
//! property and predicate oracle used by selections and store assignments.

use super::types::{Domain, ItemProperty, ItemSet, Script, Value};
use chrono::{DateTime, Utc};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::rc::Rc;
use tracing::{debug, info};
use uuid::Uuid;

/* ===================== Data Store ===================== */

/// Property/predicate oracle over the particle and bond domains
pub trait DataStore {
    /// Number of items in a domain; sizes full and complemented sets
    fn item_count(&self, domain: Domain) -> usize;

    /// Value of one property for one item, `None` if the property is unknown
    fn property(&self, domain: Domain, property: &ItemProperty, index: usize) -> Option<Value>;

    /// Apply a value to a property over every item of a set
    fn set_property(
        &mut self,
        set: &ItemSet,
        property: &ItemProperty,
        value: &Value,
    ) -> Result<(), String>;

    /// Full-domain set for a named predicate (`water`, `hetero`, element names)
    fn named_set(&self, name: &str) -> Option<ItemSet>;

    /// Contiguous index range holding every item whose property equals `value`
    ///
    /// Only asked for integral identities (model, file, symop); `None` falls back
    /// to a per-item scan.
    fn item_range(&self, _property: &ItemProperty, _value: &Value) -> Option<Range<usize>> {
        None
    }

    /// Atoms within `distance` of any atom in `atoms`
    fn within(&self, distance: f64, atoms: &RoaringBitmap) -> RoaringBitmap;

    /// Atoms bonded to any atom in `atoms`
    fn connected(&self, atoms: &RoaringBitmap) -> RoaringBitmap;

    /// Bonds touching any atom in `atoms`
    fn bonds_of(&self, atoms: &RoaringBitmap) -> RoaringBitmap;
}

/* ===================== Waits ===================== */

/// What a suspended statement is waiting for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum WaitKind {
    Delay { seconds: f64 },
    Pause { message: String },
    Load { path: String },
}

/// A wait issued to the host, correlated by `key`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitRequest {
    pub key: Uuid,
    pub kind: WaitKind,
    pub requested_at: DateTime<Utc>,
    /// Variable receiving the completion value
    pub target: Option<String>,
}

impl WaitRequest {
    pub fn new(kind: WaitKind) -> Self {
        Self {
            key: Uuid::new_v4(),
            kind,
            requested_at: Utc::now(),
            target: None,
        }
    }

    pub fn with_target(mut self, target: Option<String>) -> Self {
        self.target = target;
        self
    }
}

/// Outcome of a wait, delivered on resume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Completion {
    Done(Value),
    Failed(String),
}

/* ===================== Batches ===================== */

/// Statements collected from `process` blocks for the host to run as a batch
#[derive(Debug, Clone)]
pub struct Batch {
    pub function: String,
    pub scripts: Vec<Rc<Script>>,
}

/* ===================== Host ===================== */

/// The embedding application
pub trait Host {
    fn store(&self) -> &dyn DataStore;

    fn store_mut(&mut self) -> &mut dyn DataStore;

    /// Receives `print` output
    fn output(&mut self, text: &str) {
        info!(target: "molscript::print", "{}", text);
    }

    /// Whether `wait` may block the calling thread
    fn can_block(&self) -> bool {
        true
    }

    /// Block until the wait completes; only called when blocking is allowed
    fn wait(&mut self, request: &WaitRequest) -> Completion;

    /// Run statements collected from a parallel function's `process` blocks
    fn run_batch(&mut self, batch: Batch) -> Result<(), String> {
        debug!(
            function = %batch.function,
            scripts = batch.scripts.len(),
            "Batch dropped: host has no batch runner"
        );
        Ok(())
    }

    /// Translate a user-visible message
    fn translate(&self, message: &str) -> String {
        message.to_string()
    }
}
