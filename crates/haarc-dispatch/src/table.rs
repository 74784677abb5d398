//! Dispatch table: range registration at startup, lock-free routing afterwards

use crate::catalog;
use haarc_core::{Error, OperationCode, Priority, Result};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::{debug, info};

/// Handler identifier - cheaply cloneable
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct HandlerRef(Arc<str>);

impl HandlerRef {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Arc::from(s.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HandlerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for HandlerRef {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for HandlerRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<HandlerRef> for String {
    fn from(h: HandlerRef) -> Self {
        h.0.to_string()
    }
}

/// Result of routing one code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub handler: HandlerRef,
    pub priority: Priority,
}

#[derive(Clone, Debug)]
struct Binding {
    start: u32,
    end: u32,
    route: Route,
}

impl Binding {
    fn range(&self) -> RangeInclusive<u32> {
        self.start..=self.end
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects range bindings during startup configuration.
pub struct DispatchTableBuilder {
    bindings: Vec<Binding>,
    default_handler: HandlerRef,
}

impl DispatchTableBuilder {
    pub fn new(default_handler: impl Into<HandlerRef>) -> Self {
        Self {
            bindings: Vec::new(),
            default_handler: default_handler.into(),
        }
    }

    /// Bind `range` to `handler`. Fails with `RangeOverlap` if any code in the
    /// range is already bound, whatever order the ranges were registered in.
    pub fn register(
        &mut self,
        range: RangeInclusive<u32>,
        handler: impl Into<HandlerRef>,
        default_priority: Priority,
    ) -> Result<()> {
        let (start, end) = (*range.start(), *range.end());
        if start > end {
            return Err(Error::config(format!(
                "empty code range {start:#X}..={end:#X}"
            )));
        }
        if let Some(existing) = self
            .bindings
            .iter()
            .find(|b| start <= b.end && b.start <= end)
        {
            return Err(Error::RangeOverlap {
                new: range,
                existing: existing.range(),
            });
        }

        let handler = handler.into();
        debug!(
            "Registered {:#X}..={:#X} -> {} ({})",
            start, end, handler, default_priority
        );
        self.bindings.push(Binding {
            start,
            end,
            route: Route {
                handler,
                priority: default_priority,
            },
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Freeze the bindings. The table cannot be changed afterwards.
    pub fn build(mut self) -> DispatchTable {
        self.bindings.sort_by_key(|b| b.start);
        info!(
            "Dispatch table built: {} ranges, default handler {}",
            self.bindings.len(),
            self.default_handler
        );
        DispatchTable {
            bindings: self.bindings,
            default_route: Route {
                handler: self.default_handler,
                priority: Priority::LOWEST,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Immutable routing table. Share it as `Arc<DispatchTable>`.
#[derive(Debug)]
pub struct DispatchTable {
    /// Sorted by start, non-overlapping
    bindings: Vec<Binding>,
    default_route: Route,
}

impl DispatchTable {
    /// Route a code. O(log n) in the number of ranges; never fails.
    pub fn route(&self, code: OperationCode) -> Route {
        self.lookup(code.value())
            .unwrap_or(&self.default_route)
            .clone()
    }

    /// True when `code` falls inside a registered range.
    pub fn is_bound(&self, code: OperationCode) -> bool {
        self.lookup(code.value()).is_some()
    }

    fn lookup(&self, code: u32) -> Option<&Route> {
        let idx = self.bindings.partition_point(|b| b.start <= code);
        let candidate = self.bindings.get(idx.checked_sub(1)?)?;
        (code <= candidate.end).then_some(&candidate.route)
    }

    pub fn default_route(&self) -> &Route {
        &self.default_route
    }

    /// Registered ranges in ascending order.
    pub fn ranges(&self) -> impl Iterator<Item = (RangeInclusive<u32>, &Route)> {
        self.bindings.iter().map(|b| (b.range(), &b.route))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Build from config. An empty route list means the built-in primitive catalog.
    pub fn from_config(config: &DispatchConfig) -> Result<Self> {
        if config.routes.is_empty() {
            return catalog::default_table(config.default_handler.as_str());
        }
        let mut builder = DispatchTableBuilder::new(config.default_handler.as_str());
        for entry in &config.routes {
            builder.register(entry.start..=entry.end, entry.handler.as_str(), entry.priority)?;
        }
        Ok(builder.build())
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Handler for codes outside every registered range.
    pub default_handler: String,
    /// Explicit bindings. Leave empty for the built-in catalog.
    pub routes: Vec<RouteEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub start: u32,
    pub end: u32,
    pub handler: String,
    pub priority: Priority,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_handler: "passive".into(),
            routes: Vec::new(),
        }
    }
}
