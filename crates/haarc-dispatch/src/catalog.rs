//! Built-in primitive catalog
//!
//! 32 operation primitives in 8 categories. Each category owns a 16-code
//! block of the Private Use Area starting at U+E000; primitives sit at
//! offsets 1..=4 of their block.

use crate::table::{DispatchTable, DispatchTableBuilder};
use haarc_core::{OperationCode, Priority, Result};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Codes covered by the catalog.
pub const PUA_BLOCK: RangeInclusive<u32> = 0xE000..=0xE07F;

const BLOCK_WIDTH: u32 = 0x10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Crud,
    Communication,
    Control,
    Network,
    Security,
    Resource,
    State,
    Coordination,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Crud,
        Category::Communication,
        Category::Control,
        Category::Network,
        Category::Security,
        Category::Resource,
        Category::State,
        Category::Coordination,
    ];

    fn ordinal(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Crud => "crud",
            Self::Communication => "communication",
            Self::Control => "control",
            Self::Network => "network",
            Self::Security => "security",
            Self::Resource => "resource",
            Self::State => "state",
            Self::Coordination => "coordination",
        }
    }

    pub fn range(self) -> RangeInclusive<u32> {
        let start = PUA_BLOCK.start() + self.ordinal() * BLOCK_WIDTH;
        start..=start + BLOCK_WIDTH - 1
    }

    pub fn default_priority(self) -> Priority {
        match self {
            Self::Security => Priority::Critical,
            Self::Network => Priority::High,
            Self::Crud | Self::Communication | Self::Resource => Priority::Normal,
            Self::Control | Self::State | Self::Coordination => Priority::Low,
        }
    }

    pub fn of_code(code: OperationCode) -> Option<Category> {
        let v = code.value();
        if !PUA_BLOCK.contains(&v) {
            return None;
        }
        let idx = ((v - PUA_BLOCK.start()) / BLOCK_WIDTH) as usize;
        Self::ALL.get(idx).copied()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Primitive {
    Create,
    Read,
    Update,
    Delete,
    Send,
    Receive,
    Transform,
    Validate,
    Branch,
    Loop,
    Return,
    Call,
    Connect,
    Disconnect,
    Route,
    Filter,
    Authenticate,
    Authorize,
    Encrypt,
    Decrypt,
    Allocate,
    Deallocate,
    Lock,
    Unlock,
    Save,
    Restore,
    Checkpoint,
    Rollback,
    Coordinate,
    Synchronize,
    Signal,
    Wait,
}

const NAMES: [&str; 32] = [
    "CREATE", "READ", "UPDATE", "DELETE",
    "SEND", "RECEIVE", "TRANSFORM", "VALIDATE",
    "BRANCH", "LOOP", "RETURN", "CALL",
    "CONNECT", "DISCONNECT", "ROUTE", "FILTER",
    "AUTHENTICATE", "AUTHORIZE", "ENCRYPT", "DECRYPT",
    "ALLOCATE", "DEALLOCATE", "LOCK", "UNLOCK",
    "SAVE", "RESTORE", "CHECKPOINT", "ROLLBACK",
    "COORDINATE", "SYNCHRONIZE", "SIGNAL", "WAIT",
];

impl Primitive {
    pub const ALL: [Primitive; 32] = [
        Primitive::Create,
        Primitive::Read,
        Primitive::Update,
        Primitive::Delete,
        Primitive::Send,
        Primitive::Receive,
        Primitive::Transform,
        Primitive::Validate,
        Primitive::Branch,
        Primitive::Loop,
        Primitive::Return,
        Primitive::Call,
        Primitive::Connect,
        Primitive::Disconnect,
        Primitive::Route,
        Primitive::Filter,
        Primitive::Authenticate,
        Primitive::Authorize,
        Primitive::Encrypt,
        Primitive::Decrypt,
        Primitive::Allocate,
        Primitive::Deallocate,
        Primitive::Lock,
        Primitive::Unlock,
        Primitive::Save,
        Primitive::Restore,
        Primitive::Checkpoint,
        Primitive::Rollback,
        Primitive::Coordinate,
        Primitive::Synchronize,
        Primitive::Signal,
        Primitive::Wait,
    ];

    fn ordinal(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        NAMES[self.ordinal()]
    }

    pub fn category(self) -> Category {
        Category::ALL[self.ordinal() / 4]
    }

    /// E.g. `AUTHENTICATE` -> U+E041.
    pub fn code(self) -> OperationCode {
        let start = *self.category().range().start();
        OperationCode::new(start + 1 + (self.ordinal() % 4) as u32)
    }

    pub fn from_name(name: &str) -> Option<Primitive> {
        NAMES
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name.trim()))
            .map(|i| Self::ALL[i])
    }

    pub fn from_code(code: OperationCode) -> Option<Primitive> {
        let category = Category::of_code(code)?;
        let offset = code.value() - category.range().start();
        if !(1..=4).contains(&offset) {
            return None;
        }
        let base = category.ordinal() as usize * 4;
        Some(Self::ALL[base + offset as usize - 1])
    }
}

impl std::fmt::Display for Primitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One binding per category, handler named after the category.
pub fn default_table(default_handler: &str) -> Result<DispatchTable> {
    let mut builder = DispatchTableBuilder::new(default_handler);
    for category in Category::ALL {
        builder.register(category.range(), category.name(), category.default_priority())?;
    }
    Ok(builder.build())
}
