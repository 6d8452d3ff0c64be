// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use crate::codec::{FieldType, Value};

/// A single named, typed slot inside a [`super::RecordDef`].
#[derive(Clone, Debug)]
pub struct FieldDef {
    pub name: &'static str,
    pub ty: FieldType,
    pub default: Option<Value>,
}

impl FieldDef {
    pub const fn new(name: &'static str, ty: FieldType) -> Self {
        Self { name, ty, default: None }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn default_value(&self) -> Value {
        self.default.clone().unwrap_or_else(|| self.ty.default_value())
    }
}

/// An element type usable inside a [`super::ArrayDef`].
#[derive(Clone, Debug)]
pub enum ElementKind {
    Primitive(FieldType),
    Record(Arc<super::RecordDef>),
    /// A record element that is nominally presence-bit-wrapped everywhere
    /// else, but inside an array the bit is always skipped (see §4.2):
    /// every array slot is a plain, present record.
    PresenceBitRecord(Arc<super::RecordDef>),
}
