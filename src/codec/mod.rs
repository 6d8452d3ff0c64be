// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Primitive scalar codec (C1).

pub mod primitive;

pub use primitive::{FieldType, Value};
