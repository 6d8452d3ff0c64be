// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Composite record model (C2): fields, ordered records, presence-bit
//! wrapping, and length-prefixed arrays.

pub mod array;
pub mod field;
pub mod presence;
#[allow(clippy::module_inception)]
pub mod record;

pub use array::{ArrayDef, ArrayValue, LengthPrefix, decode_array, encode_array};
pub use field::{ElementKind, FieldDef};
pub use presence::{decode_presence, encode_presence};
pub use record::{Record, RecordDef};
