// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

/// Which session kind a [`crate::cfg::config::Config`] describes.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    #[serde(rename = "SoupBinTCP", alias = "soupbintcp", alias = "soup")]
    SoupBinTcp,
    #[serde(rename = "FIX", alias = "fix")]
    Fix,
}
impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionKind::SoupBinTcp => "SoupBinTCP",
            SessionKind::Fix => "FIX",
        })
    }
}

/// What `buffer_until_drained` does with bytes buffered while dispatch
/// was paused: replay them once dispatch resumes, or drop them.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainPolicy {
    #[serde(rename = "Replay", alias = "replay")]
    #[default]
    Replay,
    #[serde(rename = "Discard", alias = "discard")]
    Discard,
}
impl DrainPolicy {
    pub fn discard(self) -> bool {
        matches!(self, DrainPolicy::Discard)
    }
}
