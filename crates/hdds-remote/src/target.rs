// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Invocation targets and target selectors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a remote component interface, supplied per call.
///
/// Textual form: `module/component!interface`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationTarget {
    pub module: String,
    pub component: String,
    pub interface: String,
}

impl InvocationTarget {
    pub fn new(
        module: impl Into<String>,
        component: impl Into<String>,
        interface: impl Into<String>,
    ) -> Self {
        Self {
            module: module.into(),
            component: component.into(),
            interface: interface.into(),
        }
    }
}

impl fmt::Display for InvocationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}!{}", self.module, self.component, self.interface)
    }
}

/// Error parsing an [`InvocationTarget`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid target '{0}' (expected module/component!interface)")]
pub struct ParseTargetError(String);

impl FromStr for InvocationTarget {
    type Err = ParseTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, interface) = match s.split_once('!') {
            Some((path, interface)) => (path, interface),
            None => (s, ""),
        };
        let (module, component) = path
            .split_once('/')
            .ok_or_else(|| ParseTargetError(s.to_string()))?;

        if module.is_empty() || component.is_empty() || component.contains('/') {
            return Err(ParseTargetError(s.to_string()));
        }

        Ok(Self::new(module, component, interface))
    }
}

/// Pattern over invocation targets claimed by a receiver.
///
/// Each field supports `*` and `?` globs. `component` and `interface`
/// default to `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetSelector {
    pub module: String,

    #[serde(default = "wildcard")]
    pub component: String,

    #[serde(default = "wildcard")]
    pub interface: String,
}

fn wildcard() -> String {
    "*".to_string()
}

impl TargetSelector {
    /// Select every component of a module.
    pub fn module(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            component: wildcard(),
            interface: wildcard(),
        }
    }

    /// Restrict to a component.
    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = component.into();
        self
    }

    /// Restrict to an interface.
    pub fn interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = interface.into();
        self
    }

    /// Check if a target matches this selector.
    pub fn matches(&self, target: &InvocationTarget) -> bool {
        glob_match(&self.module, &target.module)
            && glob_match(&self.component, &target.component)
            && glob_match(&self.interface, &target.interface)
    }
}

impl fmt::Display for TargetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}!{}", self.module, self.component, self.interface)
    }
}

/// Simple glob matching (supports * and ?).
///
/// Iterative with single-star backtracking, linear in practice and
/// O(pattern * text) in the worst case.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0, 0);
    // Last `*` seen and the text position it currently absorbs up to.
    let mut star: Option<(usize, usize)> = None;

    while ti < text.len() {
        match pattern.get(pi) {
            Some('*') => {
                star = Some((pi, ti));
                pi += 1;
            }
            Some(&c) if c == '?' || c == text[ti] => {
                pi += 1;
                ti += 1;
            }
            _ => match star {
                Some((star_pi, star_ti)) => {
                    pi = star_pi + 1;
                    ti = star_ti + 1;
                    star = Some((star_pi, star_ti + 1));
                }
                None => return false,
            },
        }
    }

    pattern[pi..].iter().all(|&c| c == '*')
}
