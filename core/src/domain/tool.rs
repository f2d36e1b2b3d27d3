// SPDX-License-Identifier: MIT
//! The catalog data model: tool definitions, parameter specs, runner
//! candidates. These are plain value objects produced by the catalog loader
//! and never mutated after a tool is registered.

use std::collections::BTreeMap;
use std::time::Duration;

/// A named, templated shell command exposed to MCP clients.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub params: BTreeMap<String, ParameterSpec>,
    pub command: String,
    pub output: Option<OutputSpec>,
    pub runners: Vec<RunnerCandidate>,
    pub constraints: Vec<String>,
    pub env: Vec<EnvEntry>,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Number,
    Integer,
    Boolean,
}

/// A scalar parameter value, after kind coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    String(String),
    Number(f64),
    Integer(i64),
    Boolean(bool),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::String(_) => ParamKind::String,
            ParamValue::Number(_) => ParamKind::Number,
            ParamValue::Integer(_) => ParamKind::Integer,
            ParamValue::Boolean(_) => ParamKind::Boolean,
        }
    }

    /// Render as the string a shell template substitution should see.
    pub fn as_template_str(&self) -> String {
        match self {
            ParamValue::String(s) => s.clone(),
            ParamValue::Number(n) => {
                if n.fract() == 0.0 {
                    format!("{n:.0}")
                } else {
                    n.to_string()
                }
            }
            ParamValue::Integer(i) => i.to_string(),
            ParamValue::Boolean(b) => b.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub kind: ParamKind,
    pub description: String,
    pub required: bool,
    pub default: Option<ParamValue>,
}

impl ParameterSpec {
    /// A default, if present, makes the parameter effectively optional
    /// regardless of the declared `required` flag (§3 invariant).
    pub fn is_effectively_required(&self) -> bool {
        self.required && self.default.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct OutputSpec {
    pub prefix: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Clone)]
pub enum EnvEntry {
    /// Bare `NAME`: inherit from the host process if set.
    Inherit(String),
    /// `NAME=<template>`: define with template expansion.
    Define { name: String, template: String },
}

impl EnvEntry {
    pub fn name(&self) -> &str {
        match self {
            EnvEntry::Inherit(name) => name,
            EnvEntry::Define { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Requirements {
    pub executables: Vec<String>,
    pub os: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RunnerCandidate {
    pub kind: RunnerKind,
    pub requirements: Requirements,
    pub options: RunnerOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunnerKind {
    #[default]
    Exec,
    LinuxJail,
    MacSandbox,
    Container,
}

/// Validated, typed options for a runner candidate. Built once at
/// handler-construction time from the catalog's untyped options bag — the
/// untyped map never survives past that point (§9 Design Notes).
#[derive(Debug, Clone, Default)]
pub struct RunnerOptions {
    // linux-jail / mac-sandbox
    pub profile: Option<String>,
    pub allow_networking: Option<bool>,
    pub allowed_paths: Vec<String>,
    // container
    pub image: Option<String>,
    pub user: Option<String>,
    pub workdir: Option<String>,
    pub mounts: Vec<String>,
    pub network: Option<String>,
    pub memory: Option<String>,
    pub memory_swap: Option<String>,
    pub memory_swappiness: i64,
    pub cap_add: Vec<String>,
    pub cap_drop: Vec<String>,
    pub dns: Vec<String>,
    pub dns_search: Vec<String>,
    pub platform: Option<String>,
    pub prepare_command: Option<String>,
    pub docker_run_opts: Option<String>,
}

/// Reserved option keys a caller's argument map must never be able to
/// inject into a runner configuration (§4.3 security invariant).
pub const RESERVED_OPTION_KEYS: &[&str] = &[
    "profile",
    "allow_networking",
    "allowed_paths",
    "image",
    "user",
    "workdir",
    "mounts",
    "network",
    "memory",
    "memory_swap",
    "memory_swappiness",
    "cap_add",
    "cap_drop",
    "dns",
    "dns_search",
    "platform",
    "prepare_command",
    "docker_run_opts",
];
