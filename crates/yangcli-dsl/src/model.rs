//! The command model: commands and status fields derived from schema data.
//!
//! Built once at startup from the extracted [`SchemaDocument`]s and read-only
//! afterwards. Merging follows a first-wins policy:
//! - a name is registered the first time it is seen (discovery order is kept),
//! - each metadata slot keeps the first value any declaration provides; later
//!   declarations only fill slots that are still empty.

use crate::extract::{RpcDecl, SchemaDocument, StatusLeafDecl};
use serde::{Deserialize, Serialize};

/// How a command's arguments are written on the command line.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ArgStyle {
    /// `key=value` tokens collapsed into a mapping.
    #[default]
    Kv,
    /// Raw tokens passed through unchanged.
    Positional,
}

impl ArgStyle {
    /// Parse a `cli-arg-style` tag. Anything other than `positional` behaves
    /// as key/value.
    pub fn from_tag(tag: &str, rpc: &str) -> Self {
        match tag.trim() {
            "positional" => ArgStyle::Positional,
            "kv" => ArgStyle::Kv,
            other => {
                tracing::warn!(rpc, tag = other, "unknown cli-arg-style; using kv");
                ArgStyle::Kv
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArgStyle::Kv => "kv",
            ArgStyle::Positional => "positional",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RpcCommand {
    pub name: String,
    pub description: Option<String>,
    pub handler: Option<String>,
    pub usage: Option<String>,
    pub arg_style: ArgStyle,
    pub input_params: Vec<String>,
    pub hidden: bool,
}

impl RpcCommand {
    /// Usage template, falling back to the bare command name.
    pub fn usage_or_name(&self) -> &str {
        self.usage.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusField {
    pub name: String,
    pub description: Option<String>,
    pub completions: Vec<String>,
    pub handler: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandModel {
    commands: Vec<RpcCommand>,
    status_fields: Vec<StatusField>,
}

impl CommandModel {
    pub fn from_documents<I>(documents: I) -> Self
    where
        I: IntoIterator<Item = SchemaDocument>,
    {
        let mut rpcs: Vec<RpcDecl> = Vec::new();
        let mut leaves: Vec<StatusLeafDecl> = Vec::new();

        for doc in documents {
            for decl in doc.rpcs {
                match rpcs.iter_mut().find(|r| r.name == decl.name) {
                    Some(existing) => absorb_rpc(existing, decl),
                    None => rpcs.push(decl),
                }
            }
            for decl in doc.status_leaves {
                match leaves.iter_mut().find(|l| l.name == decl.name) {
                    Some(existing) => absorb_leaf(existing, decl),
                    None => leaves.push(decl),
                }
            }
        }

        Self {
            commands: rpcs.into_iter().map(RpcCommand::from).collect(),
            status_fields: leaves.into_iter().map(StatusField::from).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.status_fields.is_empty()
    }

    pub fn commands(&self) -> &[RpcCommand] {
        &self.commands
    }

    pub fn status_fields(&self) -> &[StatusField] {
        &self.status_fields
    }

    pub fn command(&self, name: &str) -> Option<&RpcCommand> {
        self.commands.iter().find(|c| c.name == name)
    }

    pub fn status_field(&self, name: &str) -> Option<&StatusField> {
        self.status_fields.iter().find(|f| f.name == name)
    }

    /// Commands that appear in help listings and top-level completion.
    pub fn visible_commands(&self) -> impl Iterator<Item = &RpcCommand> {
        self.commands.iter().filter(|c| !c.hidden)
    }
}

fn first_wins<T>(slot: &mut Option<T>, later: Option<T>) {
    if slot.is_none() {
        *slot = later;
    }
}

fn absorb_rpc(existing: &mut RpcDecl, later: RpcDecl) {
    first_wins(&mut existing.description, later.description);
    first_wins(&mut existing.handler, later.handler);
    first_wins(&mut existing.usage, later.usage);
    first_wins(&mut existing.arg_style, later.arg_style);
    first_wins(&mut existing.hidden, later.hidden);
    first_wins(&mut existing.input_params, later.input_params);
}

fn absorb_leaf(existing: &mut StatusLeafDecl, later: StatusLeafDecl) {
    first_wins(&mut existing.description, later.description);
    first_wins(&mut existing.completions, later.completions);
    first_wins(&mut existing.handler, later.handler);
}

impl From<RpcDecl> for RpcCommand {
    fn from(decl: RpcDecl) -> Self {
        Self {
            name: decl.name,
            description: decl.description,
            handler: decl.handler,
            usage: decl.usage,
            arg_style: decl.arg_style.unwrap_or_default(),
            input_params: decl.input_params.unwrap_or_default(),
            hidden: decl.hidden.unwrap_or(false),
        }
    }
}

impl From<StatusLeafDecl> for StatusField {
    fn from(decl: StatusLeafDecl) -> Self {
        Self {
            name: decl.name,
            description: decl.description,
            completions: decl.completions.unwrap_or_default(),
            handler: decl.handler,
        }
    }
}
