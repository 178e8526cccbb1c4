//! Typed visitor pass over a parsed statement tree.
//!
//! One depth-first walk turns the generic [`Statement`] tree into concrete
//! declarations: every rpc becomes an [`RpcDecl`], every leaf inside a
//! read-only `container state { config false; ... }` subtree becomes a
//! [`StatusLeafDecl`]. Metadata slots are plain `Option`s filled from the
//! *first* matching child; later duplicates are ignored.
//!
//! Annotation lookup is prefix-agnostic: `ex:cli-usage` and `cli-usage` both
//! match the local name `cli-usage`.

use crate::model::ArgStyle;
use crate::yang::Statement;
use serde::{Deserialize, Serialize};

pub const EXT_HANDLER: &str = "cli-handler";
pub const EXT_USAGE: &str = "cli-usage";
pub const EXT_ARG_STYLE: &str = "cli-arg-style";
pub const EXT_HIDDEN: &str = "cli-hidden";
pub const EXT_COMPLETION: &str = "cli-completion";
pub const EXT_STATE_HANDLER: &str = "cli-state-handler";

/// Name of the container that opens the status subtree.
pub const STATUS_CONTAINER: &str = "state";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RpcDecl {
    pub name: String,
    pub description: Option<String>,
    pub handler: Option<String>,
    pub usage: Option<String>,
    pub arg_style: Option<ArgStyle>,
    pub hidden: Option<bool>,
    /// Leaf names under the rpc's `input`; `None` when there is no input or
    /// it declares no leaves.
    pub input_params: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusLeafDecl {
    pub name: String,
    pub description: Option<String>,
    pub completions: Option<Vec<String>>,
    pub handler: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaDocument {
    pub rpcs: Vec<RpcDecl>,
    pub status_leaves: Vec<StatusLeafDecl>,
}

pub fn extract_document(statements: &[Statement]) -> SchemaDocument {
    let mut doc = SchemaDocument::default();
    for stmt in statements {
        walk(stmt, false, &mut doc);
    }
    doc
}

fn walk(stmt: &Statement, in_status: bool, doc: &mut SchemaDocument) {
    if stmt.keyword.is_builtin("rpc") {
        if let Some(name) = stmt.arg() {
            doc.rpcs.push(rpc_decl(stmt, name));
        }
    }

    if stmt.keyword.is_builtin("container") {
        let opens_status = stmt.arg() == Some(STATUS_CONTAINER) && declares_config_false(stmt);
        let here = in_status || opens_status;
        for sub in stmt.children() {
            walk(sub, here, doc);
        }
        return;
    }

    if in_status && stmt.keyword.is_builtin("leaf") {
        if let Some(name) = stmt.arg() {
            doc.status_leaves.push(status_leaf_decl(stmt, name));
        }
    }

    for sub in stmt.children() {
        walk(sub, in_status, doc);
    }
}

fn declares_config_false(stmt: &Statement) -> bool {
    stmt.children()
        .any(|sub| sub.keyword.is_builtin("config") && sub.arg() == Some("false"))
}

fn rpc_decl(stmt: &Statement, name: &str) -> RpcDecl {
    RpcDecl {
        name: name.to_string(),
        description: first_description(stmt),
        handler: first_extension_arg(stmt, EXT_HANDLER),
        usage: first_extension_arg(stmt, EXT_USAGE),
        arg_style: first_extension_arg(stmt, EXT_ARG_STYLE)
            .map(|tag| ArgStyle::from_tag(&tag, name)),
        hidden: first_extension(stmt, EXT_HIDDEN).map(|ext| hidden_flag(ext.arg(), name)),
        input_params: stmt
            .children()
            .find(|sub| sub.keyword.is_builtin("input"))
            .map(collect_input_leaf_names)
            .filter(|names| !names.is_empty()),
    }
}

fn status_leaf_decl(stmt: &Statement, name: &str) -> StatusLeafDecl {
    StatusLeafDecl {
        name: name.to_string(),
        description: first_description(stmt),
        completions: first_extension_arg(stmt, EXT_COMPLETION)
            .map(|list| list.split_whitespace().map(str::to_string).collect()),
        handler: first_extension_arg(stmt, EXT_STATE_HANDLER),
    }
}

fn first_description(stmt: &Statement) -> Option<String> {
    stmt.children()
        .find(|sub| sub.keyword.is_builtin("description") && sub.argument.is_some())
        .and_then(|sub| sub.arg())
        .map(|arg| arg.trim().to_string())
}

fn first_extension<'a>(stmt: &'a Statement, local: &str) -> Option<&'a Statement> {
    stmt.children().find(|sub| sub.keyword.has_local_name(local))
}

fn first_extension_arg(stmt: &Statement, local: &str) -> Option<String> {
    stmt.children()
        .find(|sub| sub.keyword.has_local_name(local) && sub.argument.is_some())
        .and_then(|sub| sub.arg())
        .map(|arg| arg.trim().to_string())
}

fn hidden_flag(arg: Option<&str>, rpc: &str) -> bool {
    match arg.map(str::trim) {
        None | Some("true") => true,
        Some("false") => false,
        Some(other) => {
            tracing::warn!(rpc, value = other, "unrecognized cli-hidden value; treating as visible");
            false
        }
    }
}

fn collect_input_leaf_names(input: &Statement) -> Vec<String> {
    fn visit(stmt: &Statement, names: &mut Vec<String>) {
        if stmt.keyword.is_builtin("leaf") {
            if let Some(name) = stmt.arg() {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        for child in stmt.children() {
            visit(child, names);
        }
    }

    let mut names = Vec::new();
    visit(input, &mut names);
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yang::parse_statements;

    fn extract(text: &str) -> SchemaDocument {
        extract_document(&parse_statements(text).expect("parse"))
    }

    #[test]
    fn extracts_rpc_metadata_with_any_prefix() {
        let doc = extract(
            r#"
            module m {
              prefix ex;
              rpc hello {
                description "  Say hello  ";
                ex:cli-handler "core:hello";
                other:cli-usage "hello name=<name>";
                cli-arg-style kv;
                input {
                  leaf name { type string; }
                  container nested { leaf name; leaf loud; }
                }
              }
            }
            "#,
        );
        assert_eq!(doc.rpcs.len(), 1);
        let rpc = &doc.rpcs[0];
        assert_eq!(rpc.name, "hello");
        assert_eq!(rpc.description.as_deref(), Some("Say hello"));
        assert_eq!(rpc.handler.as_deref(), Some("core:hello"));
        assert_eq!(rpc.usage.as_deref(), Some("hello name=<name>"));
        assert_eq!(rpc.arg_style, Some(ArgStyle::Kv));
        assert_eq!(rpc.hidden, None);
        assert_eq!(
            rpc.input_params,
            Some(vec!["name".to_string(), "loud".to_string()])
        );
    }

    #[test]
    fn first_annotation_wins_within_one_rpc() {
        let doc = extract(
            r#"
            rpc ping {
              ex:cli-usage "first";
              ex:cli-usage "second";
              ex:cli-arg-style positional;
              ex:cli-arg-style kv;
            }
            "#,
        );
        assert_eq!(doc.rpcs[0].usage.as_deref(), Some("first"));
        assert_eq!(doc.rpcs[0].arg_style, Some(ArgStyle::Positional));
    }

    #[test]
    fn rpc_without_annotations_has_no_metadata() {
        let doc = extract("rpc bare;");
        assert_eq!(
            doc.rpcs[0],
            RpcDecl {
                name: "bare".to_string(),
                ..RpcDecl::default()
            }
        );
    }

    #[test]
    fn hidden_flag_variants() {
        let doc = extract(
            "rpc a { ex:cli-hidden; } rpc b { ex:cli-hidden true; } rpc c { ex:cli-hidden false; }",
        );
        let flags: Vec<_> = doc.rpcs.iter().map(|r| r.hidden).collect();
        assert_eq!(flags, vec![Some(true), Some(true), Some(false)]);
    }

    #[test]
    fn status_leaves_require_config_false_state_container() {
        let doc = extract(
            r#"
            container state {
              config false;
              leaf hostname {
                description "Host name";
                ex:cli-state-handler "core:show-hostname";
              }
              container routing {
                leaf route { ex:cli-completion "ipv4 ipv6  <CR>"; }
              }
            }
            container state { leaf configurable; }
            container other { config false; leaf ignored; }
            "#,
        );
        let names: Vec<_> = doc.status_leaves.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["hostname", "route"]);
        assert_eq!(
            doc.status_leaves[0].handler.as_deref(),
            Some("core:show-hostname")
        );
        assert_eq!(
            doc.status_leaves[1].completions,
            Some(vec!["ipv4".to_string(), "ipv6".to_string(), "<CR>".to_string()])
        );
    }

    #[test]
    fn leaves_outside_status_subtree_are_ignored() {
        let doc = extract("rpc r { input { leaf x; } } leaf top;");
        assert!(doc.status_leaves.is_empty());
    }
}
