use std::{env, fs};

use yangcli_dsl::digest::schema_digest_v1;
use yangcli_dsl::extract::extract_document;
use yangcli_dsl::yang::parse_statements;

fn main() {
    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: yangcli_parse_schema <file.yang>");
        std::process::exit(2);
    };
    if args.next().is_some() {
        eprintln!("usage: yangcli_parse_schema <file.yang>");
        std::process::exit(2);
    }

    let text = match fs::read_to_string(&path) {
        Ok(v) => v,
        Err(err) => {
            eprintln!("failed to read `{path}`: {err}");
            std::process::exit(2);
        }
    };

    match parse_statements(&text) {
        Ok(statements) => {
            let doc = extract_document(&statements);
            println!(
                "ok(yang): statements={} rpcs={} status_leaves={} digest={}",
                statements.len(),
                doc.rpcs.len(),
                doc.status_leaves.len(),
                schema_digest_v1(&text)
            );
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}
