use std::path::PathBuf;

use proptest::prelude::*;
use yangcli_dsl::load_schema_sources;

fn ident() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-z][a-z0-9-]{0,8}").unwrap()
}

fn description() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[A-Za-z0-9 ]{1,16}").unwrap()
}

fn render(decls: &[(String, String)]) -> String {
    let mut text = String::from("module generated {\n  prefix g;\n");
    for (name, desc) in decls {
        text.push_str(&format!("  rpc {name} {{ description \"{desc}\"; }}\n"));
    }
    text.push_str("}\n");
    text
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn first_declaration_of_each_rpc_wins(
        decls in proptest::collection::vec((ident(), description()), 0..12)
    ) {
        let loaded = load_schema_sources([(PathBuf::from("g.yang"), render(&decls))])
            .expect("load");

        let mut expected: Vec<(String, String)> = Vec::new();
        for (name, desc) in &decls {
            if !expected.iter().any(|(n, _)| n == name) {
                expected.push((name.clone(), desc.trim().to_string()));
            }
        }

        let actual: Vec<(String, String)> = loaded
            .model
            .commands()
            .iter()
            .map(|c| (c.name.clone(), c.description.clone().unwrap_or_default()))
            .collect();
        prop_assert_eq!(actual, expected);
    }
}
