use exemplar_core::{
    run, synthesize, AppError, DocumentFormat, DocumentStore, Exchange, GeneratorConfig, Method,
    OperationOverride, Override, Sample,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn config_at(path: &Path) -> GeneratorConfig {
    GeneratorConfig::new(path)
        .with_title("Hanami Example")
        .with_ignored_path("/admin/masters/extensions")
        .with_request_headers(["X-Authorization-Token", "Secret-Key"])
        .with_response_headers(["X-Cursor"])
        .with_security_scheme(
            "SecretApiKeyAuth",
            json!({"type": "apiKey", "in": "header", "name": "Secret-Key"}),
        )
}

fn body(value: Value) -> Sample {
    Sample::from(value)
}

fn table(id: i64, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "description": "description",
        "database": {"id": 2, "name": "production"},
        "null_sample": null,
        "storage_size": 12.3,
        "created_at": "2020-07-17T00:00:00+00:00"
    })
}

fn tables_exchanges() -> Vec<Exchange> {
    vec![
        Exchange::new(Method::Get, "/tables?page=1&per=10", 200)
            .with_request_header("X-Authorization-Token", "token")
            .with_response_header("X-Cursor", "100")
            .with_response_body("application/json", body(json!([table(1, "access")])))
            .with_description("with flat query parameters"),
        Exchange::new(Method::Get, "/tables?filter[name]=Example%20Table", 200)
            .with_request_header("X-Authorization-Token", "token")
            .with_response_body("application/json", body(json!([table(1, "access")])))
            .with_description("with deep query parameters"),
        Exchange::new(Method::Get, "/tables/1", 200)
            .with_request_header("X-Authorization-Token", "token")
            .with_response_body("application/json", body(table(1, "access"))),
        Exchange::new(Method::Get, "/tables/2", 404)
            .with_request_header("X-Authorization-Token", "token")
            .with_response_body("application/json", body(json!({"message": "not found"})))
            .with_description("does not return tables if not found"),
        Exchange::new(Method::Post, "/tables", 201)
            .with_request_header("X-Authorization-Token", "token")
            .with_request_body(
                "application/json",
                body(json!({"name": "k0kubun", "description": "description", "database_id": 2})),
            )
            .with_response_body("application/json", body(table(1, "k0kubun"))),
        Exchange::new(Method::Post, "/tables", 422)
            .with_request_header("X-Authorization-Token", "token")
            .with_request_body(
                "application/json",
                body(json!({"description": "description", "database_id": 2})),
            )
            .with_response_body(
                "application/json",
                body(json!({"error": "invalid name parameter"})),
            )
            .with_description("fails to create a table"),
        Exchange::new(Method::Delete, "/tables/1", 200)
            .with_request_header("X-Authorization-Token", "token")
            .with_response_body("application/json", body(table(1, "access"))),
    ]
}

fn image_exchanges() -> Vec<Exchange> {
    let png = || Sample::file("image.png", "image/png");
    vec![
        Exchange::new(Method::Post, "/images/upload", 200)
            .with_request_body("multipart/form-data", Sample::object([("image", png())])),
        Exchange::new(Method::Post, "/images/upload_nested", 200).with_request_body(
            "multipart/form-data",
            Sample::object([(
                "nested_image",
                Sample::object([
                    ("image", png()),
                    ("caption", Sample::String("Some caption".into())),
                ]),
            )]),
        ),
        Exchange::new(Method::Post, "/images/upload_multiple", 200).with_request_body(
            "multipart/form-data",
            Sample::object([("images", Sample::Array(vec![png(), png()]))]),
        ),
    ]
}

fn synthesized(exchanges: Vec<Exchange>) -> Value {
    let config = config_at(Path::new("doc/openapi.yaml"));
    synthesize(&config, None, exchanges).unwrap().0
}

#[test]
fn test_query_parameters_from_separate_exchanges_merge() {
    let doc = synthesized(tables_exchanges());
    let params = &doc["paths"]["/tables"]["get"]["parameters"];

    assert_eq!(
        params,
        &json!([
            {
                "name": "filter", "in": "query", "required": false,
                "schema": {
                    "type": "object",
                    "properties": {"name": {"type": "string"}},
                    "required": ["name"]
                },
                "style": "deepObject", "explode": true
            },
            {"name": "page", "in": "query", "required": false, "schema": {"type": "integer"}},
            {"name": "per", "in": "query", "required": false, "schema": {"type": "integer"}},
            {
                "name": "X-Authorization-Token", "in": "header", "required": true,
                "schema": {"type": "string"}
            }
        ])
    );
}

#[test]
fn test_required_shrinks_and_statuses_are_separate() {
    let doc = synthesized(tables_exchanges());
    let post = &doc["paths"]["/tables"]["post"];

    assert_eq!(
        post["requestBody"]["content"]["application/json"]["schema"],
        json!({
            "type": "object",
            "properties": {
                "database_id": {"type": "integer"},
                "description": {"type": "string"},
                "name": {"type": "string"}
            },
            "required": ["database_id", "description"]
        })
    );
    let codes: Vec<&String> = post["responses"].as_object().unwrap().keys().collect();
    assert_eq!(codes, vec!["201", "422"]);
    assert_eq!(post["responses"]["201"]["description"], json!("Created"));
    assert_eq!(post["responses"]["422"]["description"], json!("fails to create a table"));
    assert_eq!(
        post["responses"]["422"]["content"]["application/json"]["schema"]["properties"],
        json!({"error": {"type": "string"}})
    );
}

#[test]
fn test_path_templates_and_nullable_fields() {
    let doc = synthesized(tables_exchanges());
    let get = &doc["paths"]["/tables/{table_id}"]["get"];

    assert_eq!(
        get["parameters"][0],
        json!({"name": "table_id", "in": "path", "required": true, "schema": {"type": "integer"}})
    );
    let schema = &get["responses"]["200"]["content"]["application/json"]["schema"];
    assert_eq!(schema["properties"]["null_sample"], json!({"nullable": true}));
    assert_eq!(schema["properties"]["storage_size"], json!({"type": "number"}));
    assert!(doc["paths"]["/tables/{table_id}"]["delete"].is_object());
}

#[test]
fn test_file_uploads() {
    let doc = synthesized(image_exchanges());
    let schema_of = |path: &str| {
        let content = &doc["paths"][path]["post"]["requestBody"]["content"];
        content["multipart/form-data"]["schema"].clone()
    };
    let binary = json!({"type": "string", "format": "binary"});

    assert_eq!(schema_of("/images/upload")["properties"]["image"], binary);
    assert_eq!(
        schema_of("/images/upload_nested")["properties"]["nested_image"],
        json!({
            "type": "object",
            "properties": {"caption": {"type": "string"}, "image": binary},
            "required": ["caption", "image"]
        })
    );
    assert_eq!(
        schema_of("/images/upload_multiple")["properties"]["images"],
        json!({"type": "array", "items": binary})
    );
    assert_eq!(
        doc["paths"]["/images/upload"]["post"]["requestBody"]["content"]["multipart/form-data"]
            .get("example"),
        None
    );
}

#[test]
fn test_skipped_exchange_never_appears() {
    let mut exchanges = tables_exchanges();
    exchanges.push(
        Exchange::new(Method::Put, "/tables/3", 404)
            .with_response_body("application/json", body(json!({"message": "not found"})))
            .with_override(Override::Skip),
    );
    let doc = synthesized(exchanges);
    assert_eq!(doc["paths"]["/tables/{table_id}"].get("put"), None);
}

#[test]
fn test_forced_fields_apply_to_operation() {
    let forced = Exchange::new(Method::Get, "/test_block", 200)
        .with_response_body("application/json", body(json!({"hello": "world"})))
        .with_override(Override::Fields(OperationOverride {
            deprecated: Some(true),
            ..Default::default()
        }));
    let secret = Exchange::new(Method::Get, "/secret_items", 200)
        .with_request_header("Secret-Key", "42")
        .with_response_body("application/json", body(json!({"items": ["secrets"]})))
        .with_override(Override::Fields(OperationOverride {
            security: Some(vec![[("SecretApiKeyAuth".to_string(), Vec::new())].into()]),
            ..Default::default()
        }));

    let doc = synthesized(vec![forced, secret, Exchange::new(Method::Get, "/test_block", 200)]);
    assert_eq!(doc["paths"]["/test_block"]["get"]["deprecated"], json!(true));
    assert_eq!(
        doc["paths"]["/secret_items"]["get"]["security"],
        json!([{"SecretApiKeyAuth": []}])
    );
    assert_eq!(
        doc["components"]["securitySchemes"]["SecretApiKeyAuth"]["type"],
        json!("apiKey")
    );
}

#[test]
fn test_ignored_path_never_creates_operation() {
    let exchanges: Vec<Exchange> = (0..5)
        .map(|_| Exchange::new(Method::Post, "/admin/masters/extensions", 200))
        .collect();
    let doc = synthesized(exchanges);
    assert_eq!(doc["paths"], json!({}));
}

#[test]
fn test_second_run_is_byte_identical() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("doc").join("openapi.yaml");
    let config = config_at(&path).with_comment("This file is auto-generated.");
    let exchanges: Vec<Exchange> = tables_exchanges()
        .into_iter()
        .chain(image_exchanges())
        .collect();

    let first = run(&config, exchanges.clone()).unwrap();
    assert_eq!(first.path.as_deref(), Some(path.as_path()));
    let once = fs::read_to_string(&path).unwrap();
    assert!(once.starts_with("# This file is auto-generated.\n"));

    run(&config, exchanges).unwrap();
    let twice = fs::read_to_string(&path).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn test_json_output_is_byte_identical() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("openapi.json");
    let config = config_at(&path);

    run(&config, tables_exchanges()).unwrap();
    let once = fs::read_to_string(&path).unwrap();
    run(&config, tables_exchanges()).unwrap();
    assert_eq!(once, fs::read_to_string(&path).unwrap());
    assert!(once.ends_with("}\n"));
}

#[test]
fn test_permuted_exchanges_yield_same_document() {
    let forward: Vec<Exchange> = tables_exchanges().into_iter().chain(image_exchanges()).collect();
    let mut reversed = forward.clone();
    reversed.reverse();
    let mut rotated = forward.clone();
    rotated.rotate_left(4);

    let expected = synthesized(forward);
    assert_eq!(expected, synthesized(reversed));
    assert_eq!(expected, synthesized(rotated));
}

#[test]
fn test_existing_placeholder_names_are_reused() {
    let config = config_at(Path::new("doc/openapi.yaml"));
    let existing = json!({
        "openapi": "3.0.3",
        "info": {"title": "Hanami Example", "version": "1.0.0"},
        "paths": {
            "/tables/{id}": {
                "get": {
                    "summary": "Show a table",
                    "parameters": [{
                        "name": "id", "in": "path", "required": true,
                        "schema": {"type": "integer"}
                    }],
                    "responses": {"200": {"description": "returns a table"}}
                }
            }
        }
    });
    let exchanges = vec![Exchange::new(Method::Get, "/tables/42", 200)
        .with_response_body("application/json", body(table(42, "answer")))];

    let (doc, _) = synthesize(&config, Some(existing), exchanges).unwrap();
    let paths: Vec<&String> = doc["paths"].as_object().unwrap().keys().collect();
    assert_eq!(paths, vec!["/tables/{id}"]);
    let get = &doc["paths"]["/tables/{id}"]["get"];
    assert_eq!(get["summary"], json!("Show a table"));
    assert_eq!(get["responses"]["200"]["description"], json!("returns a table"));
    assert_eq!(get["parameters"].as_array().unwrap().len(), 1);
}

#[test]
fn test_required_never_regrows_across_runs() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("openapi.yaml");
    let config = config_at(&path);
    let post = |payload: Value| {
        Exchange::new(Method::Post, "/tables", 201)
            .with_request_body("application/json", body(payload))
    };
    let required = || {
        let doc = DocumentStore::new(&path, DocumentFormat::Yaml).load().unwrap().unwrap();
        let content = &doc["paths"]["/tables"]["post"]["requestBody"]["content"];
        content["application/json"]["schema"]["required"].clone()
    };

    run(&config, vec![post(json!({"name": "a", "database_id": 1}))]).unwrap();
    assert_eq!(required(), json!(["database_id", "name"]));

    run(&config, vec![post(json!({"database_id": 1}))]).unwrap();
    assert_eq!(required(), json!(["database_id"]));

    run(&config, vec![post(json!({"name": "a", "database_id": 1}))]).unwrap();
    assert_eq!(required(), json!(["database_id"]));
}

#[test]
fn test_query_parameters_split_across_runs_match_one_pass() {
    let config = config_at(Path::new("doc/openapi.yaml"));
    let list = |query: &str, value: &str| {
        Exchange::new(Method::Get, "/tables", 200).with_query(query, Sample::String(value.into()))
    };

    let (together, _) =
        synthesize(&config, None, vec![list("page", "1"), list("per", "10")]).unwrap();
    let (first, _) = synthesize(&config, None, vec![list("page", "1")]).unwrap();
    let (chained, _) = synthesize(&config, Some(first), vec![list("per", "10")]).unwrap();

    assert_eq!(
        chained["paths"]["/tables"]["get"]["parameters"],
        json!([
            {"name": "page", "in": "query", "required": false, "schema": {"type": "integer"}},
            {"name": "per", "in": "query", "required": false, "schema": {"type": "integer"}}
        ])
    );
    assert_eq!(together, chained);
}

#[test]
fn test_new_method_reuses_existing_path_template() {
    let config = config_at(Path::new("doc/openapi.yaml"));
    let existing = json!({
        "openapi": "3.0.3",
        "info": {"title": "Hanami Example", "version": "1.0.0"},
        "paths": {
            "/tables/{id}": {
                "get": {"responses": {"200": {"description": "returns a table"}}}
            }
        }
    });
    let exchanges = vec![Exchange::new(Method::Delete, "/tables/42", 200)];

    let (doc, _) = synthesize(&config, Some(existing), exchanges).unwrap();
    let paths: Vec<&String> = doc["paths"].as_object().unwrap().keys().collect();
    assert_eq!(paths, vec!["/tables/{id}"]);
    assert_eq!(
        doc["paths"]["/tables/{id}"]["delete"]["parameters"],
        json!([{"name": "id", "in": "path", "required": true, "schema": {"type": "integer"}}])
    );
}

#[test]
fn test_null_keeps_prior_structure_across_runs() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("openapi.yaml");
    let config = config_at(&path);
    let get = |payload: Value| {
        Exchange::new(Method::Get, "/profile", 200)
            .with_response_body("application/json", body(payload))
    };

    run(&config, vec![get(json!({"owner": {"id": 1, "name": "k0kubun"}}))]).unwrap();
    run(&config, vec![get(json!({"owner": null}))]).unwrap();

    let doc = DocumentStore::new(&path, DocumentFormat::Yaml).load().unwrap().unwrap();
    assert_eq!(
        doc["paths"]["/profile"]["get"]["responses"]["200"]["content"]["application/json"]["schema"]
            ["properties"]["owner"],
        json!({
            "type": "object",
            "nullable": true,
            "properties": {"id": {"type": "integer"}, "name": {"type": "string"}},
            "required": ["id", "name"]
        })
    );
}

#[test]
fn test_hand_edits_survive_regeneration() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("openapi.yaml");
    let config = config_at(&path);

    run(&config, tables_exchanges()).unwrap();
    let store = DocumentStore::new(&path, DocumentFormat::Yaml);
    let mut doc = store.load().unwrap().unwrap();
    let post = &mut doc["paths"]["/tables"]["post"];
    post["summary"] = json!("Create a table");
    let schema = &mut post["requestBody"]["content"]["application/json"]["schema"];
    schema["properties"]["name"]["description"] = json!("Display name");
    doc["info"]["x-owner"] = json!("platform");
    store.save(&doc).unwrap();

    run(&config, tables_exchanges()).unwrap();
    let doc = store.load().unwrap().unwrap();
    let post = &doc["paths"]["/tables"]["post"];
    assert_eq!(post["summary"], json!("Create a table"));
    assert_eq!(
        post["requestBody"]["content"]["application/json"]["schema"]["properties"]["name"],
        json!({"type": "string", "description": "Display name"})
    );
    assert_eq!(doc["info"]["x-owner"], json!("platform"));
}

#[test]
fn test_malformed_document_is_left_untouched() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("openapi.yaml");
    let original = "openapi: 3.0.3\npaths:\n  - not a mapping\n";
    fs::write(&path, original).unwrap();

    let err = run(&config_at(&path), tables_exchanges()).unwrap_err();
    assert!(matches!(err, AppError::Parse(_)));
    assert_eq!(fs::read_to_string(&path).unwrap(), original);

    fs::write(&path, "paths: [unclosed\n").unwrap();
    assert!(matches!(run(&config_at(&path), tables_exchanges()), Err(AppError::Parse(_))));
}

#[test]
fn test_unknown_security_scheme_aborts_without_writing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("openapi.yaml");
    let config = GeneratorConfig::new(&path);
    let exchange = Exchange::new(Method::Get, "/secret_items", 200).with_override(Override::Fields(
        OperationOverride {
            security: Some(vec![[("Missing".to_string(), Vec::new())].into()]),
            ..Default::default()
        },
    ));

    let err = run(&config, vec![exchange]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Unknown security scheme 'Missing' required by GET /secret_items"
    );
    assert!(!path.exists());
}
