//! GitLab client and secret store backends against mock servers

mod common;

use chrono::NaiveDate;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;
use gitlab_token_manager::errors::Error;
use gitlab_token_manager::gitlab::GitLabClient;
use gitlab_token_manager::secrets::SecretString;

fn client(server: &MockServer, token: &str) -> GitLabClient {
    GitLabClient::new(&base_url(server), SecretString::new(token), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn current_token_is_fetched_with_private_token_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/personal_access_tokens/self"))
        .and(header("PRIVATE-TOKEN", "glpat-current"))
        .respond_with(ResponseTemplate::new(200).set_body_json(access_token_json(7, "ci", &["api"])))
        .expect(1)
        .mount(&server)
        .await;

    let token = client(&server, "glpat-current").current_access_token().await.unwrap();
    assert_eq!(token.id, 7);
    assert_eq!(token.name, "ci");
    assert_eq!(token.expires_at, Some(date(2024, 3, 20)));
}

#[tokio::test]
async fn api_errors_carry_status_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/personal_access_tokens/self"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "401 Unauthorized"})))
        .mount(&server)
        .await;

    let err = client(&server, "expired").current_access_token().await.unwrap_err();
    assert_eq!(err.api_status(), Some(401));
    assert!(err.to_string().contains("401 Unauthorized"), "{err}");
}

#[tokio::test]
async fn listing_follows_next_page_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/group%2Fapp/access_tokens"))
        .and(query_param("page", "1"))
        .and(query_param("per_page", "100"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-next-page", "2")
                .set_body_json(json!([access_token_json(1, "one", &["api"])])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/group%2Fapp/access_tokens"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-next-page", "")
                .set_body_json(json!([access_token_json(2, "two", &["read_api"])])),
        )
        .mount(&server)
        .await;

    let tokens = client(&server, "admin").list_project_access_tokens("group/app").await.unwrap();
    let names: Vec<_> = tokens.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["one", "two"]);
}

#[tokio::test]
async fn project_rotation_sends_expiry_date() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/projects/group%2Fapp/access_tokens/7/rotate"))
        .and(body_json(json!({"expires_at": "2024-04-14"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(issued_token_json(8, "deploy", "glpat-rotated", "2024-04-14")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let issued = client(&server, "admin")
        .rotate_project_access_token("group/app", 7, date(2024, 4, 14))
        .await
        .unwrap();
    assert_eq!(issued.token.expose_secret(), "glpat-rotated");
    assert_eq!(issued.expires_at, Some(date(2024, 4, 14)));
    assert!(!format!("{:?}", issued).contains("glpat-rotated"));
}

// === gitlab:// variable references ===

#[tokio::test]
async fn project_variable_with_environment_scope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/42/variables/GITLAB_TOKEN"))
        .and(query_param("filter[environment_scope]", "production"))
        .and(header("PRIVATE-TOKEN", "glpat-admin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(variable_json("GITLAB_TOKEN", "glpat-stored", "production")),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v4/projects/42/variables/GITLAB_TOKEN"))
        .and(query_param("filter[environment_scope]", "production"))
        .and(body_json(json!({"value": "glpat-next"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(variable_json("GITLAB_TOKEN", "glpat-next", "production")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let factory = factory_with(Some("glpat-admin"), ScriptedRunner::new(), None);
    let raw = format!("gitlab://{}/projects/42/variables/GITLAB_TOKEN?environment=production", host(&server));
    let reference = factory.resolve(&raw).unwrap();

    assert_eq!(reference.read().await.unwrap().expose_secret(), "glpat-stored");
    reference.update(&SecretString::new("glpat-next"), date(2024, 4, 14)).await.unwrap();
}

#[tokio::test]
async fn unscoped_variable_in_several_environments_is_ambiguous() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/42/variables"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            variable_json("GITLAB_TOKEN", "a", "staging"),
            variable_json("GITLAB_TOKEN", "b", "production"),
            variable_json("OTHER", "c", "*"),
        ])))
        .mount(&server)
        .await;

    let factory = factory_with(Some("glpat-admin"), ScriptedRunner::new(), None);
    let raw = format!("gitlab://{}/projects/42/variables/GITLAB_TOKEN", host(&server));
    let err = factory.resolve(&raw).unwrap().read().await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("multiple scopes"), "{message}");
    assert!(message.contains("staging") && message.contains("production"), "{message}");
}

#[tokio::test]
async fn unscoped_variable_uses_its_only_scope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/42/variables"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([variable_json("GITLAB_TOKEN", "v", "production")])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/42/variables/GITLAB_TOKEN"))
        .and(query_param("filter[environment_scope]", "production"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(variable_json("GITLAB_TOKEN", "glpat-only", "production")),
        )
        .mount(&server)
        .await;

    let factory = factory_with(Some("glpat-admin"), ScriptedRunner::new(), None);
    let raw = format!("gitlab://{}/projects/42/variables/GITLAB_TOKEN", host(&server));
    let value = factory.resolve(&raw).unwrap().read().await.unwrap();
    assert_eq!(value.expose_secret(), "glpat-only");
}

#[tokio::test]
async fn group_variable_read() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/groups/platform%2Finfra/variables/PAT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(variable_json("PAT", "glpat-group", "*")))
        .mount(&server)
        .await;

    let factory = factory_with(Some("glpat-admin"), ScriptedRunner::new(), None);
    let raw = format!("gitlab://{}/groups/platform%2Finfra/variables/PAT", host(&server));
    assert_eq!(factory.resolve(&raw).unwrap().read().await.unwrap().expose_secret(), "glpat-group");
}

#[tokio::test]
async fn variable_reference_without_admin_token_fails() {
    let factory = factory_with(None, ScriptedRunner::new(), None);
    let reference = factory.resolve("gitlab://gitlab.example.com/projects/1/variables/X").unwrap();
    let err = reference.read().await.unwrap_err();
    assert!(matches!(err, Error::Config(_)), "{err}");
}

// === op:// ===

fn op_item(category: &str) -> String {
    json!({
        "id": "abc",
        "title": "gitlab access token",
        "category": category,
        "fields": [
            {"id": "notesPlain", "label": "notesPlain", "type": "STRING", "value": ""},
            {"id": "credential", "label": "credential", "type": "CONCEALED", "value": "glpat-op"},
            {"id": "expires", "label": "expires", "type": "DATE", "value": "1710892800"}
        ]
    })
    .to_string()
}

#[tokio::test]
async fn onepassword_read_and_update() {
    let runner = ScriptedRunner::new();
    runner.respond("op", &["item", "get", "gitlab access token", "--vault", "Private"], &op_item("API_CREDENTIAL"));
    runner.respond("op", &["item", "edit"], "");
    let factory = factory_with(None, runner.clone(), None);

    let reference = factory.resolve("op://Private/gitlab access token").unwrap();
    assert_eq!(reference.read().await.unwrap().expose_secret(), "glpat-op");

    reference.update(&SecretString::new("glpat-new"), date(2024, 4, 14)).await.unwrap();
    let (program, args) = runner.calls().last().cloned().unwrap();
    assert_eq!(program, "op");
    assert!(args.contains(&"credential=glpat-new".to_string()));
    assert!(args.contains(&"expires=1713052800".to_string()));
}

#[tokio::test]
async fn onepassword_requires_api_credential_items() {
    let runner = ScriptedRunner::new();
    runner.respond("op", &["item", "get"], &op_item("LOGIN"));
    let factory = factory_with(None, runner, None);

    let err = factory.resolve("op:///Private/login").unwrap().read().await.unwrap_err();
    assert!(err.to_string().contains("API_CREDENTIAL"), "{err}");
}

// === ssm:// and arn: ===

#[tokio::test]
async fn ssm_parameter_read_and_update() {
    let runner = ScriptedRunner::new();
    runner.respond(
        "aws",
        &["ssm", "get-parameter", "--name", "/gitlab/pat"],
        r#"{"Parameter": {"Name": "/gitlab/pat", "Type": "SecureString", "Value": "glpat-ssm", "Version": 3}}"#,
    );
    runner.respond("aws", &["ssm", "put-parameter"], r#"{"Version": 4, "Tier": "Standard"}"#);
    let factory = factory_with(None, runner.clone(), None);

    let reference = factory.resolve("ssm:///gitlab/pat").unwrap();
    assert_eq!(reference.read().await.unwrap().expose_secret(), "glpat-ssm");
    reference.update(&SecretString::new("glpat-next"), date(2024, 4, 14)).await.unwrap();

    let (_, args) = runner.calls().last().cloned().unwrap();
    assert!(args.windows(2).any(|w| w == ["--value", "glpat-next"]));
    assert!(args.contains(&"--overwrite".to_string()));
}

#[tokio::test]
async fn arn_reference_passes_region() {
    let runner = ScriptedRunner::new();
    runner.respond("aws", &["ssm", "get-parameter"], r#"{"Parameter": {"Value": "glpat-arn"}}"#);
    let factory = factory_with(None, runner.clone(), None);

    let arn = "arn:aws:ssm:eu-central-1:12345435454456:parameter/gitlab/pat";
    let value = factory.resolve(arn).unwrap().read().await.unwrap();
    assert_eq!(value.expose_secret(), "glpat-arn");

    let (_, args) = runner.calls()[0].clone();
    assert!(args.windows(2).any(|w| w == ["--name", arn]));
    assert!(args.windows(2).any(|w| w == ["--region", "eu-central-1"]));
}

#[tokio::test]
async fn missing_cli_surfaces_as_command_error() {
    let runner = ScriptedRunner::new();
    runner.fail("aws", &["ssm"], "aws not found in $PATH");
    let factory = factory_with(None, runner, None);

    let err = factory.resolve("ssm:///gitlab/pat").unwrap().read().await.unwrap_err();
    assert!(matches!(err, Error::Command { .. }));
}

// === gsm:// ===

#[cfg(not(feature = "gcp"))]
#[tokio::test]
async fn google_secret_access_and_add_version() {
    use base64::{engine::general_purpose::STANDARD, Engine};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/projects/my-project/secrets/gitlab-pat/versions/latest:access"))
        .and(header("authorization", "Bearer ya29.test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/123/secrets/gitlab-pat/versions/5",
            "payload": {"data": STANDARD.encode("glpat-gsm"), "dataCrc32c": "1"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/projects/my-project/secrets/gitlab-pat:addVersion"))
        .and(body_json(json!({"payload": {"data": STANDARD.encode("glpat-next")}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/123/secrets/gitlab-pat/versions/6",
            "state": "ENABLED"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let runner = ScriptedRunner::new();
    runner.respond("gcloud", &["auth", "print-access-token"], "ya29.test\n");
    let endpoint = url::Url::parse(&format!("{}/", server.uri())).unwrap();
    let factory = factory_with(None, runner, Some(endpoint));

    let reference = factory.resolve("gsm:///my-project/gitlab-pat").unwrap();
    assert_eq!(reference.read().await.unwrap().expose_secret(), "glpat-gsm");
    reference.update(&SecretString::new("glpat-next"), NaiveDate::MAX).await.unwrap();
}

#[cfg(not(feature = "gcp"))]
#[tokio::test]
async fn google_secret_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": 404, "message": "Secret [projects/p/secrets/s] not found.", "status": "NOT_FOUND"}
        })))
        .mount(&server)
        .await;

    let runner = ScriptedRunner::new();
    runner.respond("gcloud", &["auth", "print-access-token"], "ya29.test");
    let endpoint = url::Url::parse(&format!("{}/", server.uri())).unwrap();
    let factory = factory_with(None, runner, Some(endpoint));

    let err = factory.resolve("gsm:///p/s/3").unwrap().read().await.unwrap_err();
    assert!(matches!(err, Error::Backend { .. }));
    assert!(err.to_string().contains("404"), "{err}");
}
