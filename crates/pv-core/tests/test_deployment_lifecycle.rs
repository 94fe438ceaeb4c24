mod common;

use std::net::TcpListener;

use common::{acme_config, revision, Harness};
use pv_core::error::PreviewError;
use pv_core::models::{CommandType, DeploymentId, DeploymentStatus};

#[tokio::test]
async fn fresh_deploy_runs_pre_commands_and_persists_port() {
    let h = Harness::new().await;
    let config = acme_config("42100:42110", serde_json::json!({}));
    let id = DeploymentId::for_pull_request(&config, 7);

    h.deployer
        .deploy(&config, &id, &revision("feature-x", "abc123"))
        .await
        .unwrap();

    let status = h.store.get_status(&id).await.unwrap();
    assert_eq!(status.status, DeploymentStatus::Running);
    assert_eq!(status.sha, "abc123");

    let port = h.store.get_port(id.port_key()).await.unwrap();
    assert!((42100..=42110).contains(&port));

    let working_copy = h.deployer.working_copy_path(&id);
    assert!(working_copy.join(".installed").exists());

    let spec = h.supervisor.spec("acme-app-pr-7").unwrap();
    assert_eq!(spec.script, "server.js");
    assert_eq!(spec.cwd, working_copy);
    assert_eq!(spec.env["PORT"], port.to_string());
    assert_eq!(spec.env["API_URL"], format!("http://localhost:{port}/api"));
    assert_eq!(spec.env["BASE_URL"], format!("http://localhost:{port}"));
}

#[tokio::test]
async fn second_deploy_updates_in_place_with_same_port() {
    let h = Harness::new().await;
    let config = acme_config("42120:42130", serde_json::json!({}));
    let id = DeploymentId::for_pull_request(&config, 7);

    h.deployer
        .deploy(&config, &id, &revision("feature-x", "abc123"))
        .await
        .unwrap();
    let first_port = h.store.get_port(id.port_key()).await.unwrap();

    h.deployer
        .deploy(&config, &id, &revision("feature-x", "def456"))
        .await
        .unwrap();
    let second_port = h.store.get_port(id.port_key()).await.unwrap();

    assert_eq!(first_port, second_port);
    assert_eq!(h.fetcher.fetches(), vec!["fresh abc123", "update def456"]);
    assert_eq!(
        h.supervisor.calls(),
        vec!["start acme-app-pr-7", "stop acme-app-pr-7", "restart acme-app-pr-7"]
    );
    let status = h.store.get_status(&id).await.unwrap();
    assert_eq!(status.status, DeploymentStatus::Running);
    assert_eq!(status.sha, "def456");
    let revision_file =
        std::fs::read_to_string(h.deployer.working_copy_path(&id).join("REVISION")).unwrap();
    assert_eq!(revision_file, "def456");
}

#[tokio::test]
async fn remove_then_deploy_provisions_fresh() {
    let h = Harness::new().await;
    let config = acme_config("42140:42150", serde_json::json!({}));
    let first = DeploymentId::for_pull_request(&config, 1);
    let second = DeploymentId::for_pull_request(&config, 2);

    h.deployer
        .deploy(&config, &first, &revision("feature-a", "aaa"))
        .await
        .unwrap();
    let old_port = h.store.get_port(first.port_key()).await.unwrap();

    h.deployer.remove_deployment(&first, &config).await.unwrap();
    assert!(h.store.get_port(first.port_key()).await.is_none());
    assert!(!h.deployer.working_copy_path(&first).exists());

    // the released port is available to other identities again
    h.deployer
        .deploy(&config, &second, &revision("feature-b", "bbb"))
        .await
        .unwrap();
    assert_eq!(h.store.get_port(second.port_key()).await, Some(old_port));

    h.deployer
        .deploy(&config, &first, &revision("feature-a", "ccc"))
        .await
        .unwrap();
    let new_port = h.store.get_port(first.port_key()).await.unwrap();
    assert_ne!(new_port, old_port);
    assert_eq!(
        h.fetcher.fetches(),
        vec!["fresh aaa", "fresh bbb", "fresh ccc"]
    );
}

#[tokio::test]
async fn removing_absent_deployment_is_a_noop() {
    let h = Harness::new().await;
    let config = acme_config("42160:42170", serde_json::json!({}));
    let deployed = DeploymentId::for_pull_request(&config, 1);
    h.deployer
        .deploy(&config, &deployed, &revision("feature-a", "aaa"))
        .await
        .unwrap();
    let before = h.store.snapshot().await.statuses();
    let calls_before = h.supervisor.calls();

    let absent = DeploymentId::for_pull_request(&config, 99);
    h.deployer.remove_deployment(&absent, &config).await.unwrap();
    h.deployer.remove_deployment(&absent, &config).await.unwrap();

    assert_eq!(h.store.snapshot().await.statuses(), before);
    assert_eq!(h.supervisor.calls(), calls_before);
}

#[tokio::test]
async fn partial_state_is_torn_down_before_provisioning() {
    let h = Harness::new().await;
    let config = acme_config("42180:42190", serde_json::json!({}));
    let id = DeploymentId::for_pull_request(&config, 7);

    // port persisted but the working copy is gone
    h.store.set_port(id.port_key(), 42185).await.unwrap();
    h.deployer
        .deploy(&config, &id, &revision("feature-x", "abc123"))
        .await
        .unwrap();

    assert_eq!(
        h.supervisor.calls(),
        vec!["delete acme-app-pr-7", "start acme-app-pr-7"]
    );
    assert_eq!(h.fetcher.fetches(), vec!["fresh abc123"]);
    assert_eq!(
        h.store.get_status(&id).await.unwrap().status,
        DeploymentStatus::Running
    );
}

#[tokio::test]
async fn working_copy_without_port_is_recloned() {
    let h = Harness::new().await;
    let config = acme_config("42200:42210", serde_json::json!({}));
    let id = DeploymentId::for_pull_request(&config, 7);
    std::fs::create_dir_all(h.deployer.working_copy_path(&id).join("node_modules")).unwrap();

    h.deployer
        .deploy(&config, &id, &revision("feature-x", "abc123"))
        .await
        .unwrap();

    assert_eq!(h.fetcher.fetches(), vec!["fresh abc123"]);
    assert!(!h.deployer.working_copy_path(&id).join("node_modules").exists());
}

#[tokio::test]
async fn failing_pre_command_leaves_status_stale() {
    let h = Harness::new().await;
    let config = acme_config(
        "42220:42230",
        serde_json::json!({ "pre": ["echo install failed >&2; exit 1"] }),
    );
    let id = DeploymentId::for_pull_request(&config, 7);

    let err = h
        .deployer
        .deploy(&config, &id, &revision("feature-x", "abc123"))
        .await
        .unwrap_err();
    assert!(matches!(err, PreviewError::Provisioning(_)));
    assert_eq!(
        h.store.get_status(&id).await.unwrap().status,
        DeploymentStatus::Building
    );
    assert!(h.store.get_port(id.port_key()).await.is_none());
    assert!(h.supervisor.calls().is_empty());
}

#[tokio::test]
async fn fixed_port_already_bound_fails_the_job() {
    let listener = TcpListener::bind("0.0.0.0:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let h = Harness::new().await;
    let config = acme_config(&port.to_string(), serde_json::json!({}));
    let id = DeploymentId::for_pull_request(&config, 7);

    let err = h
        .deployer
        .deploy(&config, &id, &revision("feature-x", "abc123"))
        .await
        .unwrap_err();
    assert!(matches!(err, PreviewError::PortAllocation(_)));
    assert!(h.supervisor.calls().is_empty());
}

#[tokio::test]
async fn additional_servers_get_their_own_ports_and_processes() {
    let h = Harness::new().await;
    let config = acme_config(
        "42240:42250",
        serde_json::json!({
            "host": "preview.acme.dev",
            "additionalServers": [
                {
                    "subdomain": "api",
                    "portEnv": "API_PORT",
                    "baseUrlEnv": "API_BASE_URL",
                    "startFile": "api.js"
                },
                { "subdomain": "assets", "portEnv": "ASSETS_PORT", "port": "42260:42270" }
            ]
        }),
    );
    let id = DeploymentId::for_pull_request(&config, 7);
    h.deployer
        .deploy(&config, &id, &revision("feature-x", "abc123"))
        .await
        .unwrap();

    let main = h.store.get_port("acme-app-pr-7").await.unwrap();
    let api = h.store.get_port("acme-app-pr-7~api").await.unwrap();
    let assets = h.store.get_port("acme-app-pr-7~assets").await.unwrap();
    assert_ne!(main, api);
    assert!((42240..=42250).contains(&api));
    assert!((42260..=42270).contains(&assets));

    let main_spec = h.supervisor.spec("acme-app-pr-7").unwrap();
    assert_eq!(main_spec.env["API_PORT"], api.to_string());
    assert_eq!(main_spec.env["ASSETS_PORT"], assets.to_string());
    assert_eq!(main_spec.env["BASE_URL"], "https://acme-app-pr-7.preview.acme.dev");
    assert_eq!(
        main_spec.env["API_BASE_URL"],
        "https://acme-app-pr-7-api.preview.acme.dev"
    );
    let api_spec = h.supervisor.spec("acme-app-pr-7~api").unwrap();
    assert_eq!(api_spec.script, "api.js");
    assert_eq!(api_spec.env["PORT"], api.to_string());
    assert!(!h.supervisor.is_running("acme-app-pr-7~assets"));

    h.deployer.remove_deployment(&id, &config).await.unwrap();
    assert!(h.store.port_values().await.is_empty());
    assert!(!h.supervisor.is_running("acme-app-pr-7"));
    assert!(!h.supervisor.is_running("acme-app-pr-7~api"));
}

#[tokio::test]
async fn queued_remove_after_deploy_leaves_nothing() {
    let h = Harness::new().await;
    let config = acme_config("42280:42290", serde_json::json!({}));
    let id = DeploymentId::for_branch(&config, "feature-x");

    h.queue
        .enqueue(
            CommandType::Deploy,
            id.clone(),
            config.clone(),
            Some(revision("feature-x", "abc123")),
        )
        .await
        .unwrap();
    h.queue
        .enqueue(CommandType::Remove, id.clone(), config.clone(), None)
        .await
        .unwrap();
    h.drain().await;

    assert!(h.store.get_status(&id).await.is_none());
    assert!(h.store.get_port(id.port_key()).await.is_none());
    assert!(!h.deployer.working_copy_path(&id).exists());
    assert_eq!(
        h.supervisor.calls(),
        vec!["start acme-app-branch-feature-x", "delete acme-app-branch-feature-x"]
    );
}

#[tokio::test]
async fn branch_with_slash_gets_single_directory() {
    let h = Harness::new().await;
    let config = acme_config("42300:42310", serde_json::json!({}));
    let id = DeploymentId::for_branch(&config, "feature/login");
    h.deployer
        .deploy(&config, &id, &revision("feature/login", "abc123"))
        .await
        .unwrap();
    let path = h.deployer.working_copy_path(&id);
    assert_eq!(path.parent().unwrap(), h.deploys_dir());
    assert!(path.exists());
}

#[tokio::test]
async fn branch_named_like_a_server_key_leaves_the_server_alone() {
    let h = Harness::new().await;
    let config = acme_config(
        "42320:42330",
        serde_json::json!({
            "additionalServers": [
                { "subdomain": "api", "portEnv": "API_PORT", "startFile": "api.js" }
            ]
        }),
    );
    let foo = DeploymentId::for_branch(&config, "foo");
    let foo_api = DeploymentId::for_branch(&config, "foo-api");

    h.deployer
        .deploy(&config, &foo, &revision("foo", "abc123"))
        .await
        .unwrap();
    let foo_server_port = h.store.get_port("acme-app-branch-foo~api").await.unwrap();

    h.deployer
        .deploy(&config, &foo_api, &revision("foo-api", "def456"))
        .await
        .unwrap();

    assert!(!h.supervisor.calls().iter().any(|c| c.starts_with("delete")));
    let foo_server = h.supervisor.spec("acme-app-branch-foo~api").unwrap();
    assert_eq!(foo_server.script, "api.js");
    assert_eq!(foo_server.cwd, h.deployer.working_copy_path(&foo));
    assert_eq!(
        h.store.get_port("acme-app-branch-foo~api").await,
        Some(foo_server_port)
    );
    assert_eq!(h.supervisor.spec("acme-app-branch-foo-api").unwrap().script, "server.js");

    h.deployer.remove_deployment(&foo_api, &config).await.unwrap();
    assert!(h.supervisor.is_running("acme-app-branch-foo"));
    assert!(h.supervisor.is_running("acme-app-branch-foo~api"));
    assert_eq!(
        h.store.get_port("acme-app-branch-foo~api").await,
        Some(foo_server_port)
    );
}

#[tokio::test]
async fn update_starts_processes_the_supervisor_forgot() {
    let h = Harness::new().await;
    let config = acme_config(
        "42340:42350",
        serde_json::json!({
            "additionalServers": [
                { "subdomain": "api", "portEnv": "API_PORT", "startFile": "api.js" }
            ]
        }),
    );
    let id = DeploymentId::for_pull_request(&config, 7);
    h.deployer
        .deploy(&config, &id, &revision("feature-x", "abc123"))
        .await
        .unwrap();
    let port = h.store.get_port(id.port_key()).await.unwrap();

    // only the main process survived a supervisor restart
    h.supervisor.forget("acme-app-pr-7~api");

    h.deployer
        .deploy(&config, &id, &revision("feature-x", "def456"))
        .await
        .unwrap();

    assert_eq!(
        h.supervisor.calls()[2..].to_vec(),
        vec![
            "stop acme-app-pr-7",
            "restart acme-app-pr-7",
            "stop acme-app-pr-7~api",
            "restart acme-app-pr-7~api",
            "start acme-app-pr-7~api",
        ]
    );
    assert!(h.supervisor.is_running("acme-app-pr-7~api"));
    assert_eq!(h.store.get_port(id.port_key()).await, Some(port));
    let status = h.store.get_status(&id).await.unwrap();
    assert_eq!(status.status, DeploymentStatus::Running);
    assert_eq!(status.sha, "def456");
}

