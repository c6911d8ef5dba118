//! End-to-end three-tier precedence: global config on disk, overlaid by a
//! local workspace config, overlaid by request overrides, then validated and
//! round-tripped through `init_local`/`save_local`.

use codeatlas_config::{AtlasConfig, ConfigLoader, ConfigOverrides, EmbedderBackendKind};
use tempfile::TempDir;

#[test]
fn global_then_local_then_overrides_merge_in_order_and_validate() {
    let workspace = TempDir::new().unwrap();
    let global_dir = workspace.path().join("home").join(".codeatlas");
    std::fs::create_dir_all(&global_dir).unwrap();
    std::fs::write(
        global_dir.join("config.toml"),
        r#"
        [logging]
        level = "debug"

        [embedder]
        backend = "local"
        api_endpoint = "http://global-embedder:9000/v1"
        "#,
    )
    .unwrap();

    let mut loader = ConfigLoader::with_global_dir(&global_dir);
    loader.init_local(workspace.path()).unwrap();
    std::fs::write(
        workspace.path().join(".codeatlas").join("config.toml"),
        r#"
        [indexer]
        batch_size = 250

        [embedder]
        api_endpoint = "http://local-embedder:9000/v1"
        "#,
    )
    .unwrap();

    let overrides = ConfigOverrides {
        incremental: Some(false),
        skip_vectors: Some(true),
        ..Default::default()
    };

    let config = loader.load(workspace.path(), Some(&overrides)).unwrap();

    // Global set logging + backend, local overrode the endpoint and batch
    // size, overrides set the two indexer flags last.
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.embedder.backend, EmbedderBackendKind::Local);
    assert_eq!(config.embedder.api_endpoint, "http://local-embedder:9000/v1");
    assert_eq!(config.indexer.batch_size, 250);
    assert!(!config.indexer.incremental);
    assert!(config.indexer.skip_vectors);

    // The merged result is itself a valid config and round-trips through a
    // local save/reload unchanged.
    loader.save_local(workspace.path(), &config).unwrap();
    let mut reloader = ConfigLoader::with_global_dir(&global_dir);
    let reloaded = reloader.load(workspace.path(), None).unwrap();
    assert_eq!(reloaded.embedder.api_endpoint, "http://local-embedder:9000/v1");
    assert_eq!(reloaded.indexer.batch_size, 250);
}

#[test]
fn invalid_merged_config_fails_validation_before_being_returned() {
    let workspace = TempDir::new().unwrap();
    let mut loader = ConfigLoader::with_global_dir(workspace.path().join("global"));
    loader.init_local(workspace.path()).unwrap();
    std::fs::write(
        workspace.path().join(".codeatlas").join("config.toml"),
        r#"
        [indexer]
        batch_size = 0
        "#,
    )
    .unwrap();

    let err = loader.load(workspace.path(), None).unwrap_err();
    assert!(matches!(err, codeatlas_config::ConfigError::ValidationError(_)));

    // AtlasConfig::default() itself must stay valid regardless.
    assert!(AtlasConfig::default().validate().is_ok());
}
