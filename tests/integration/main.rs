//! Integration tests for the ltc CLI

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// Command isolated from the caller's environment and config
    fn ltc(dir: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("ltc");
        cmd.env("LTC_CONFIG", dir.path().join("config.toml"))
            .env("LTC_CACHE_DIR", dir.path().join("cache"))
            .env_remove("LTC_DEFAULT_DEVICE")
            .env_remove("LTC_COMPILE_CACHE");
        cmd
    }

    #[test]
    fn help_displays() {
        let dir = TempDir::new().unwrap();
        ltc(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("compile cache and device resolution"));
    }

    #[test]
    fn version_displays() {
        let dir = TempDir::new().unwrap();
        ltc(&dir)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("ltc"));
    }

    #[test]
    fn devices_default_to_cpu() {
        let dir = TempDir::new().unwrap();
        ltc(&dir)
            .args(["devices", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("CPU:0"))
            .stdout(predicate::str::contains("GPU:0").not());
    }

    #[test]
    fn devices_follow_environment() {
        let dir = TempDir::new().unwrap();
        ltc(&dir)
            .env("LTC_DEFAULT_DEVICE", "gpu")
            .args(["devices", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("GPU:0"))
            .stdout(predicate::str::contains("CPU:0"));
    }

    #[test]
    fn devices_json() {
        let dir = TempDir::new().unwrap();
        ltc(&dir)
            .args(["devices", "--kind", "GPU", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cuda(0)"));
    }

    #[test]
    fn devices_unknown_kind_fails() {
        let dir = TempDir::new().unwrap();
        ltc(&dir)
            .args(["devices", "--kind", "FPGA"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn cache_path_uses_flag() {
        let dir = TempDir::new().unwrap();
        let cache = dir.path().join("elsewhere");
        ltc(&dir)
            .args(["cache", "path", "--cache-dir"])
            .arg(&cache)
            .assert()
            .success()
            .stdout(predicate::str::contains("elsewhere"));
    }

    #[test]
    fn cache_list_empty() {
        let dir = TempDir::new().unwrap();
        ltc(&dir)
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache entries found"));
    }

    #[test]
    fn cache_list_json_empty() {
        let dir = TempDir::new().unwrap();
        ltc(&dir)
            .args(["cache", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[]"));
    }

    #[test]
    fn cache_info_missing_digest_fails() {
        let dir = TempDir::new().unwrap();
        ltc(&dir)
            .args(["cache", "info", "deadbeef"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("deadbeef"));
    }

    #[test]
    fn cache_clear_empty() {
        let dir = TempDir::new().unwrap();
        ltc(&dir)
            .args(["cache", "clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache entries to clear"));
    }

    #[test]
    fn config_path() {
        let dir = TempDir::new().unwrap();
        ltc(&dir)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let dir = TempDir::new().unwrap();
        ltc(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[device]"))
            .stdout(predicate::str::contains("[cache]"));
    }

    #[test]
    fn config_init_writes_file() {
        let dir = TempDir::new().unwrap();
        ltc(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));
        assert!(dir.path().join("config.toml").exists());

        ltc(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }
}

mod library_tests {
    use async_trait::async_trait;
    use ltc_client::cache::DirCacheService;
    use ltc_client::config::Config;
    use ltc_client::ir::{Expr, Function, TensorType};
    use ltc_client::{
        Backend, ClientResult, CompileInstance, ComputationClient, ComputationPtr, Executable,
        LoweredComputation,
    };
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Echo;

    #[async_trait]
    impl Backend for Echo {
        async fn compile(&self, instance: &CompileInstance) -> ClientResult<ComputationPtr> {
            Ok(Arc::new(Executable {
                backend: "echo".to_string(),
                device: instance.compilation_device.clone(),
                devices: instance.devices.clone(),
                program: instance.computation.canonical_text()?,
            }))
        }

        fn backend_name(&self) -> &'static str {
            "echo"
        }
    }

    fn instance(op: &str) -> CompileInstance {
        let mut func = Function::new();
        func.param("x", TensorType::new("float32", [4]));
        let x = func.param_operand(0);
        let out = func.push(op, vec![x]);
        func.output(out);
        CompileInstance::lowered(LoweredComputation::new(Expr::Function(func)), "CPU:0")
    }

    #[tokio::test]
    async fn entries_persist_across_clients() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.device.default_kind = "CPU".to_string();
        config.cache.dir = Some(dir.path().to_path_buf());

        let first = ComputationClient::builder(&config)
            .backend(Arc::new(Echo))
            .build()
            .await
            .unwrap();
        let compiled = first.compile(&[instance("tanh")]).await.unwrap();
        assert_eq!(first.cache_stats().misses, 1);
        first.prepare_to_exit();

        let second = ComputationClient::builder(&config)
            .backend(Arc::new(Echo))
            .build()
            .await
            .unwrap();
        let reloaded = second.compile(&[instance("tanh")]).await.unwrap();
        assert_eq!(second.cache_stats().hits, 1);
        assert_eq!(reloaded[0], compiled[0]);

        let service = DirCacheService::open(dir.path()).await.unwrap();
        assert_eq!(service.list().await.unwrap().len(), 1);
    }
}
