//! End-to-end tests against a real Docker daemon.
//!
//! These provision actual containers and are ignored by default; run with
//! `cargo test -- --ignored` on a host with Docker available.

use std::sync::Arc;
use std::time::Duration;

use sandbox_host::config::{ExecutorConfig, PoolConfig};
use sandbox_host::executor::{CommandExecutor, ExecutionRequest};
use sandbox_host::pool::ContainerPool;
use sandbox_host::provision::{DockerProvisioner, ProvisionSpec};
use sandbox_host::supervisor::LeaseSupervisor;
use sandbox_host::transport::{DockerExecTransport, ExecutionTransport};
use sandbox_host::{Error, Language};

async fn docker_supervisor(image: &str) -> (ContainerPool, LeaseSupervisor) {
    let config = PoolConfig::default()
        .with_target_size(1)
        .with_acquire_timeout(Duration::from_secs(10));

    let provisioner = Arc::new(DockerProvisioner::new());
    let transport: Arc<dyn ExecutionTransport> = Arc::new(DockerExecTransport::new());

    let pool = ContainerPool::start(config, ProvisionSpec::new(image), provisioner)
        .await
        .expect("pool start failed, is docker running?");

    let executor = Arc::new(CommandExecutor::new(
        transport.clone(),
        pool.clone(),
        ExecutorConfig::default(),
    ));

    (pool.clone(), LeaseSupervisor::new(pool, executor, transport))
}

#[tokio::test]
#[ignore] // Requires docker
async fn python_source_runs_in_a_docker_container() {
    let language = Language::Python;
    let (pool, supervisor) = docker_supervisor(language.default_image()).await;

    let script = language
        .build_exec_script("print('hello from docker')", "e2e-1")
        .unwrap();

    let result = supervisor
        .execute("e2e", ExecutionRequest::new(script))
        .await
        .expect("execute failed");

    assert!(result.success());
    assert_eq!(result.stdout.trim(), "hello from docker");

    pool.shutdown().await;
}

#[tokio::test]
#[ignore] // Requires docker
async fn timed_out_docker_execution_is_drained() {
    let (pool, supervisor) = docker_supervisor("debian:bullseye-slim").await;

    let err = supervisor
        .execute(
            "e2e",
            ExecutionRequest::new("sleep 30").with_timeout(Duration::from_secs(1)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout { .. }));

    pool.shutdown().await;
}
