//! Sandbox Execution Host CLI
//!
//! Runs a source file inside a pooled sandbox container.

use std::path::Path;
use std::sync::Arc;

use sandbox_host::executor::CommandExecutor;
use sandbox_host::pool::ContainerPool;
use sandbox_host::provision::{DockerProvisioner, LocalProvisioner, ProvisionSpec, Provisioner};
use sandbox_host::supervisor::LeaseSupervisor;
use sandbox_host::transport::{DockerExecTransport, ExecutionTransport, LocalProcessTransport};
use sandbox_host::{ExecutionRequest, HostConfig, Language};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <source-file>", args[0]);
        eprintln!("\nRuns a source file inside a pooled sandbox container.");
        eprintln!("\nSupported extensions: .py .java .cpp .cc .cxx");
        eprintln!("\nEnvironment variables:");
        eprintln!("  SANDBOX_BACKEND=docker|local  Select backend (default: docker)");
        eprintln!("  SANDBOX_CONFIG=<path>         Load host configuration from a TOML file");
        std::process::exit(1);
    }

    let source_path = Path::new(&args[1]);

    let language = source_path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(Language::from_extension)
        .unwrap_or_else(|| {
            eprintln!("Unsupported source file: {}", source_path.display());
            std::process::exit(1);
        });

    let source = std::fs::read_to_string(source_path).unwrap_or_else(|e| {
        eprintln!("Failed to read {}: {}", source_path.display(), e);
        std::process::exit(1);
    });

    let config = match std::env::var("SANDBOX_CONFIG") {
        Ok(path) => HostConfig::from_path(Path::new(&path)).unwrap_or_else(|e| {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }),
        Err(_) => HostConfig::default(),
    };

    // Select backend based on environment variable
    let backend = std::env::var("SANDBOX_BACKEND").unwrap_or_else(|_| "docker".to_string());
    let (provisioner, transport): (Arc<dyn Provisioner>, Arc<dyn ExecutionTransport>) =
        match backend.as_str() {
            "local" => {
                tracing::info!("using local backend");
                (
                    Arc::new(LocalProvisioner::in_temp_dir()),
                    Arc::new(LocalProcessTransport::new()),
                )
            }
            _ => {
                tracing::info!("using docker backend");
                (
                    Arc::new(DockerProvisioner::new()),
                    Arc::new(DockerExecTransport::new()),
                )
            }
        };

    let spec = ProvisionSpec::new(language.default_image());

    tracing::info!(language = %language, image = %spec.image, "starting pool");

    let pool = match ContainerPool::start(config.pool.clone(), spec, provisioner).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Failed to start pool: {}", e);
            std::process::exit(1);
        }
    };

    let executor = Arc::new(CommandExecutor::new(
        transport.clone(),
        pool.clone(),
        config.executor.clone(),
    ));
    let supervisor = LeaseSupervisor::new(pool.clone(), executor, transport);

    let execution_id = uuid::Uuid::new_v4().to_string();
    let script = match language.build_exec_script(&source, &execution_id) {
        Ok(script) => script,
        Err(e) => {
            eprintln!("Failed to prepare source: {}", e);
            pool.shutdown().await;
            std::process::exit(1);
        }
    };

    let outcome = supervisor.execute("cli", ExecutionRequest::new(script)).await;

    pool.shutdown().await;

    match outcome {
        Ok(result) => {
            println!("\n{}", "=".repeat(60));
            println!("Execution Complete: {}", result.execution_id);
            println!("{}", "=".repeat(60));
            println!();
            println!("Exit code: {:?}", result.exit_code);
            println!("Duration: {:?}", result.duration);
            if result.truncated {
                println!("Output was truncated at the capture cap.");
            }
            if !result.stdout.is_empty() {
                println!("\nStdout:\n{}", result.stdout);
            }
            if !result.stderr.is_empty() {
                println!("\nStderr:\n{}", result.stderr);
            }

            if !result.success() {
                std::process::exit(result.exit_code.unwrap_or(1));
            }
        }
        Err(e) => {
            eprintln!("Execution failed: {}", e);
            std::process::exit(1);
        }
    }
}
