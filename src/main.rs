mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region, SdkConfig};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use wordfreq::config::WorkerConfig;
use wordfreq::imds::ImdsRegion;
use wordfreq::notifier::QueueNotifier;
use wordfreq::pipeline::Pipeline;
use wordfreq::queue::SqsQueue;
use wordfreq::recorder::DynamoRecorder;
use wordfreq::storage::S3Store;
use wordfreq::ui::{self, ResultWait};
use wordfreq::upload::Uploader;

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

async fn resolve_region(config: &WorkerConfig) -> Result<String> {
    if let Some(region) = &config.region {
        return Ok(region.clone());
    }
    let region = ImdsRegion::new().region().await?;
    tracing::info!(%region, "discovered region from instance metadata");
    Ok(region)
}

async fn aws_config(region: String) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region))
        .load()
        .await
}

async fn run_worker(config: WorkerConfig) -> Result<()> {
    config.validate()?;
    let sdk = aws_config(resolve_region(&config).await?).await;

    let sqs = aws_sdk_sqs::Client::new(&sdk);
    let jobs = Arc::new(SqsQueue::new(sqs.clone(), &config.worker_queue_url, config.lease()));
    let results = Arc::new(SqsQueue::new(sqs, &config.result_queue_url, config.lease()));

    let pipeline = Pipeline {
        queue: jobs,
        store: Arc::new(S3Store::new(aws_sdk_s3::Client::new(&sdk))),
        recorder: Arc::new(DynamoRecorder::new(
            aws_sdk_dynamodb::Client::new(&sdk),
            &config.result_table_name,
        )),
        notifier: Arc::new(QueueNotifier::new(results)),
        settings: config.pipeline_settings(),
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, draining in-flight jobs");
                cancel.cancel();
            }
        });
    }

    tracing::info!(
        queue = %config.worker_queue_url,
        workers = config.worker_count,
        lease_secs = config.message_visibility,
        "worker starting"
    );
    let stats = pipeline.run(cancel).await;
    tracing::info!(
        received = stats.received,
        recorded = stats.recorded,
        failed = stats.failed,
        deleted = stats.deleted,
        notified = stats.notified,
        "worker exiting"
    );
    Ok(())
}

async fn run_upload(
    config: WorkerConfig,
    bucket: String,
    file: std::path::PathBuf,
    no_wait: bool,
) -> Result<()> {
    let wait = !no_wait && !config.result_queue_url.is_empty();
    let region = resolve_region(&config).await?;
    let sdk = aws_config(region.clone()).await;

    let mut uploader = Uploader::new(region, Arc::new(S3Store::new(aws_sdk_s3::Client::new(&sdk))));
    if wait {
        let results = SqsQueue::new(
            aws_sdk_sqs::Client::new(&sdk),
            &config.result_queue_url,
            std::time::Duration::ZERO,
        )
        .with_max_messages(10);
        uploader = uploader.with_results(Arc::new(results));
    }

    let location = uploader
        .upload(&bucket, &file)
        .await
        .with_context(|| format!("upload {} to {bucket}", file.display()))?;
    println!("Uploaded {}", location.filename());
    if !wait {
        return Ok(());
    }

    let spinner = ResultWait::start(&location.filename());
    let result = uploader.wait_for_result(&location.bucket, &location.key).await;
    spinner.finish();
    if let Some(result) = result {
        ui::print_result(&result);
    }
    Ok(())
}

async fn run_create_table(config: WorkerConfig, table: String) -> Result<()> {
    let sdk = aws_config(resolve_region(&config).await?).await;
    let recorder = DynamoRecorder::new(aws_sdk_dynamodb::Client::new(&sdk), &table);
    recorder
        .create_table()
        .await
        .with_context(|| format!("create table {table}"))?;
    println!("Created table {table}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = WorkerConfig::load(cli.config.as_deref()).context("load configuration")?;

    match cli.command {
        Command::Worker => run_worker(config).await,
        Command::Upload {
            bucket,
            file,
            no_wait,
        } => run_upload(config, bucket, file, no_wait).await,
        Command::CreateTable { table } => run_create_table(config, table).await,
    }
}
