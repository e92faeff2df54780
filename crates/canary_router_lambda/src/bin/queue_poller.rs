use std::time::Duration;

use canary_router_core::config::EnvConfigSource;
use canary_router_lambda::adapters::aws::{AwsLambdaInvoker, SqsQueue};
use canary_router_lambda::handlers::batch::BatchCoordinator;
use canary_router_lambda::handlers::dispatch::Dispatcher;
use canary_router_lambda::handlers::poll::run_poll_cycle;
use canary_router_lambda::settings::RouterSettings;
use lambda_runtime::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const RECEIVE_FAILURE_BACKOFF: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<(), Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = RouterSettings::from_env()?;
    let queue_url = settings.require_queue_url()?.to_string();
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let queue = SqsQueue::new(aws_sdk_sqs::Client::new(&aws_config), queue_url.clone())
        .with_release_visibility(settings.release_visibility_secs);
    let invoker = AwsLambdaInvoker::new(aws_sdk_lambda::Client::new(&aws_config));
    let coordinator = BatchCoordinator::new(Dispatcher::new(invoker, settings.invoke_timeout));
    let config_source = EnvConfigSource;

    info!(
        queue_url = %queue_url,
        batch_size = settings.batch_size,
        invoke_timeout_ms = settings.invoke_timeout.as_millis() as u64,
        release_visibility_secs = ?settings.release_visibility_secs,
        "queue poller started"
    );

    let batch_size = settings.batch_size;
    loop {
        let cycle = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested; unsettled messages return after visibility timeout");
                return Ok(());
            }
            cycle = run_poll_cycle(&queue, &config_source, &coordinator, batch_size) => cycle,
        };

        match cycle {
            Ok(summary) if summary.received > 0 => info!(
                received = summary.received,
                acknowledged = summary.acknowledged,
                released = summary.released,
                queue_errors = summary.queue_errors,
                "poll cycle finished"
            ),
            Ok(_) => {}
            Err(queue_error) => {
                error!(error = %queue_error, "poll cycle failed");
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("shutdown requested during receive backoff");
                        return Ok(());
                    }
                    _ = tokio::time::sleep(RECEIVE_FAILURE_BACKOFF) => {}
                }
            }
        }
    }
}
