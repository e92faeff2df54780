use aws_lambda_events::event::sqs::{SqsBatchResponse, SqsEvent};
use canary_router_core::config::{ConfigSource, EnvConfigSource};
use canary_router_lambda::adapters::aws::AwsLambdaInvoker;
use canary_router_lambda::handlers::batch::BatchCoordinator;
use canary_router_lambda::handlers::dispatch::Dispatcher;
use canary_router_lambda::handlers::event::handle_sqs_event;
use canary_router_lambda::settings::RouterSettings;
use lambda_runtime::{service_fn, tracing, Error, LambdaEvent};

async fn handle_request(
    event: LambdaEvent<SqsEvent>,
    config_source: &dyn ConfigSource,
    coordinator: &BatchCoordinator<AwsLambdaInvoker>,
) -> Result<SqsBatchResponse, Error> {
    tracing::debug!(request_id = %event.context.request_id, "routing invocation started");
    handle_sqs_event(&event.payload, config_source, coordinator)
        .await
        .map_err(Error::from)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    let settings = RouterSettings::from_env()?;
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let invoker = AwsLambdaInvoker::new(aws_sdk_lambda::Client::new(&aws_config));
    let coordinator = BatchCoordinator::new(Dispatcher::new(invoker, settings.invoke_timeout));
    let config_source = EnvConfigSource;

    let coordinator = &coordinator;
    let config_source = &config_source;
    lambda_runtime::run(service_fn(move |event: LambdaEvent<SqsEvent>| async move {
        handle_request(event, config_source, coordinator).await
    }))
    .await
}
