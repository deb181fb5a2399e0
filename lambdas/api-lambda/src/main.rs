use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_sesv2::Client as SesClient;
use lambda_http::{run, service_fn, tracing, Error, Request};
use patajob_shared::{config::Config, store::DynamoStore, AppState};
use std::sync::Arc;

mod http_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    let config = Config::from_env()?;

    // Initialize AWS clients once at startup
    let aws_config = aws_config::load_from_env().await;
    let store = DynamoStore::new(DynamoClient::new(&aws_config), config.table_name.clone());

    let state = AppState::new(
        store,
        config,
        Some(S3Client::new(&aws_config)),
        Some(SesClient::new(&aws_config)),
    );

    run(service_fn(move |event: Request| {
        let state = Arc::clone(&state);
        async move { http_handler::function_handler(event, state).await }
    }))
    .await
}
