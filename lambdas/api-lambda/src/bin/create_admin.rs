//! Seeds the administrator account, or promotes and re-keys it if the email
//! is already registered.

use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::Error;
use patajob_shared::{admin, config::ConfigError, store::DynamoStore};
use std::env;

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    lambda_http::tracing::init_default_subscriber();

    let email = required("ADMIN_EMAIL")?;
    let password = required("ADMIN_PASSWORD")?;
    let name = env::var("ADMIN_NAME").unwrap_or_else(|_| "System Admin".to_string());
    let contact = env::var("ADMIN_CONTACT").unwrap_or_else(|_| "254700000000".to_string());
    let table_name = env::var("TABLE_NAME").unwrap_or_else(|_| "patajob".to_string());

    let aws_config = aws_config::load_from_env().await;
    let store = DynamoStore::new(DynamoClient::new(&aws_config), table_name);

    let identity = admin::ensure_admin(&store, &email, &password, &name, &contact).await?;
    tracing::info!("Admin account ready: {} ({})", identity.email, identity.id);
    Ok(())
}
