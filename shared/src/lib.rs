pub mod types;
pub mod error;
pub mod config;
pub mod store;
pub mod auth;
pub mod users;
pub mod providers;
pub mod bookings;
pub mod reviews;
pub mod feedback;
pub mod admin;
pub mod email;
pub mod s3;
pub mod image_processing;

use aws_sdk_s3::Client as S3Client;
use aws_sdk_sesv2::Client as SesClient;
use config::Config;
use std::sync::Arc;
use store::Store;

/// Shared application state
pub struct AppState<S> {
    pub store: S,
    pub config: Config,
    /// Absent in tests; avatar upload then answers 502.
    pub s3_client: Option<S3Client>,
    /// Absent in tests; verification mail is then reported as failed.
    pub ses_client: Option<SesClient>,
}

impl<S: Store> AppState<S> {
    pub fn new(
        store: S,
        config: Config,
        s3_client: Option<S3Client>,
        ses_client: Option<SesClient>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            config,
            s3_client,
            ses_client,
        })
    }
}
