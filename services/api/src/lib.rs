mod cli;
mod estimate;
mod infra;
mod routes;
mod server;
mod train;

use fare_estimator::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
