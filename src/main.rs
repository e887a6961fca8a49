use ss4o_trace_exporter::app;
use ss4o_trace_exporter::error::AppError;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    app::run().await
}
