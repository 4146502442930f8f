//! statsd-agg CLI entry point.

use statsd_agg::cli::{self, Cli};
use statsd_agg::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let cli = Cli::parse_args();

    // Execute the command
    cli::execute(cli).await
}
