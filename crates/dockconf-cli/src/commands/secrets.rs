use tracing::info;

use crate::cli::{GlobalArgs, ProvideArgs};
use crate::context::{CliResult, open_engine};
use crate::output::render_provisioned;

pub(crate) fn handle_provide(global: &GlobalArgs, args: &ProvideArgs) -> CliResult<()> {
    let engine = open_engine(global)?;
    let provisioned = engine.provide_secrets(&args.consumer)?;
    if provisioned.is_empty() {
        info!(consumer = %args.consumer, "no secrets declared for consumer");
        return Ok(());
    }
    println!("{}", render_provisioned(&provisioned, global.output)?);
    Ok(())
}
